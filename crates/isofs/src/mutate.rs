//! The mutation API: `add_fp`, `add_directory`,
//! `add_symlink`, `rm_file`, `rm_directory`, `add_eltorito`, `rm_eltorito`,
//! `add_isohybrid`, `rm_isohybrid`. Every entry point that touches the
//! directory tree or volume descriptor set ends with `self.reshuffle()`, so
//! an `Image` is always internally consistent between calls.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use isofs_io::{Read, Seek, SeekFrom};

use crate::boot::{self, BootCatalog, EmulationType, PlatformId, SectionEntry};
use crate::directory::{Content, DirArena, DirHandle, DirectoryRecord, ExternalSource, FileFlags};
use crate::error::{Error, Result};
use crate::isohybrid::{IsoHybridOptions, BOOTSTRAP_SENTINEL, BOOT_FILE_SIGNATURE, BOOT_FILE_SIGNATURE_OFFSET};
use crate::susp::{default_mode, Px, RockRidge, SlComponent, SlFlags, Tf};
use crate::types::Identifier;
use crate::volume::{BootRecordDescriptor, VolumeDescriptor};
use crate::{current_dir_date, BootState, Image};

/// Maximum directory nesting depth a path may describe.
const MAX_PATH_DEPTH: usize = 7;

/// Splits an absolute ISO path (`/a/b/c`) into its components, rejecting a
/// relative path or one deeper than the engine tolerates.
pub(crate) fn split_absolute_path(iso_path: &str) -> Result<Vec<String>> {
    if !iso_path.starts_with('/') {
        return Err(Error::invalid("iso path must be absolute"));
    }
    let components: Vec<String> = iso_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if components.len() > MAX_PATH_DEPTH {
        return Err(Error::invalid("iso path exceeds the maximum directory depth"));
    }
    Ok(components)
}

fn split_parent_and_name(iso_path: &str) -> Result<(Vec<String>, String)> {
    let mut components = split_absolute_path(iso_path)?;
    let name = components
        .pop()
        .ok_or_else(|| Error::invalid("iso path must name an entry"))?;
    Ok((components, name))
}

/// Finds a non-dot/dotdot child of `parent` whose identifier's stem matches
/// `name` case-insensitively (the version suffix, if any, is ignored).
fn find_entry_by_name(arena: &DirArena, parent: DirHandle, name: &str) -> Option<DirHandle> {
    arena.get(parent).children.iter().copied().find(|&c| {
        let rec = arena.get(c);
        if rec.is_dot() || rec.is_dotdot() {
            return false;
        }
        let ident = String::from_utf8_lossy(&rec.file_ident);
        let stem = ident.split(';').next().unwrap_or(&ident);
        stem.eq_ignore_ascii_case(name)
    })
}

pub(crate) fn resolve_entry(arena: &DirArena, root: DirHandle, iso_path: &str) -> Result<DirHandle> {
    let (parent_path, name) = split_parent_and_name(iso_path)?;
    let parent = arena
        .resolve_dir(root, &parent_path)
        .ok_or_else(|| Error::invalid("no such directory"))?;
    find_entry_by_name(arena, parent, &name).ok_or_else(|| Error::invalid("no such entry"))
}

/// Adds `delta` to the `nlink` of `dir`'s own `.` record's `PX`, if Rock
/// Ridge is attached. A no-op when Rock Ridge isn't in use.
fn bump_dir_nlink(arena: &mut DirArena, dir: DirHandle, delta: i64) {
    if let Some(dot) = arena.get(dir).children.iter().copied().find(|&c| arena.get(c).is_dot()) {
        if let Some(px) = arena.get_mut(dot).rock_ridge.as_mut().and_then(|rr| rr.px.as_mut()) {
            px.nlink = (px.nlink as i64 + delta).max(0) as u32;
        }
    }
}

/// Adds `delta` to the `nlink` of `dir`'s own `..` record's `PX`. Used only
/// for the root, whose `..` has no real parent to mirror and instead tracks
/// the root's own child-directory count alongside its `.`.
fn bump_dotdot_nlink(arena: &mut DirArena, dir: DirHandle, delta: i64) {
    if let Some(dotdot) = arena.get(dir).children.iter().copied().find(|&c| arena.get(c).is_dotdot()) {
        if let Some(px) = arena.get_mut(dotdot).rock_ridge.as_mut().and_then(|rr| rr.px.as_mut()) {
            px.nlink = (px.nlink as i64 + delta).max(0) as u32;
        }
    }
}

/// Splits a symlink target into Rock Ridge `SL` components: a
/// leading `/` becomes a `ROOT` component, `.`/`..` become `CURRENT`/
/// `PARENT` components, everything else is a literal path component.
fn sl_components_from_target(target: &str) -> Vec<SlComponent> {
    let mut components = Vec::new();
    let rest = if let Some(stripped) = target.strip_prefix('/') {
        components.push(SlComponent {
            flags: SlFlags::ROOT,
            name: Vec::new(),
        });
        stripped
    } else {
        target
    };
    for part in rest.split('/').filter(|s| !s.is_empty()) {
        match part {
            "." => components.push(SlComponent {
                flags: SlFlags::CURRENT,
                name: Vec::new(),
            }),
            ".." => components.push(SlComponent {
                flags: SlFlags::PARENT,
                name: Vec::new(),
            }),
            _ => components.push(SlComponent {
                flags: SlFlags::empty(),
                name: part.as_bytes().to_vec(),
            }),
        }
    }
    components
}

/// The less common parameters of `add_eltorito`, bundled the way
/// `NewOptions`/`IsoHybridOptions` bundle theirs.
#[derive(Debug, Clone)]
pub struct EltoritoOptions {
    pub platform_id: PlatformId,
    pub emulation: EmulationType,
    pub load_segment: u16,
    pub sector_count: u16,
    pub rr_bootcat_name: Option<String>,
    pub joliet_bootcat_path: Option<String>,
}

impl Default for EltoritoOptions {
    fn default() -> Self {
        Self {
            platform_id: PlatformId::X80X86,
            emulation: EmulationType::NoEmulation,
            load_segment: 0,
            sector_count: 4,
            rr_bootcat_name: None,
            joliet_bootcat_path: None,
        }
    }
}

impl<'a> Image<'a> {
    /// Attaches a byte source as a regular file at `iso_path`, synthesizing
    /// any missing intermediate directories along the way.
    pub fn add_fp<S: ExternalSource + 'a>(
        &mut self,
        source: S,
        length: u32,
        iso_path: &str,
        rr_name: Option<&str>,
        joliet_path: Option<&str>,
    ) -> Result<DirHandle> {
        if rr_name.is_some() && !self.options.rock_ridge {
            return Err(Error::invalid("rock ridge name given but rock ridge is not enabled"));
        }
        if joliet_path.is_some() && self.joliet.is_none() {
            return Err(Error::invalid("joliet path given but joliet is not enabled"));
        }

        let (parent_path, name) = split_parent_and_name(iso_path)?;
        let parent = self.locate_or_synthesize_parent(&parent_path)?;
        let ident = Identifier::filename(self.options.interchange_level, &name)?;
        let date = current_dir_date();
        let rock_ridge = self.options.rock_ridge.then(|| RockRidge {
            px: Some(Px {
                file_mode: default_mode::REGULAR_FILE,
                nlink: 1,
                uid: 0,
                gid: 0,
            }),
            tf: Some(Tf::creation_default(date)),
            nm: rr_name.map(|n| n.as_bytes().to_vec()),
            ..Default::default()
        });

        let record = DirectoryRecord {
            parent: None,
            children: Vec::new(),
            file_ident: ident.0,
            xattr_len: 0,
            orig_extent_loc: 0,
            extent_new: 0,
            data_length: length,
            date,
            flags: FileFlags::empty(),
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_seqnum: 1,
            content: Content::External(core::cell::RefCell::new(Box::new(source))),
            rock_ridge,
            mirror: None,
        };
        let block_size = self.block_size();
        let (handle, _) = self.primary.arena.add_child(parent, record, block_size)?;

        if let Some(jpath) = joliet_path {
            let jhandle = self.add_joliet_file(jpath, length)?;
            self.primary.arena.get_mut(handle).mirror = Some(jhandle);
        }

        self.reshuffle()?;
        Ok(handle)
    }

    /// Creates a directory at `iso_path`, synthesizing missing intermediate
    /// directories.
    pub fn add_directory(&mut self, iso_path: &str, joliet_path: Option<&str>) -> Result<DirHandle> {
        if joliet_path.is_some() && self.joliet.is_none() {
            return Err(Error::invalid("joliet path given but joliet is not enabled"));
        }
        let (parent_path, name) = split_parent_and_name(iso_path)?;
        let parent = self.locate_or_synthesize_parent(&parent_path)?;
        let handle = self.create_child_dir(parent, &name)?;

        if let Some(jpath) = joliet_path {
            let jhandle = self.add_joliet_directory(jpath)?;
            self.primary.arena.get_mut(handle).mirror = Some(jhandle);
        }

        self.reshuffle()?;
        Ok(handle)
    }

    /// Creates a Rock Ridge symbolic link at `iso_path` pointing at `target`.
    /// Requires Rock Ridge to be enabled; ISO 9660 proper has no notion of a
    /// symlink.
    pub fn add_symlink(&mut self, iso_path: &str, target: &str) -> Result<DirHandle> {
        if !self.options.rock_ridge {
            return Err(Error::invalid("symlinks require rock ridge to be enabled"));
        }
        let (parent_path, name) = split_parent_and_name(iso_path)?;
        let parent = self.locate_or_synthesize_parent(&parent_path)?;
        let ident = Identifier::filename(self.options.interchange_level, &name)?;
        let date = current_dir_date();
        let rock_ridge = Some(RockRidge {
            px: Some(Px {
                file_mode: default_mode::SYMLINK,
                nlink: 1,
                uid: 0,
                gid: 0,
            }),
            tf: Some(Tf::creation_default(date)),
            nm: Some(name.as_bytes().to_vec()),
            sl: Some(sl_components_from_target(target)),
            ..Default::default()
        });

        let record = DirectoryRecord {
            parent: None,
            children: Vec::new(),
            file_ident: ident.0,
            xattr_len: 0,
            orig_extent_loc: 0,
            extent_new: 0,
            data_length: 0,
            date,
            flags: FileFlags::empty(),
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_seqnum: 1,
            content: Content::None,
            rock_ridge,
            mirror: None,
        };
        let block_size = self.block_size();
        let (handle, _) = self.primary.arena.add_child(parent, record, block_size)?;
        self.reshuffle()?;
        Ok(handle)
    }

    /// Removes the file at `iso_path`.
    pub fn rm_file(&mut self, iso_path: &str) -> Result<()> {
        let (parent_path, name) = split_parent_and_name(iso_path)?;
        let parent = self
            .primary
            .arena
            .resolve_dir(self.primary.root, &parent_path)
            .ok_or_else(|| Error::invalid("no such directory"))?;
        let handle =
            find_entry_by_name(&self.primary.arena, parent, &name).ok_or_else(|| Error::invalid("no such file"))?;
        if self.primary.arena.get(handle).is_directory() {
            return Err(Error::invalid("not a file"));
        }
        let ident = self.primary.arena.get(handle).file_ident.clone();
        let block_size = self.block_size();
        self.primary.arena.remove_child(parent, &ident, block_size)?;
        self.reshuffle()?;
        Ok(())
    }

    /// Removes the (empty) directory at `iso_path`, mirroring the `nlink`
    /// bookkeeping `add_directory` performed on the way in.
    pub fn rm_directory(&mut self, iso_path: &str) -> Result<()> {
        let components = split_absolute_path(iso_path)?;
        if components.is_empty() {
            return Err(Error::invalid("cannot remove the root directory"));
        }
        let dir = self
            .primary
            .arena
            .resolve_dir(self.primary.root, &components)
            .ok_or_else(|| Error::invalid("no such directory"))?;
        let has_children = self
            .primary
            .arena
            .get(dir)
            .children
            .iter()
            .any(|&c| !self.primary.arena.get(c).is_dot() && !self.primary.arena.get(c).is_dotdot());
        if has_children {
            return Err(Error::invalid("directory is not empty"));
        }
        let parent = self
            .primary
            .arena
            .get(dir)
            .parent
            .ok_or_else(|| Error::invalid("cannot remove the root directory"))?;
        let ident = self.primary.arena.get(dir).file_ident.clone();
        let block_size = self.block_size();
        self.primary.arena.remove_child(parent, &ident, block_size)?;
        bump_dir_nlink(&mut self.primary.arena, parent, -1);
        if parent == self.primary.root {
            bump_dotdot_nlink(&mut self.primary.arena, self.primary.root, -1);
        }
        self.reshuffle()?;
        Ok(())
    }

    /// Attaches an El Torito boot catalog referencing the boot image at
    /// `boot_iso_path`. Only one boot catalog may be attached at a time.
    pub fn add_eltorito<S: ExternalSource + 'a>(
        &mut self,
        boot_iso_path: &str,
        source: S,
        boot_length: u32,
        options: EltoritoOptions,
    ) -> Result<()> {
        if self.boot.is_some() {
            return Err(Error::invalid("an el torito boot catalog is already attached"));
        }
        if options.joliet_bootcat_path.is_some() && self.joliet.is_none() {
            return Err(Error::invalid(
                "joliet boot catalog path given but joliet is not enabled",
            ));
        }

        let boot_handle = self.add_fp(source, boot_length, boot_iso_path, None, None)?;

        let initial_entry = SectionEntry::new(options.emulation, options.load_segment, options.sector_count, 0);
        let catalog = BootCatalog::new(options.platform_id, initial_entry);

        let block_size = self.block_size();
        let date = current_dir_date();
        let cat_ident = Identifier::filename(self.options.interchange_level, &boot::catalog_file_name())?;
        let rock_ridge = self.options.rock_ridge.then(|| RockRidge {
            px: Some(Px {
                file_mode: default_mode::REGULAR_FILE,
                nlink: 1,
                uid: 0,
                gid: 0,
            }),
            tf: Some(Tf::creation_default(date)),
            nm: options.rr_bootcat_name.as_deref().map(|n| n.as_bytes().to_vec()),
            ..Default::default()
        });
        let record = DirectoryRecord {
            parent: None,
            children: Vec::new(),
            file_ident: cat_ident.0,
            xattr_len: 0,
            orig_extent_loc: 0,
            extent_new: 0,
            data_length: block_size,
            date,
            flags: FileFlags::empty(),
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_seqnum: 1,
            content: Content::None,
            rock_ridge,
            mirror: None,
        };
        let (cat_handle, _) = self.primary.arena.add_child(self.primary.root, record, block_size)?;

        let joliet_catalog_dir = if let Some(jpath) = &options.joliet_bootcat_path {
            let jhandle = self.add_joliet_file(jpath, block_size)?;
            self.primary.arena.get_mut(cat_handle).mirror = Some(jhandle);
            Some(jhandle)
        } else {
            None
        };

        self.volume_descriptors
            .insert_before_terminator(VolumeDescriptor::BootRecord(Box::new(BootRecordDescriptor::new_el_torito(0))));

        self.boot = Some(BootState {
            catalog,
            primary_catalog_dir: cat_handle,
            primary_boot_dir: boot_handle,
            joliet_catalog_dir,
            joliet_boot_dir: None,
        });

        self.reshuffle()?;
        Ok(())
    }

    /// Detaches the El Torito boot catalog, if any. The boot image file
    /// itself is left in the tree as an ordinary file.
    pub fn rm_eltorito(&mut self) -> Result<()> {
        let boot = self.boot.take().ok_or_else(|| Error::invalid("no el torito boot catalog attached"))?;
        let block_size = self.block_size();

        let cat_ident = self.primary.arena.get(boot.primary_catalog_dir).file_ident.clone();
        if let Some(parent) = self.primary.arena.get(boot.primary_catalog_dir).parent {
            self.primary.arena.remove_child(parent, &cat_ident, block_size)?;
        }
        if let (Some(jc), Some(joliet)) = (boot.joliet_catalog_dir, self.joliet.as_mut()) {
            let jident = joliet.arena.get(jc).file_ident.clone();
            if let Some(jparent) = joliet.arena.get(jc).parent {
                joliet.arena.remove_child(jparent, &jident, block_size)?;
            }
        }

        self.volume_descriptors.remove_boot_record();
        self.reshuffle()?;
        Ok(())
    }

    /// Stages an isohybrid MBR. The MBR itself
    /// is built by the writer once the final image size is known; this only
    /// validates and records the options.
    pub fn add_isohybrid(
        &mut self,
        bootstrap: [u8; 432],
        part_entry: usize,
        mbr_id: Option<u32>,
        part_offset: u32,
        geometry_sectors: u32,
        geometry_heads: u32,
        part_type: u8,
    ) -> Result<()> {
        if bootstrap[..2] != BOOTSTRAP_SENTINEL {
            return Err(Error::invalid(
                "isohybrid bootstrap does not start with the expected sentinel",
            ));
        }
        if !(1..=4).contains(&part_entry) {
            return Err(Error::invalid("isohybrid part_entry must be in 1..=4"));
        }
        let boot = self
            .boot
            .as_ref()
            .ok_or_else(|| Error::invalid("isohybrid requires an el torito boot catalog to already be attached"))?;
        if boot.catalog.initial_entry.sector_count.get() != 4 {
            return Err(Error::invalid(
                "isohybrid requires the el torito initial entry's sector_count to equal 4",
            ));
        }
        if self.boot_file_signature()? != BOOT_FILE_SIGNATURE {
            return Err(Error::invalid(
                "boot file is missing the isolinux signature required for isohybrid",
            ));
        }
        self.isohybrid = Some(IsoHybridOptions {
            bootstrap,
            part_entry,
            mbr_id: mbr_id.unwrap_or(0),
            part_offset,
            geometry_sectors,
            geometry_heads,
            part_type,
        });
        Ok(())
    }

    /// Drops any staged isohybrid MBR.
    pub fn rm_isohybrid(&mut self) -> Result<()> {
        self.isohybrid = None;
        Ok(())
    }

    /// Reads the 4 bytes at `BOOT_FILE_SIGNATURE_OFFSET` of the attached
    /// boot image, to check the isolinux signature `add_isohybrid` requires.
    /// Restores an `External` source's position to the start afterwards, so
    /// a later `write` still copies its content from the beginning.
    fn boot_file_signature(&self) -> Result<[u8; 4]> {
        let boot = self.boot.as_ref().ok_or_else(|| Error::invalid("no el torito boot catalog attached"))?;
        let rec = self.primary.arena.get(boot.primary_boot_dir);
        let mut buf = [0u8; 4];
        match &rec.content {
            Content::None => return Err(Error::invalid("boot file has no content")),
            Content::Original => {
                let cell = self
                    .source
                    .as_ref()
                    .ok_or_else(|| Error::invalid("image has no attached source to read the boot file from"))?;
                let mut guard = cell.borrow_mut();
                let src: &mut dyn ExternalSource = &mut **guard;
                src.seek(SeekFrom::Start(
                    rec.orig_extent_loc as u64 * self.block_size() as u64 + BOOT_FILE_SIGNATURE_OFFSET as u64,
                ))?;
                src.read_exact(&mut buf)?;
            }
            Content::External(cell) => {
                let mut guard = cell.borrow_mut();
                let src: &mut dyn ExternalSource = &mut **guard;
                src.seek(SeekFrom::Start(BOOT_FILE_SIGNATURE_OFFSET as u64))?;
                src.read_exact(&mut buf)?;
                src.seek(SeekFrom::Start(0))?;
            }
        }
        Ok(buf)
    }

    /// Walks `components` from the root, creating any directory that
    /// doesn't exist yet.
    fn locate_or_synthesize_parent(&mut self, components: &[String]) -> Result<DirHandle> {
        let mut cur = self.primary.root;
        for name in components {
            cur = self.get_or_create_child_dir(cur, name)?;
        }
        Ok(cur)
    }

    fn get_or_create_child_dir(&mut self, parent: DirHandle, name: &str) -> Result<DirHandle> {
        if let Some(h) =
            find_entry_by_name(&self.primary.arena, parent, name).filter(|&h| self.primary.arena.get(h).is_directory())
        {
            return Ok(h);
        }
        self.create_child_dir(parent, name)
    }

    /// Unconditionally creates a new directory under `parent`, bumping
    /// `parent`'s (and, for the root, its `..`'s) `nlink` and attaching the
    /// new directory's own `.`/`..` pair. Errors if `name` already exists
    /// (`DirArena::add_child`'s native duplicate rejection).
    fn create_child_dir(&mut self, parent: DirHandle, name: &str) -> Result<DirHandle> {
        let block_size = self.block_size();
        let date = current_dir_date();
        let rock_ridge = self.options.rock_ridge;
        let ident = self.options.interchange_level.validate_name(name, true)?;
        let rr = rock_ridge.then(|| RockRidge {
            px: Some(Px {
                file_mode: default_mode::DIRECTORY,
                nlink: 2,
                uid: 0,
                gid: 0,
            }),
            tf: Some(Tf::creation_default(date)),
            nm: Some(name.as_bytes().to_vec()),
            ..Default::default()
        });
        let record = DirectoryRecord {
            parent: None,
            children: Vec::new(),
            file_ident: ident.into_bytes(),
            xattr_len: 0,
            orig_extent_loc: 0,
            extent_new: 0,
            data_length: block_size,
            date,
            flags: FileFlags::DIRECTORY,
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_seqnum: 1,
            content: Content::None,
            rock_ridge: rr,
            mirror: None,
        };
        let (handle, _) = self.primary.arena.add_child(parent, record, block_size)?;
        crate::attach_root_self_entries(&mut self.primary.arena, handle, parent, rock_ridge, date);
        bump_dir_nlink(&mut self.primary.arena, parent, 1);
        if parent == self.primary.root {
            bump_dotdot_nlink(&mut self.primary.arena, self.primary.root, 1);
        }
        Ok(handle)
    }

    /// Walks/creates `components` in the Joliet tree, mirroring
    /// `locate_or_synthesize_parent` but without any Rock Ridge bookkeeping
    /// (Joliet never carries Rock Ridge).
    fn ensure_joliet_dir_path(&mut self, components: &[String]) -> Result<DirHandle> {
        let block_size = self.block_size();
        let date = current_dir_date();
        let joliet = self.joliet.as_mut().ok_or_else(|| Error::invalid("joliet is not enabled"))?;
        let mut cur = joliet.root;
        for name in components {
            let ident = crate::utf16be_bytes(name);
            let existing = joliet.arena.get(cur).children.iter().copied().find(|&c| {
                let rec = joliet.arena.get(c);
                rec.is_directory() && !rec.is_dot() && !rec.is_dotdot() && rec.file_ident == ident
            });
            cur = match existing {
                Some(h) => h,
                None => {
                    let record = DirectoryRecord {
                        parent: None,
                        children: Vec::new(),
                        file_ident: ident,
                        xattr_len: 0,
                        orig_extent_loc: 0,
                        extent_new: 0,
                        data_length: block_size,
                        date,
                        flags: FileFlags::DIRECTORY,
                        file_unit_size: 0,
                        interleave_gap_size: 0,
                        volume_seqnum: 1,
                        content: Content::None,
                        rock_ridge: None,
                        mirror: None,
                    };
                    let (h, _) = joliet.arena.add_child(cur, record, block_size)?;
                    crate::attach_root_self_entries(&mut joliet.arena, h, cur, false, date);
                    h
                }
            };
        }
        Ok(cur)
    }

    fn add_joliet_directory(&mut self, joliet_path: &str) -> Result<DirHandle> {
        let components = split_absolute_path(joliet_path)?;
        self.ensure_joliet_dir_path(&components)
    }

    fn add_joliet_file(&mut self, joliet_path: &str, length: u32) -> Result<DirHandle> {
        let (parent_path, name) = split_parent_and_name(joliet_path)?;
        let parent = self.ensure_joliet_dir_path(&parent_path)?;
        let block_size = self.block_size();
        let date = current_dir_date();
        let joliet = self.joliet.as_mut().ok_or_else(|| Error::invalid("joliet is not enabled"))?;
        let record = DirectoryRecord {
            parent: None,
            children: Vec::new(),
            file_ident: crate::utf16be_bytes(&name),
            xattr_len: 0,
            orig_extent_loc: 0,
            extent_new: 0,
            data_length: length,
            date,
            flags: FileFlags::empty(),
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_seqnum: 1,
            content: Content::None,
            rock_ridge: None,
            mirror: None,
        };
        let (h, _) = joliet.arena.add_child(parent, record, block_size)?;
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::NewOptions;
    use std::io::Cursor;

    fn opts() -> NewOptions {
        NewOptions::default().with_joliet(true).with_rock_ridge(true)
    }

    #[test]
    fn add_fp_synthesizes_missing_parents() {
        let mut image = Image::new(opts()).unwrap();
        image
            .add_fp(Cursor::new(alloc::vec![1, 2, 3, 4]), 4, "/a/b/hello.txt", Some("hello.txt"), Some("/a/b/hello.txt"))
            .unwrap();
        let listed = image.list_dir("/a/b").unwrap();
        assert_eq!(listed, alloc::vec!["HELLO.TXT;1".to_string()]);
    }

    #[test]
    fn add_directory_bumps_parent_nlink() {
        let mut image = Image::new(opts()).unwrap();
        let root = image.primary.root;
        let root_dot_nlink_before = {
            let dot = image
                .primary
                .arena
                .get(root)
                .children
                .iter()
                .copied()
                .find(|&c| image.primary.arena.get(c).is_dot())
                .unwrap();
            image.primary.arena.get(dot).rock_ridge.as_ref().unwrap().px.unwrap().nlink
        };
        image.add_directory("/sub", None).unwrap();
        let root_dot_nlink_after = {
            let dot = image
                .primary
                .arena
                .get(root)
                .children
                .iter()
                .copied()
                .find(|&c| image.primary.arena.get(c).is_dot())
                .unwrap();
            image.primary.arena.get(dot).rock_ridge.as_ref().unwrap().px.unwrap().nlink
        };
        assert_eq!(root_dot_nlink_after, root_dot_nlink_before + 1);
    }

    #[test]
    fn rm_directory_rejects_non_empty() {
        let mut image = Image::new(opts()).unwrap();
        image.add_directory("/sub", None).unwrap();
        image
            .add_fp(Cursor::new(alloc::vec![0u8; 10]), 10, "/sub/file.txt", None, None)
            .unwrap();
        assert!(image.rm_directory("/sub").is_err());
    }

    #[test]
    fn add_symlink_requires_rock_ridge() {
        let mut image = Image::new(NewOptions::default()).unwrap();
        assert!(image.add_symlink("/link", "/target").is_err());
    }

    #[test]
    fn add_eltorito_then_rm_eltorito_round_trips() {
        let mut image = Image::new(opts()).unwrap();
        image
            .add_eltorito(
                "/boot/boot.img",
                Cursor::new(alloc::vec![0u8; 2048]),
                2048,
                EltoritoOptions::default(),
            )
            .unwrap();
        assert!(image.boot.is_some());
        image.rm_eltorito().unwrap();
        assert!(image.boot.is_none());
    }

    #[test]
    fn add_isohybrid_requires_eltorito() {
        let mut image = Image::new(opts()).unwrap();
        let bootstrap = {
            let mut b = [0u8; 432];
            b[0] = 0x33;
            b[1] = 0xED;
            b
        };
        assert!(image.add_isohybrid(bootstrap, 1, None, 0, 32, 64, 0x17).is_err());
    }

    #[test]
    fn add_isohybrid_requires_sector_count_four_and_signature() {
        let mut image = Image::new(opts()).unwrap();
        let mut boot_file = alloc::vec![0u8; 2048];
        boot_file[0x40..0x44].copy_from_slice(&[0xFB, 0xC0, 0x78, 0x70]);
        image
            .add_eltorito("/boot/boot.img", Cursor::new(boot_file.clone()), 2048, EltoritoOptions::default())
            .unwrap();

        let bootstrap = {
            let mut b = [0u8; 432];
            b[0] = 0x33;
            b[1] = 0xED;
            b
        };
        image.add_isohybrid(bootstrap, 1, None, 0, 32, 64, 0x17).unwrap();

        // A boot file without the isolinux signature is rejected.
        image.rm_isohybrid().unwrap();
        image.rm_eltorito().unwrap();
        image
            .add_eltorito("/boot/boot.img", Cursor::new(alloc::vec![0u8; 2048]), 2048, EltoritoOptions::default())
            .unwrap();
        assert!(image.add_isohybrid(bootstrap, 1, None, 0, 32, 64, 0x17).is_err());
    }
}
