//! Serializes an `Image` to a byte sink: the counterpart to `reshuffle`,
//! writing each region the allocator already assigned an extent to, in the
//! same order it assigned them. Nothing here
//! recomputes a layout decision; a fresh `reshuffle` is what keeps the
//! fields this module reads (`extent_new`, `path_table_location_*`,
//! `continuation_loc`, ...) trustworthy.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use isofs_io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::directory::{Content, DirArena, DirHandle, ExternalSource};
use crate::error::{Error, Result};
use crate::isohybrid::{self, IsoHybridMbr};
use crate::path::PathTable;
use crate::susp::su_budget;
use crate::types::Endian;
use crate::volume::{self, VolumeDescriptor};
use crate::Image;

const SYSTEM_AREA_EXTENTS: u32 = 16;

fn abs(prefix: u64, block_size: u64, extent: u32) -> u64 {
    prefix + extent as u64 * block_size
}

/// Advances the cumulative byte counter and, if a callback was given,
/// reports it against `total`.
fn bump(progress: &mut Option<&mut dyn FnMut(u64, u64)>, written: &mut u64, n: u64, total: u64) {
    *written += n;
    if let Some(cb) = progress.as_mut() {
        (*cb)(*written, total);
    }
}

fn write_zeros<W: Write>(sink: &mut W, mut n: u64) -> Result<()> {
    const ZEROS: [u8; 4096] = [0u8; 4096];
    while n > 0 {
        let chunk = (n as usize).min(ZEROS.len());
        sink.write_all(&ZEROS[..chunk])?;
        n -= chunk as u64;
    }
    Ok(())
}

/// Copies exactly `len` bytes from `src`'s current position to `dst`'s,
/// `iobuf` bytes at a time. `src` here is always a `dyn ExternalSource`, so
/// a zero-copy OS-handle transfer has no trait-object-safe expression and is
/// not attempted — see DESIGN.md.
fn copy_exact<S: Read + ?Sized, W: Write>(src: &mut S, dst: &mut W, mut len: u32, iobuf: u32) -> Result<()> {
    let chunk = (iobuf.max(1) as usize).min(len.max(1) as usize).max(1);
    let mut buf = alloc::vec![0u8; chunk];
    while len > 0 {
        let n = (len as usize).min(buf.len());
        src.read_exact(&mut buf[..n])?;
        dst.write_all(&buf[..n])?;
        len -= n as u32;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_path_table<W: Write + Seek>(
    sink: &mut W,
    table: &PathTable,
    le_extent: u32,
    be_extent: u32,
    pt_size: u32,
    prefix: u64,
    block_size: u64,
    progress: &mut Option<&mut dyn FnMut(u64, u64)>,
    written: &mut u64,
    total: u64,
) -> Result<()> {
    let extents_per_table = volume::path_table_num_extents(pt_size, block_size as u32).max(1);
    let span = extents_per_table as u64 * block_size;
    for (extent, mut bytes) in [(le_extent, table.serialize_le()), (be_extent, table.serialize_be())] {
        bytes.resize(span as usize, 0);
        sink.seek(SeekFrom::Start(abs(prefix, block_size, extent)))?;
        sink.write_all(&bytes)?;
        bump(progress, written, span, total);
    }
    Ok(())
}

/// Writes one tree's directory extents breadth-first, emitting each
/// directory's children as consecutive `DirectoryRecord::encode` frames
/// padded to the directory's own `data_length`, then writing any Rock Ridge
/// continuation area those children's `CE` pointers referenced.
#[allow(clippy::too_many_arguments)]
fn write_tree<W: Write + Seek>(
    sink: &mut W,
    arena: &DirArena,
    root: DirHandle,
    prefix: u64,
    block_size: u64,
    progress: &mut Option<&mut dyn FnMut(u64, u64)>,
    written: &mut u64,
    total: u64,
) -> Result<()> {
    let mut queue = VecDeque::new();
    queue.push_back(root);
    while let Some(dir) = queue.pop_front() {
        let (extent, data_length, children) = {
            let rec = arena.get(dir);
            (rec.extent_new, rec.data_length, rec.children.clone())
        };

        let mut buf = Vec::with_capacity(data_length as usize);
        let mut pending_continuations: Vec<(u32, u32, Vec<u8>)> = Vec::new();

        for &child in &children {
            let crec = arena.get(child);
            let system_use = match &crec.rock_ridge {
                Some(rr) => {
                    let budget = su_budget(crec.file_ident.len());
                    let mut packed = rr.pack(budget);
                    if let Some((ce_extent, ce_offset)) = rr.continuation_loc {
                        packed.patch_ce(ce_extent, ce_offset, packed.continuation.len() as u32);
                        if !packed.continuation.is_empty() {
                            pending_continuations.push((ce_extent, ce_offset, packed.continuation));
                        }
                    }
                    packed.inline
                }
                None => Vec::new(),
            };
            buf.extend_from_slice(&crec.encode(&system_use));

            if crec.is_directory() && !crec.is_dot() && !crec.is_dotdot() {
                queue.push_back(child);
            }
        }
        buf.resize(data_length as usize, 0);

        sink.seek(SeekFrom::Start(abs(prefix, block_size, extent)))?;
        sink.write_all(&buf)?;
        bump(progress, written, buf.len() as u64, total);

        for (ce_extent, ce_offset, bytes) in pending_continuations {
            sink.seek(SeekFrom::Start(abs(prefix, block_size, ce_extent) + ce_offset as u64))?;
            let len = bytes.len() as u64;
            sink.write_all(&bytes)?;
            bump(progress, written, len, total);
        }
    }
    Ok(())
}

/// Walks the Primary tree breadth-first, writing each ordinary file's body
/// at its `extent_new` and zero-padding the tail to a block boundary (spec
/// §4.12). Joliet file records never own content of their own — they mirror
/// the Primary record's extent — so only the Primary tree is walked here.
#[allow(clippy::too_many_arguments)]
fn write_file_bodies<W: Write + Seek>(
    image: &Image,
    sink: &mut W,
    prefix: u64,
    block_size: u64,
    iobuf: u32,
    progress: &mut Option<&mut dyn FnMut(u64, u64)>,
    written: &mut u64,
    total: u64,
) -> Result<()> {
    let arena = &image.primary.arena;
    let mut queue = VecDeque::new();
    queue.push_back(image.primary.root);

    while let Some(dir) = queue.pop_front() {
        let children = arena.get(dir).children.clone();
        for child in children {
            let rec = arena.get(child);
            if rec.is_dot() || rec.is_dotdot() {
                continue;
            }
            if rec.is_directory() {
                queue.push_back(child);
                continue;
            }

            match &rec.content {
                Content::None => continue,
                Content::Original => {
                    let cell = image.source.as_ref().ok_or_else(|| {
                        Error::invalid("image has no attached source to read original file content from")
                    })?;
                    let mut guard = cell.borrow_mut();
                    let src: &mut dyn ExternalSource = &mut **guard;
                    src.seek(SeekFrom::Start(rec.orig_extent_loc as u64 * block_size))?;
                    sink.seek(SeekFrom::Start(abs(prefix, block_size, rec.extent_new)))?;
                    copy_exact(src, sink, rec.data_length, iobuf)?;
                }
                Content::External(cell) => {
                    let mut guard = cell.borrow_mut();
                    let src: &mut dyn ExternalSource = &mut **guard;
                    src.seek(SeekFrom::Start(0))?;
                    sink.seek(SeekFrom::Start(abs(prefix, block_size, rec.extent_new)))?;
                    copy_exact(src, sink, rec.data_length, iobuf)?;
                }
            }

            let padded_len = (rec.data_length as u64).div_ceil(block_size) * block_size;
            let pad = padded_len - rec.data_length as u64;
            if pad > 0 {
                write_zeros(sink, pad)?;
            }
            bump(progress, written, padded_len, total);
        }
    }
    Ok(())
}

impl<'a> Image<'a> {
    /// Serializes this image to `sink`. `iobuf` bounds the
    /// chunk size of the block-sized read/write loop used to copy file
    /// bodies; it is unrelated to the image's own logical block size, which
    /// `reshuffle` already fixed in every extent this method reads.
    pub fn write<W: Write + Seek>(
        &self,
        sink: &mut W,
        iobuf: u32,
        mut progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> Result<()> {
        let block_size = self.block_size() as u64;
        let pvd = self.volume_descriptors.primary();
        let space_size = pvd.space_size.get_checked("PVD.space_size")? as u64;
        let total_bytes = space_size * block_size;

        let mbr = match &self.isohybrid {
            Some(opts) => Some(IsoHybridMbr::build(opts, total_bytes)?),
            None => None,
        };
        let prefix: u64 = if mbr.is_some() { 512 } else { 0 };
        let suffix = mbr.as_ref().map(|(_, padding)| *padding).unwrap_or(0);
        let grand_total = prefix + total_bytes + suffix;

        // isofs_io has no truncate primitive; growing the sink to its final
        // size up front means every later seek-and-write lands inside an
        // already-allocated region rather than past the sink's current end.
        if grand_total > 0 {
            sink.seek(SeekFrom::Start(grand_total - 1))?;
            sink.write_all(&[0u8])?;
        }

        let mut written = 0u64;

        if let Some((mbr, _)) = &mbr {
            sink.seek(SeekFrom::Start(0))?;
            sink.write_all(&mbr.to_bytes())?;
            bump(&mut progress, &mut written, 512, grand_total);
        }

        // Volume descriptors, in the order `reshuffle` assigned extents to
        // them: PVD, then Boot Records, then Supplementary descriptors,
        // then the Set Terminator, then the engine's always-emitted Version
        // Descriptor.
        let primary_vd = self
            .volume_descriptors
            .iter()
            .find(|vd| matches!(vd, VolumeDescriptor::Primary(_)))
            .expect("an image always carries exactly one primary volume descriptor");
        let terminator_vd = self
            .volume_descriptors
            .iter()
            .find(|vd| matches!(vd, VolumeDescriptor::Terminator))
            .ok_or_else(|| Error::malformed("volume descriptor set has no set terminator"))?;
        let ordered: Vec<&VolumeDescriptor> = core::iter::once(primary_vd)
            .chain(
                self.volume_descriptors
                    .iter()
                    .filter(|vd| matches!(vd, VolumeDescriptor::BootRecord(_))),
            )
            .chain(
                self.volume_descriptors
                    .iter()
                    .filter(|vd| matches!(vd, VolumeDescriptor::Supplementary(_))),
            )
            .chain(core::iter::once(terminator_vd))
            .collect();

        sink.seek(SeekFrom::Start(abs(prefix, block_size, SYSTEM_AREA_EXTENTS)))?;
        for vd in &ordered {
            sink.write_all(&vd.as_bytes())?;
            bump(&mut progress, &mut written, volume::SECTOR_SIZE as u64, grand_total);
        }
        sink.write_all(&VolumeDescriptor::Version.as_bytes())?;
        bump(&mut progress, &mut written, volume::SECTOR_SIZE as u64, grand_total);

        // Path tables: Primary (LE then BE), then Joliet (LE then BE) if a
        // Joliet tree is attached.
        write_path_table(
            sink,
            &self.primary.path_table,
            pvd.path_table_location_le.get(),
            pvd.path_table_location_be.get(),
            pvd.path_tbl_size.get_lenient(),
            prefix,
            block_size,
            &mut progress,
            &mut written,
            grand_total,
        )?;
        if let Some(joliet) = &self.joliet {
            let svd = self.volume_descriptors.joliet().ok_or_else(|| {
                Error::malformed("joliet tree present with no supplementary volume descriptor")
            })?;
            write_path_table(
                sink,
                &joliet.path_table,
                svd.path_table_location_le.get(),
                svd.path_table_location_be.get(),
                svd.path_tbl_size.get_lenient(),
                prefix,
                block_size,
                &mut progress,
                &mut written,
                grand_total,
            )?;
        }

        // Directory extents and their Rock Ridge continuation areas.
        write_tree(
            sink,
            &self.primary.arena,
            self.primary.root,
            prefix,
            block_size,
            &mut progress,
            &mut written,
            grand_total,
        )?;
        if let Some(joliet) = &self.joliet {
            write_tree(
                sink,
                &joliet.arena,
                joliet.root,
                prefix,
                block_size,
                &mut progress,
                &mut written,
                grand_total,
            )?;
        }

        // El Torito boot catalog.
        if let Some(boot) = &self.boot {
            let catalog_extent = self.primary.arena.get(boot.primary_catalog_dir).extent_new;
            sink.seek(SeekFrom::Start(abs(prefix, block_size, catalog_extent)))?;
            let mut cursor = Cursor::new(Vec::new());
            boot.catalog.write(&mut cursor)?;
            let buf = cursor.into_inner();
            let len = buf.len() as u64;
            sink.write_all(&buf)?;
            bump(&mut progress, &mut written, len, grand_total);
        }

        // File bodies (Primary tree; a Joliet record only ever mirrors its
        // Primary counterpart's extent, never owns content of its own).
        write_file_bodies(self, sink, prefix, block_size, iobuf, &mut progress, &mut written, grand_total)?;

        if let Some((_, padding)) = &mbr {
            if *padding > 0 {
                sink.seek(SeekFrom::Start(prefix + total_bytes))?;
                let bytes = isohybrid::padding_bytes(*padding);
                sink.write_all(&bytes)?;
                bump(&mut progress, &mut written, *padding, grand_total);
            }
        }

        Ok(())
    }

    /// Writes the content of the single file at `iso_path` to `sink` (spec
    /// §6 `get_and_write`), without mastering the rest of the image. Errors
    /// if `iso_path` names a directory or an entry with no content (a
    /// symlink, or a zero-length placeholder).
    pub fn get_and_write<W: Write>(&self, iso_path: &str, sink: &mut W, iobuf: u32) -> Result<()> {
        let handle = self.get_entry(iso_path)?;
        let rec = self.primary.arena.get(handle);
        if rec.is_directory() {
            return Err(Error::invalid("iso path names a directory, not a file"));
        }
        match &rec.content {
            Content::None => Err(Error::invalid("entry has no content to write")),
            Content::Original => {
                let cell = self
                    .source
                    .as_ref()
                    .ok_or_else(|| Error::invalid("image has no attached source to read original file content from"))?;
                let mut guard = cell.borrow_mut();
                let src: &mut dyn ExternalSource = &mut **guard;
                src.seek(SeekFrom::Start(rec.orig_extent_loc as u64 * self.block_size() as u64))?;
                copy_exact(src, sink, rec.data_length, iobuf)
            }
            Content::External(cell) => {
                let mut guard = cell.borrow_mut();
                let src: &mut dyn ExternalSource = &mut **guard;
                src.seek(SeekFrom::Start(0))?;
                copy_exact(src, sink, rec.data_length, iobuf)
            }
        }
    }
}
