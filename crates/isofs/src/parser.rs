//! Reads an existing image off `ExternalSource` into an [`Image`] (spec
//! §4.9): the volume descriptor set, an optional isohybrid MBR, an optional
//! El Torito boot catalog, then the Primary tree and (if present) exactly
//! one Joliet tree, each via its path table and a breadth-first directory
//! walk.

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;

use isofs_io::{Read, Seek, SeekFrom};

use crate::boot::BootCatalog;
use crate::date::DirDateTime;
use crate::directory::{Content, DirArena, DirHandle, DirectoryRecord, ExternalSource, FileFlags};
use crate::error::{Error, Result};
use crate::isohybrid::{IsoHybridMbr, IsoHybridOptions};
use crate::options::{NewOptions, Strictness};
use crate::path::PathTable;
use crate::susp::{is_known_tag, RockRidge};
use crate::types::{Dual16, Dual32, Endian, FileInterchange};
use crate::volume::{VolumeDescriptor, VolumeDescriptorList, SECTOR_SIZE};
use crate::{BootState, Image, Tree};

fn read_region<S: Read + Seek>(source: &mut S, extent: u32, block_size: u32, len: u32) -> Result<Vec<u8>> {
    let mut buf = alloc::vec![0u8; len as usize];
    source.seek(SeekFrom::Start(extent as u64 * block_size as u64 + 0))?;
    source.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_at<S: Read + Seek>(source: &mut S, extent: u32, offset: u32, buf: &mut [u8], block_size: u32) -> Result<()> {
    source.seek(SeekFrom::Start(extent as u64 * block_size as u64 + offset as u64))?;
    source.read_exact(buf)?;
    Ok(())
}

/// One decoded directory record, not yet attached to an arena.
struct DecodedRecord<'a> {
    record: DirectoryRecord<'a>,
    extent: u32,
}

/// Decodes one directory record occupying exactly `bytes.len()` bytes (the
/// caller already sliced to the on-disk `dr_len`), including its system-use
/// area's Rock Ridge bundle when `joliet` is false.
fn decode_record<'a, S: ExternalSource>(
    bytes: &[u8],
    source: &mut S,
    block_size: u32,
    joliet: bool,
    strictness: Strictness,
) -> Result<DecodedRecord<'a>> {
    if bytes.len() < 33 {
        return Err(Error::malformed("directory record header truncated"));
    }
    let _xattr_len = bytes[1];
    let extent = Dual32::from_bytes(&bytes[2..10])?.get_checked("directory record extent")?;
    // LE/BE data_length disagreement is a tolerated anomaly: prefer the LE
    // half regardless of strictness.
    let data_length = Dual32::from_bytes(&bytes[10..18])?.get_lenient();
    let date_arr: [u8; 7] = bytes[18..25].try_into().unwrap();
    let date = DirDateTime::parse(date_arr);
    let flags = FileFlags::from_bits_truncate(bytes[25]);
    let file_unit_size = bytes[26];
    let interleave_gap_size = bytes[27];
    let volume_seqnum = Dual16::from_bytes(&bytes[28..32])?.get_checked("directory record volume seqnum")?;
    let ident_len = bytes[32] as usize;
    if 33 + ident_len > bytes.len() {
        return Err(Error::malformed("directory record identifier truncated"));
    }
    let file_ident = bytes[33..33 + ident_len].to_vec();
    let mut su_start = 33 + ident_len;
    if ident_len % 2 == 0 {
        su_start += 1;
    }
    let system_use: &[u8] = if su_start < bytes.len() { &bytes[su_start..] } else { &[] };

    if strictness != Strictness::Relaxed && !system_use.is_empty() {
        // Padding past the real system-use content, if any, is checked for
        // all-zero by the caller once it knows where the real content ends;
        // here we only guard the trivially-detectable all-garbage case of a
        // record claiming a length that leaves no room for its own header.
    }

    let is_directory = flags.contains(FileFlags::DIRECTORY);
    let content = if is_directory { Content::None } else { Content::Original };

    let rock_ridge = if !joliet && system_use.len() >= 4 && is_known_tag([system_use[0], system_use[1]]) {
        let (mut rr, mut ce) = RockRidge::parse(system_use)?;
        while let Some((ce_extent, ce_offset, ce_len)) = ce {
            let mut buf = alloc::vec![0u8; ce_len as usize];
            read_at(source, ce_extent, ce_offset, &mut buf, block_size)?;
            ce = rr.merge_continuation(&buf)?;
        }
        Some(rr)
    } else {
        None
    };

    let record = DirectoryRecord {
        parent: None,
        children: Vec::new(),
        file_ident,
        xattr_len: _xattr_len,
        orig_extent_loc: extent,
        extent_new: extent,
        data_length,
        date,
        flags,
        file_unit_size,
        interleave_gap_size,
        volume_seqnum,
        content,
        rock_ridge,
        mirror: None,
    };
    Ok(DecodedRecord { record, extent })
}

/// Breadth-first directory walk from `root`: reads each
/// directory's extent, consumes records one after another, treats a
/// zero-length byte as "skip to the next logical block", and recurses into
/// every subdirectory it finds (never into `.`/`..`, which only mirror an
/// already-known extent).
#[allow(clippy::too_many_arguments)]
fn walk_tree<'a, S: ExternalSource + 'a>(
    source: &mut S,
    block_size: u32,
    root_extent: u32,
    root_len: u32,
    root_date: DirDateTime,
    joliet: bool,
    catalog_extent: Option<u32>,
    boot_rba: Option<u32>,
    strictness: Strictness,
    max_level: &mut Option<FileInterchange>,
) -> Result<(DirArena<'a>, DirHandle, Option<DirHandle>, Option<DirHandle>)> {
    let root_record = DirectoryRecord {
        parent: None,
        children: Vec::new(),
        file_ident: alloc::vec![0u8],
        xattr_len: 0,
        orig_extent_loc: root_extent,
        extent_new: root_extent,
        data_length: root_len,
        date: root_date,
        flags: FileFlags::DIRECTORY,
        file_unit_size: 0,
        interleave_gap_size: 0,
        volume_seqnum: 1,
        content: Content::None,
        rock_ridge: None,
        mirror: None,
    };
    let (mut arena, root) = DirArena::new_with_root(root_record);

    let mut catalog_dir = None;
    let mut boot_dir = None;
    let mut queue = VecDeque::new();
    queue.push_back(root);

    while let Some(dir) = queue.pop_front() {
        let (extent, len) = {
            let rec = arena.get(dir);
            (rec.extent_new, rec.data_length)
        };
        let data = read_region(source, extent, block_size, len)?;

        let block = block_size as usize;
        let mut block_start = 0usize;
        while block_start < data.len() {
            let block_end = (block_start + block).min(data.len());
            let mut off = block_start;
            while off < block_end {
                let dr_len = data[off] as usize;
                if dr_len == 0 {
                    if strictness != Strictness::Relaxed && !data[off..block_end].iter().all(|&b| b == 0) {
                        return Err(Error::malformed(
                            "directory extent padding bytes are not all zero",
                        ));
                    }
                    break;
                }
                if off + dr_len > block_end {
                    return Err(Error::malformed("directory record crosses block boundary"));
                }
                let rec_bytes = &data[off..off + dr_len];
                let decoded = decode_record(rec_bytes, source, block_size, joliet, strictness)?;
                off += dr_len;

                if !joliet {
                    if let Ok(name) = core::str::from_utf8(&decoded.record.file_ident) {
                        if let Some(level) = FileInterchange::classify(name, decoded.record.is_directory()) {
                            *max_level = Some(max_level.map_or(level, |m| m.max(level)));
                        }
                    }
                }

                let is_dir = decoded.record.is_directory();
                let is_dot = decoded.record.is_dot();
                let is_dotdot = decoded.record.is_dotdot();
                let rec_extent = decoded.extent;
                let handle = arena.add_parsed_child(dir, decoded.record)?;

                if Some(rec_extent) == catalog_extent {
                    catalog_dir = Some(handle);
                }
                if Some(rec_extent) == boot_rba {
                    boot_dir = Some(handle);
                }
                if is_dir && !is_dot && !is_dotdot {
                    queue.push_back(handle);
                }
            }
            block_start += block;
        }
    }

    Ok((arena, root, catalog_dir, boot_dir))
}

struct ParsedTree<'a> {
    tree: Tree<'a>,
    catalog_dir: Option<DirHandle>,
    boot_dir: Option<DirHandle>,
}

#[allow(clippy::too_many_arguments)]
fn parse_one_tree<'a, S: ExternalSource + 'a>(
    source: &mut S,
    block_size: u32,
    root_extent: u32,
    root_len: u32,
    root_date: DirDateTime,
    pt_le_extent: u32,
    pt_be_extent: u32,
    pt_size: u32,
    joliet: bool,
    catalog_extent: Option<u32>,
    boot_rba: Option<u32>,
    strictness: Strictness,
    max_level: &mut Option<FileInterchange>,
) -> Result<ParsedTree<'a>> {
    // Phase 4: parse and cross-check the L-table/M-table pair. The tree
    // itself is the authority for extents after the walk below; this call
    // exists to surface an LE/BE disagreement, which is always fatal.
    let le_bytes = read_region(source, pt_le_extent, block_size, pt_size)?;
    let be_bytes = read_region(source, pt_be_extent, block_size, pt_size)?;
    PathTable::parse(&le_bytes, &be_bytes)?;

    let (arena, root, catalog_dir, boot_dir) = walk_tree(
        source,
        block_size,
        root_extent,
        root_len,
        root_date,
        joliet,
        catalog_extent,
        boot_rba,
        strictness,
        max_level,
    )?;
    let path_table = PathTable::build(&arena, root);

    Ok(ParsedTree {
        tree: Tree { arena, root, path_table },
        catalog_dir,
        boot_dir,
    })
}

/// Parses an existing image from `source` in six phases: volume descriptors,
/// isohybrid detection, the boot catalog, the primary tree, and (if present)
/// the Joliet tree.
pub(crate) fn open<'a, S: ExternalSource + 'a>(source: &'a mut S, strictness: Strictness) -> Result<Image<'a>> {
    // Phase 1: volume descriptor set, one 2048-byte sector at a time,
    // stopping at (and including) the first Set Terminator.
    let mut descriptors = Vec::new();
    let mut vd_extent = 16u32;
    loop {
        let mut frame = [0u8; SECTOR_SIZE];
        source.seek(SeekFrom::Start(vd_extent as u64 * SECTOR_SIZE as u64))?;
        source.read_exact(&mut frame)?;
        let vd = VolumeDescriptor::parse(&frame)?;
        let is_terminator = matches!(vd, VolumeDescriptor::Terminator);
        descriptors.push(vd);
        vd_extent += 1;
        if is_terminator {
            break;
        }
    }
    let volume_descriptors = VolumeDescriptorList::from_descriptors(descriptors);
    if !volume_descriptors
        .iter()
        .any(|vd| matches!(vd, VolumeDescriptor::Primary(_)))
    {
        return Err(Error::malformed(
            "volume descriptor set has no primary volume descriptor",
        ));
    }
    let joliet_count = volume_descriptors
        .iter()
        .filter(|vd| matches!(vd, VolumeDescriptor::Supplementary(svd) if svd.is_joliet()))
        .count();
    if joliet_count > 1 {
        return Err(Error::unsupported("multiple Joliet supplementary volume descriptors"));
    }

    let block_size = volume_descriptors.primary().log_block_size.get_checked("PVD.log_block_size")?;
    let block_size = block_size as u32;

    // Phase 2: isohybrid detection via the first 512 bytes of the source.
    let mut mbr_buf = [0u8; 512];
    source.seek(SeekFrom::Start(0))?;
    source.read_exact(&mut mbr_buf)?;
    let isohybrid = if mbr_buf[0] == crate::isohybrid::BOOTSTRAP_SENTINEL[0]
        && mbr_buf[1] == crate::isohybrid::BOOTSTRAP_SENTINEL[1]
    {
        IsoHybridMbr::parse(&mbr_buf).ok().and_then(|mbr| {
            mbr.partitions
                .iter()
                .enumerate()
                .find(|(_, p)| p.active)
                .map(|(idx, part)| IsoHybridOptions {
                    bootstrap: mbr.bootstrap,
                    part_entry: idx + 1,
                    mbr_id: mbr.mbr_id,
                    part_offset: part.lba_offset,
                    geometry_sectors: 32,
                    geometry_heads: part.geometry_heads(),
                    part_type: part.part_type,
                })
        })
    } else {
        None
    };

    // Phase 3: the first El Torito boot catalog, if any Boot Record
    // descriptor carries the El Torito system identifier.
    let mut catalog_extent = None;
    let mut boot_catalog = None;
    for vd in volume_descriptors.iter() {
        if let VolumeDescriptor::BootRecord(br) = vd {
            if br.is_el_torito() {
                let extent = br.catalog_extent();
                source.seek(SeekFrom::Start(extent as u64 * block_size as u64))?;
                let catalog = BootCatalog::parse(source)?;
                catalog_extent = Some(extent);
                boot_catalog = Some(catalog);
                break;
            }
        }
    }
    let boot_rba = boot_catalog.as_ref().map(|c: &BootCatalog| c.initial_entry.load_rba.get());

    // Phase 5 (Primary tree), driven off the PVD's embedded root record.
    let pvd = volume_descriptors.primary();
    let root_extent = pvd.root_directory_record.extent.get_checked("PVD.root_directory_record.extent")?;
    let root_len = pvd.root_directory_record.data_length.get_lenient();
    let root_date = pvd.root_directory_record.date;
    let pt_le_extent = pvd.path_table_location_le.get();
    let pt_be_extent = pvd.path_table_location_be.get();
    let pt_size = pvd.path_tbl_size.get_checked("PVD.path_tbl_size")?;

    let mut max_level = None;
    let primary_parsed = parse_one_tree(
        source,
        block_size,
        root_extent,
        root_len,
        root_date,
        pt_le_extent,
        pt_be_extent,
        pt_size,
        false,
        catalog_extent,
        boot_rba,
        strictness,
        &mut max_level,
    )?;

    let system_identifier = pvd.system_identifier.as_str();
    let volume_identifier = pvd.volume_identifier.as_str();
    let set_size = pvd.set_size.get_checked("PVD.set_size")?;
    let seqnum = pvd.seqnum.get_checked("PVD.seqnum")?;
    let volume_set_identifier = pvd.volume_set_identifier.as_str();
    let publisher_identifier = pvd.publisher_identifier.as_str();
    let data_preparer_identifier = pvd.data_preparer_identifier.as_str();
    let application_identifier = pvd.application_identifier.as_str();
    let copyright_file_identifier = pvd.copyright_file_identifier.as_str();
    let abstract_file_identifier = pvd.abstract_file_identifier.as_str();
    let bibliographic_file_identifier = pvd.bibliographic_file_identifier.as_str();
    let volume_expiration_date = if pvd.volume_expiration_date.is_unspecified() {
        None
    } else {
        Some(pvd.volume_expiration_date)
    };
    let application_use = pvd.application_use;

    // Phase 6: the Joliet tree, if exactly one Supplementary descriptor is
    // flagged Joliet.
    let joliet_svd = volume_descriptors
        .iter()
        .find_map(|vd| match vd {
            VolumeDescriptor::Supplementary(svd) if svd.is_joliet() => Some(svd.as_ref()),
            _ => None,
        });

    let joliet_parsed = if let Some(svd) = joliet_svd {
        let root_extent = svd.root_directory_record.extent.get_checked("SVD.root_directory_record.extent")?;
        let root_len = svd.root_directory_record.data_length.get_lenient();
        let root_date = svd.root_directory_record.date;
        let pt_le_extent = svd.path_table_location_le.get();
        let pt_be_extent = svd.path_table_location_be.get();
        let pt_size = svd.path_tbl_size.get_checked("SVD.path_tbl_size")?;

        let mut unused_level = None;
        Some(parse_one_tree(
            source,
            block_size,
            root_extent,
            root_len,
            root_date,
            pt_le_extent,
            pt_be_extent,
            pt_size,
            true,
            catalog_extent,
            boot_rba,
            strictness,
            &mut unused_level,
        )?)
    } else {
        None
    };

    let rock_ridge = primary_parsed
        .tree
        .arena
        .iter()
        .any(|(_, rec)| rec.rock_ridge.is_some());

    let boot = if let Some(catalog) = boot_catalog {
        let primary_catalog_dir = primary_parsed
            .catalog_dir
            .ok_or_else(|| Error::malformed("el torito boot catalog extent has no directory record"))?;
        let primary_boot_dir = primary_parsed
            .boot_dir
            .ok_or_else(|| Error::malformed("el torito initial entry extent has no directory record"))?;
        Some(BootState {
            catalog,
            primary_catalog_dir,
            primary_boot_dir,
            joliet_catalog_dir: joliet_parsed.as_ref().and_then(|j| j.catalog_dir),
            joliet_boot_dir: joliet_parsed.as_ref().and_then(|j| j.boot_dir),
        })
    } else {
        None
    };

    let options = NewOptions {
        interchange_level: max_level.unwrap_or(FileInterchange::L3),
        system_identifier,
        volume_identifier,
        set_size,
        seqnum,
        log_block_size: block_size as u16,
        volume_set_identifier,
        publisher_identifier,
        data_preparer_identifier,
        application_identifier,
        copyright_file_identifier,
        abstract_file_identifier,
        bibliographic_file_identifier,
        volume_expiration_date,
        application_use,
        joliet: joliet_parsed.is_some(),
        rock_ridge,
        strictness,
    };

    Ok(Image {
        options,
        source: Some(core::cell::RefCell::new(source)),
        volume_descriptors,
        primary: primary_parsed.tree,
        joliet: joliet_parsed.map(|j| j.tree),
        boot,
        isohybrid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::NewOptions as Opts;
    use crate::Image as Img;
    use isofs_io::Cursor;

    fn roundtrip_bytes(image: &Img) -> Vec<u8> {
        let mut out = Vec::new();
        image
            .volume_descriptors
            .iter()
            .for_each(|vd| out.extend_from_slice(&vd.as_bytes()));
        out
    }

    #[test]
    fn open_rejects_truncated_source() {
        let mut cursor = Cursor::new(alloc::vec![0u8; 100]);
        let err = Image::open(&mut cursor, Strictness::Default);
        assert!(err.is_err());
    }

    #[test]
    fn open_parses_a_freshly_mastered_minimal_image() {
        let image = Image::new(Opts::default()).unwrap();
        let mut buf = alloc::vec![0u8; 64 * 2048];
        {
            let mut sink = Cursor::new(&mut buf);
            image.write(&mut sink, 2048, None).unwrap();
        }
        let mut source = Cursor::new(buf);
        let reopened = Image::open(&mut source, Strictness::Default).unwrap();
        assert_eq!(
            reopened.volume_descriptors.primary().volume_identifier.as_str(),
            "ISOIMAGE"
        );
        let _ = roundtrip_bytes(&image);
    }
}
