//! The extent allocator: a single-pass, strictly ordered re-layout run
//! after every mutation. Nothing here is incremental; each
//! call recomputes every extent, `space_size` and path table location from
//! scratch, which is simpler than threading delta bookkeeping through the
//! mutation API and costs nothing extra since a full walk happens anyway.

use alloc::collections::VecDeque;

use crate::directory::{Content, DirArena, DirHandle};
use crate::susp::su_budget;
use crate::types::Endian;
use crate::volume::{self, VolumeDescriptor};
use crate::{BootState, Image, Result};

const SYSTEM_AREA_EXTENTS: u32 = 16;

impl<'a> Image<'a> {
    /// Re-lays out every extent in the image: volume descriptors, path
    /// tables, directory extents, Rock Ridge continuation areas, the El
    /// Torito boot catalog and boot image, and file bodies, in that order.
    /// Always leaves `space_size`, `path_tbl_size` and the
    /// root directory records internally consistent.
    pub(crate) fn reshuffle(&mut self) -> Result<()> {
        let block_size = self.block_size();
        let mut extent = SYSTEM_AREA_EXTENTS;

        // Step 1: the PVD is always at extent 16.
        extent += 1;

        // Step 2: Boot Record descriptors occupy the extents right after
        // the PVD, one each, in volume-descriptor-list order.
        let boot_record_count =
            self.volume_descriptors
                .iter()
                .filter(|vd| matches!(vd, VolumeDescriptor::BootRecord(_)))
                .count() as u32;
        extent += boot_record_count;

        // Step 3: Supplementary Volume Descriptors (Joliet).
        let svd_count = self
            .volume_descriptors
            .iter()
            .filter(|vd| matches!(vd, VolumeDescriptor::Supplementary(_)))
            .count() as u32;
        extent += svd_count;

        // Step 4: Set Terminator.
        extent += 1;

        // Step 5: the engine's always-emitted Version Descriptor.
        extent += 1;

        // Step 6: Primary path tables (LE then BE). path_table_num_extents
        // is the extent count for a *single* table copy, allocated in full
        // once for LE and again for BE (not halved between them).
        let primary_pt = crate::path::PathTable::build(&self.primary.arena, self.primary.root);
        let primary_pt_size = primary_pt.size_bytes() as u32;
        let primary_pt_extents = volume::path_table_num_extents(primary_pt_size, block_size).max(1);
        let primary_pt_le_start = extent;
        extent += primary_pt_extents;
        let primary_pt_be_start = extent;
        extent += primary_pt_extents;

        // Step 7: Supplementary (Joliet) path tables, same shape.
        let mut joliet_pt_le_start = 0u32;
        let mut joliet_pt_be_start = 0u32;
        let mut joliet_pt_size = 0u32;
        if let Some(joliet) = &self.joliet {
            let pt = crate::path::PathTable::build(&joliet.arena, joliet.root);
            joliet_pt_size = pt.size_bytes() as u32;
            let joliet_pt_extents = volume::path_table_num_extents(joliet_pt_size, block_size).max(1);
            joliet_pt_le_start = extent;
            extent += joliet_pt_extents;
            joliet_pt_be_start = extent;
            extent += joliet_pt_extents;
        }

        // Step 8: Primary directory tree, breadth-first, with dot/dotdot
        // extent mirroring.
        assign_directory_extents(&mut self.primary.arena, self.primary.root, block_size, &mut extent);

        // Step 9: Supplementary directory tree, same walk.
        if let Some(joliet) = &mut self.joliet {
            assign_directory_extents(&mut joliet.arena, joliet.root, block_size, &mut extent);
        }

        // Step 10: Rock Ridge continuation areas (primary tree only; the
        // Joliet tree never carries Rock Ridge).
        assign_rock_ridge_continuations(&mut self.primary.arena, block_size, &mut extent);

        // Step 11: the El Torito boot catalog and the boot image it
        // references, both skipped by the general file walk in step 12.
        if let Some(boot) = self.boot.take() {
            let BootState {
                mut catalog,
                primary_catalog_dir,
                primary_boot_dir,
                joliet_catalog_dir,
                joliet_boot_dir,
            } = boot;

            let catalog_extent = extent;
            extent += 1;
            if let Some(br) = self.volume_descriptors.boot_record_mut() {
                br.set_catalog_extent(catalog_extent);
            }
            self.primary.arena.get_mut(primary_catalog_dir).extent_new = catalog_extent;
            self.primary.arena.get_mut(primary_catalog_dir).data_length = block_size;
            if let (Some(jc), Some(joliet)) = (joliet_catalog_dir, self.joliet.as_mut()) {
                joliet.arena.get_mut(jc).extent_new = catalog_extent;
                joliet.arena.get_mut(jc).data_length = block_size;
            }

            let boot_len = self.primary.arena.get(primary_boot_dir).data_length;
            let boot_extent = extent;
            extent += boot_len.div_ceil(block_size).max(1);
            self.primary.arena.get_mut(primary_boot_dir).extent_new = boot_extent;
            if let (Some(jb), Some(joliet)) = (joliet_boot_dir, self.joliet.as_mut()) {
                joliet.arena.get_mut(jb).extent_new = boot_extent;
            }
            catalog.initial_entry.load_rba.set(boot_extent);

            self.boot = Some(BootState {
                catalog,
                primary_catalog_dir,
                primary_boot_dir,
                joliet_catalog_dir,
                joliet_boot_dir,
            });
        }

        // Step 12: file bodies, in directory-walk order, skipping anything
        // already placed by step 11.
        assign_file_extents(self, &mut extent);

        // Step 13: refresh the path tables against the final extents, then
        // the volume descriptors' bookkeeping fields.
        self.primary.path_table = crate::path::PathTable::build(&self.primary.arena, self.primary.root);
        if let Some(joliet) = &mut self.joliet {
            joliet.path_table = crate::path::PathTable::build(&joliet.arena, joliet.root);
        }

        let space_size = extent;
        let primary_root_extent = self.primary.arena.get(self.primary.root).extent_new;
        let primary_root_len = self.primary.arena.get(self.primary.root).data_length;
        {
            let pvd = self.volume_descriptors.primary_mut();
            pvd.space_size.set(space_size);
            pvd.path_tbl_size.set(primary_pt_size);
            pvd.path_table_location_le.set(primary_pt_le_start);
            pvd.path_table_location_be.set(primary_pt_be_start);
            pvd.root_directory_record.set_extent(primary_root_extent);
            pvd.root_directory_record.set_data_length(primary_root_len);
        }

        if let Some(joliet) = &self.joliet {
            let root_extent = joliet.arena.get(joliet.root).extent_new;
            let root_len = joliet.arena.get(joliet.root).data_length;
            if let Some(svd) = self.volume_descriptors.joliet_mut() {
                svd.space_size.set(space_size);
                svd.path_tbl_size.set(joliet_pt_size);
                svd.path_table_location_le.set(joliet_pt_le_start);
                svd.path_table_location_be.set(joliet_pt_be_start);
                svd.root_directory_record.set_extent(root_extent);
                svd.root_directory_record.set_data_length(root_len);
            }
        }

        Ok(())
    }
}

/// Walks `root` breadth-first, assigning each directory its own extent and
/// mirroring it onto its children's `.`/`..` records: a directory's dot
/// record copies its own new extent; its dotdot record copies its parent's,
/// or its own for the root, which has no parent.
fn assign_directory_extents(arena: &mut DirArena, root: DirHandle, block_size: u32, extent: &mut u32) {
    let mut queue = VecDeque::new();
    queue.push_back(root);
    while let Some(dir) = queue.pop_front() {
        let my_extent = *extent;
        let data_length = arena.get(dir).data_length;
        arena.get_mut(dir).extent_new = my_extent;
        *extent += data_length.div_ceil(block_size).max(1);

        let parent_extent = arena.get(dir).parent.map(|p| arena.get(p).extent_new);
        let children = arena.get(dir).children.clone();
        for child in children {
            if arena.get(child).is_dot() {
                arena.get_mut(child).extent_new = my_extent;
            } else if arena.get(child).is_dotdot() {
                arena.get_mut(child).extent_new = parent_extent.unwrap_or(my_extent);
            } else if arena.get(child).is_directory() {
                queue.push_back(child);
            }
        }
    }
}

/// Packs every Rock Ridge record that doesn't fit in its directory record
/// and assigns its continuation a (extent, offset) slot, tightly packing
/// continuation chunks into logical blocks in arena order. Records it
/// packs cleanly inline never touch `continuation_loc`.
fn assign_rock_ridge_continuations(arena: &mut DirArena, block_size: u32, extent: &mut u32) {
    let mut cur_extent: Option<u32> = None;
    let mut cur_offset: u32 = 0;

    for i in 0..arena.len() {
        let handle = DirHandle(i as u32);
        let (has_rr, ident_len) = {
            let rec = arena.get(handle);
            (rec.rock_ridge.is_some(), rec.file_ident.len())
        };
        if !has_rr {
            continue;
        }
        let budget = su_budget(ident_len);
        let packed_len = {
            let rec = arena.get(handle);
            rec.rock_ridge.as_ref().unwrap().pack(budget).continuation.len() as u32
        };
        if packed_len == 0 {
            continue;
        }
        if cur_extent.is_none() || cur_offset + packed_len > block_size {
            let next = cur_extent.map(|e| e + 1).unwrap_or(*extent);
            cur_extent = Some(next);
            cur_offset = 0;
        }
        let e = cur_extent.unwrap();
        arena.get_mut(handle).rock_ridge.as_mut().unwrap().continuation_loc = Some((e, cur_offset));
        cur_offset += packed_len;
    }

    if let Some(last) = cur_extent {
        *extent = last + 1;
    }
}

/// Walks the Primary tree breadth-first in the same order used for
/// directory extents, assigning every ordinary file body its extent and
/// mirroring it onto its Joliet counterpart, if any. Records with no
/// content (symlinks, zero-length placeholders) and the two records the El
/// Torito boot state already claimed are skipped.
fn assign_file_extents(image: &mut Image, extent: &mut u32) {
    let block_size = image.block_size();
    let root = image.primary.root;
    let is_eltorito_bound = |h: DirHandle, boot: &Option<BootState>| {
        boot.as_ref()
            .map(|b| b.primary_catalog_dir == h || b.primary_boot_dir == h)
            .unwrap_or(false)
    };

    let mut queue = VecDeque::new();
    queue.push_back(root);
    while let Some(dir) = queue.pop_front() {
        let children = image.primary.arena.get(dir).children.clone();
        for child in children {
            let rec = image.primary.arena.get(child);
            if rec.is_dot() || rec.is_dotdot() {
                continue;
            }
            if rec.is_directory() {
                queue.push_back(child);
                continue;
            }
            if is_eltorito_bound(child, &image.boot) {
                continue;
            }
            if !matches!(rec.content, Content::Original | Content::External(_)) {
                continue;
            }
            let len = rec.data_length;
            let mirror = rec.mirror;
            let file_extent = *extent;
            *extent += len.div_ceil(block_size).max(1);
            image.primary.arena.get_mut(child).extent_new = file_extent;
            if let (Some(mirror_handle), Some(joliet)) = (mirror, image.joliet.as_mut()) {
                joliet.arena.get_mut(mirror_handle).extent_new = file_extent;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::options::NewOptions;
    use crate::Image;

    #[test]
    fn fresh_image_reshuffle_is_a_fixed_point() {
        let image = Image::new(NewOptions::default()).unwrap();
        let space_size_1 = image.volume_descriptors.primary().space_size.get_lenient();

        let mut image2 = Image::new(NewOptions::default()).unwrap();
        image2.reshuffle().unwrap();
        let space_size_2 = image2.volume_descriptors.primary().space_size.get_lenient();

        assert_eq!(space_size_1, space_size_2);
        assert!(space_size_1 >= 16 + 1 + 1 + 1);
    }

    #[test]
    fn joliet_image_gets_a_supplementary_descriptor_and_matching_space_size() {
        let opts = NewOptions::default().with_joliet(true);
        let image = Image::new(opts).unwrap();
        assert!(image.volume_descriptors.joliet().is_some());
        let pvd_size = image.volume_descriptors.primary().space_size.get_lenient();
        let svd_size = image
            .volume_descriptors
            .joliet()
            .unwrap()
            .space_size
            .get_lenient();
        assert_eq!(pvd_size, svd_size);
    }
}
