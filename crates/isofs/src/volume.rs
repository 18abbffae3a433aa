//! Volume descriptors: Primary, Supplementary (Joliet), Boot
//! Record, Set Terminator and Version, plus the list that owns them.
//!
//! Each descriptor is a fixed 2048-byte frame starting with
//! `(type: u8, "CD001", version: 1)`. All of them are `#[repr(C, packed)]`
//! `bytemuck::Pod` structs so they can be read and written with a single
//! slice copy, mirroring the rest of this crate's on-disk types.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::date::DecDateTime;
use crate::error::{Error, Result};
use crate::types::{AString, BigEndian, Dual16, Dual32, Endian, LittleEndian, U32};

pub const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";
pub const SECTOR_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VolumeDescriptorType {
    BootRecord = 0,
    Primary = 1,
    Supplementary = 2,
    Partition = 3,
    Terminator = 255,
}

impl VolumeDescriptorType {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::BootRecord),
            1 => Ok(Self::Primary),
            2 => Ok(Self::Supplementary),
            3 => Ok(Self::Partition),
            255 => Ok(Self::Terminator),
            other => Err(Error::malformed(alloc::format!(
                "unknown volume descriptor type {other}"
            ))),
        }
    }
}

/// The 34-byte directory record embedded in a volume descriptor, pointing at
/// the root directory's own first directory record.
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RootDirRecord {
    pub len: u8,
    pub xattr_len: u8,
    pub extent: Dual32,
    pub data_length: Dual32,
    pub date: crate::date::DirDateTime,
    pub flags: u8,
    pub file_unit_size: u8,
    pub interleave_gap_size: u8,
    pub volume_seqnum: Dual16,
    pub ident_len: u8,
    pub ident: u8,
}

static_assertions::assert_eq_size!(RootDirRecord, [u8; 34]);

impl RootDirRecord {
    pub fn new(extent: u32, data_length: u32, date: crate::date::DirDateTime) -> Self {
        Self {
            len: 34,
            xattr_len: 0,
            extent: Dual32::new(extent),
            data_length: Dual32::new(data_length),
            date,
            flags: 0b0000_0010, // FileFlags::DIRECTORY
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_seqnum: Dual16::new(1),
            ident_len: 1,
            ident: 0,
        }
    }

    pub fn set_extent(&mut self, extent: u32) {
        self.extent.set(extent);
    }

    pub fn set_data_length(&mut self, len: u32) {
        self.data_length.set(len);
    }
}

/// Primary Volume Descriptor (ECMA-119 8.4).
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PrimaryVolumeDescriptor {
    pub type_code: u8,
    pub standard_identifier: [u8; 5],
    pub version: u8,
    pub unused1: u8,
    pub system_identifier: AString<32>,
    pub volume_identifier: AString<32>,
    pub unused2: [u8; 8],
    pub space_size: Dual32,
    pub unused3: [u8; 32],
    pub set_size: Dual16,
    pub seqnum: Dual16,
    pub log_block_size: Dual16,
    pub path_tbl_size: Dual32,
    pub path_table_location_le: U32<LittleEndian>,
    pub optional_path_table_location_le: U32<LittleEndian>,
    pub path_table_location_be: U32<BigEndian>,
    pub optional_path_table_location_be: U32<BigEndian>,
    pub root_directory_record: RootDirRecord,
    pub volume_set_identifier: AString<128>,
    pub publisher_identifier: AString<128>,
    pub data_preparer_identifier: AString<128>,
    pub application_identifier: AString<128>,
    pub copyright_file_identifier: AString<37>,
    pub abstract_file_identifier: AString<37>,
    pub bibliographic_file_identifier: AString<37>,
    pub volume_creation_date: DecDateTime,
    pub volume_modification_date: DecDateTime,
    pub volume_expiration_date: DecDateTime,
    pub volume_effective_date: DecDateTime,
    pub file_structure_version: u8,
    pub reserved1: u8,
    pub application_use: [u8; 512],
    pub reserved2: [u8; 653],
}

static_assertions::assert_eq_size!(PrimaryVolumeDescriptor, [u8; SECTOR_SIZE]);

impl PrimaryVolumeDescriptor {
    pub fn new(volume_identifier: &str, root: RootDirRecord) -> Result<Self> {
        Ok(Self {
            type_code: VolumeDescriptorType::Primary as u8,
            standard_identifier: *STANDARD_IDENTIFIER,
            version: 1,
            unused1: 0,
            system_identifier: AString::default(),
            volume_identifier: AString::from_str(volume_identifier)?,
            unused2: [0; 8],
            space_size: Dual32::new(0),
            unused3: [0; 32],
            set_size: Dual16::new(1),
            seqnum: Dual16::new(1),
            log_block_size: Dual16::new(SECTOR_SIZE as u16),
            path_tbl_size: Dual32::new(0),
            path_table_location_le: U32::new(0),
            optional_path_table_location_le: U32::new(0),
            path_table_location_be: U32::new(0),
            optional_path_table_location_be: U32::new(0),
            root_directory_record: root,
            volume_set_identifier: AString::default(),
            publisher_identifier: AString::default(),
            data_preparer_identifier: AString::default(),
            application_identifier: AString::default(),
            copyright_file_identifier: AString::default(),
            abstract_file_identifier: AString::default(),
            bibliographic_file_identifier: AString::default(),
            volume_creation_date: DecDateTime::unspecified(),
            volume_modification_date: DecDateTime::unspecified(),
            volume_expiration_date: DecDateTime::unspecified(),
            volume_effective_date: DecDateTime::unspecified(),
            file_structure_version: 1,
            reserved1: 0,
            application_use: [0; 512],
            reserved2: [0; 653],
        })
    }

    pub fn parse(bytes: &[u8; SECTOR_SIZE]) -> Result<Self> {
        let pvd: Self = *bytemuck::from_bytes(bytes);
        if VolumeDescriptorType::from_u8(pvd.type_code)? != VolumeDescriptorType::Primary {
            return Err(Error::malformed("not a primary volume descriptor"));
        }
        if pvd.standard_identifier != *STANDARD_IDENTIFIER {
            return Err(Error::malformed("bad standard identifier"));
        }
        pvd.space_size.get_checked("PVD.space_size")?;
        pvd.path_tbl_size.get_checked("PVD.path_tbl_size")?;
        Ok(pvd)
    }

    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        bytemuck::bytes_of(self).try_into().unwrap()
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SupplementaryFlags: u8 {
        /// Bit 0: the escape sequences do not fully specify every
        /// potential character; absent on a Joliet descriptor.
        const INCOMPLETE_ESCAPE_SEQUENCES = 0b0000_0001;
    }
}

/// Joliet escape sequences recognized at UCS-2 Level 1/2/3.
pub const JOLIET_LEVEL_1: &[u8; 3] = b"%/@";
pub const JOLIET_LEVEL_2: &[u8; 3] = b"%/C";
pub const JOLIET_LEVEL_3: &[u8; 3] = b"%/E";

/// Supplementary Volume Descriptor. Shares the Primary's byte layout; the
/// `unused1`/`unused3` fields become `volume_flags`/`escape_sequences`.
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SupplementaryVolumeDescriptor {
    pub type_code: u8,
    pub standard_identifier: [u8; 5],
    pub version: u8,
    pub volume_flags: u8,
    pub system_identifier: AString<32>,
    pub volume_identifier: AString<32>,
    pub unused2: [u8; 8],
    pub space_size: Dual32,
    pub escape_sequences: [u8; 32],
    pub set_size: Dual16,
    pub seqnum: Dual16,
    pub log_block_size: Dual16,
    pub path_tbl_size: Dual32,
    pub path_table_location_le: U32<LittleEndian>,
    pub optional_path_table_location_le: U32<LittleEndian>,
    pub path_table_location_be: U32<BigEndian>,
    pub optional_path_table_location_be: U32<BigEndian>,
    pub root_directory_record: RootDirRecord,
    pub volume_set_identifier: AString<128>,
    pub publisher_identifier: AString<128>,
    pub data_preparer_identifier: AString<128>,
    pub application_identifier: AString<128>,
    pub copyright_file_identifier: AString<37>,
    pub abstract_file_identifier: AString<37>,
    pub bibliographic_file_identifier: AString<37>,
    pub volume_creation_date: DecDateTime,
    pub volume_modification_date: DecDateTime,
    pub volume_expiration_date: DecDateTime,
    pub volume_effective_date: DecDateTime,
    pub file_structure_version: u8,
    pub reserved1: u8,
    pub application_use: [u8; 512],
    pub reserved2: [u8; 653],
}

static_assertions::assert_eq_size!(SupplementaryVolumeDescriptor, [u8; SECTOR_SIZE]);

impl SupplementaryVolumeDescriptor {
    /// Builds a Joliet descriptor using the UCS-2 Level 3 escape sequence.
    pub fn new_joliet(volume_identifier_utf16be: &[u8; 32], root: RootDirRecord) -> Self {
        let mut escape_sequences = [0u8; 32];
        escape_sequences[..3].copy_from_slice(JOLIET_LEVEL_3);
        Self {
            type_code: VolumeDescriptorType::Supplementary as u8,
            standard_identifier: *STANDARD_IDENTIFIER,
            version: 1,
            volume_flags: 0,
            system_identifier: AString::default(),
            volume_identifier: AString::from_raw(*volume_identifier_utf16be),
            unused2: [0; 8],
            space_size: Dual32::new(0),
            escape_sequences,
            set_size: Dual16::new(1),
            seqnum: Dual16::new(1),
            log_block_size: Dual16::new(SECTOR_SIZE as u16),
            path_tbl_size: Dual32::new(0),
            path_table_location_le: U32::new(0),
            optional_path_table_location_le: U32::new(0),
            path_table_location_be: U32::new(0),
            optional_path_table_location_be: U32::new(0),
            root_directory_record: root,
            volume_set_identifier: AString::default(),
            publisher_identifier: AString::default(),
            data_preparer_identifier: AString::default(),
            application_identifier: AString::default(),
            copyright_file_identifier: AString::default(),
            abstract_file_identifier: AString::default(),
            bibliographic_file_identifier: AString::default(),
            volume_creation_date: DecDateTime::unspecified(),
            volume_modification_date: DecDateTime::unspecified(),
            volume_expiration_date: DecDateTime::unspecified(),
            volume_effective_date: DecDateTime::unspecified(),
            file_structure_version: 1,
            reserved1: 0,
            application_use: [0; 512],
            reserved2: [0; 653],
        }
    }

    /// Whether `escape_sequences` identifies this as a Joliet descriptor:
    /// flags bit 0 clear and one of the three UCS-2 escapes.
    pub fn is_joliet(&self) -> bool {
        let flags = SupplementaryFlags::from_bits_truncate(self.volume_flags);
        if flags.contains(SupplementaryFlags::INCOMPLETE_ESCAPE_SEQUENCES) {
            return false;
        }
        let esc = &self.escape_sequences[..3];
        esc == JOLIET_LEVEL_1 || esc == JOLIET_LEVEL_2 || esc == JOLIET_LEVEL_3
    }

    pub fn parse(bytes: &[u8; SECTOR_SIZE]) -> Result<Self> {
        let svd: Self = *bytemuck::from_bytes(bytes);
        if VolumeDescriptorType::from_u8(svd.type_code)? != VolumeDescriptorType::Supplementary {
            return Err(Error::malformed("not a supplementary volume descriptor"));
        }
        if svd.standard_identifier != *STANDARD_IDENTIFIER {
            return Err(Error::malformed("bad standard identifier"));
        }
        svd.space_size.get_checked("SVD.space_size")?;
        Ok(svd)
    }

    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        bytemuck::bytes_of(self).try_into().unwrap()
    }
}

/// Boot Record Volume Descriptor. When `boot_system_identifier` equals
/// `EL TORITO SPECIFICATION` (space/NUL padded to 32 bytes), the first four
/// bytes of `boot_system_use` little-endian-encode the boot catalog extent.
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BootRecordDescriptor {
    pub type_code: u8,
    pub standard_identifier: [u8; 5],
    pub version: u8,
    pub boot_system_identifier: [u8; 32],
    pub boot_system_use: [u8; 2009],
}

static_assertions::assert_eq_size!(BootRecordDescriptor, [u8; SECTOR_SIZE]);

pub const EL_TORITO_ID: &[u8; 23] = b"EL TORITO SPECIFICATION";

impl BootRecordDescriptor {
    pub fn new_el_torito(catalog_extent: u32) -> Self {
        let mut boot_system_identifier = [0u8; 32];
        boot_system_identifier[..23].copy_from_slice(EL_TORITO_ID);
        let mut boot_system_use = [0u8; 2009];
        boot_system_use[..4].copy_from_slice(&catalog_extent.to_le_bytes());
        Self {
            type_code: VolumeDescriptorType::BootRecord as u8,
            standard_identifier: *STANDARD_IDENTIFIER,
            version: 1,
            boot_system_identifier,
            boot_system_use,
        }
    }

    pub fn is_el_torito(&self) -> bool {
        self.boot_system_identifier[..23] == *EL_TORITO_ID
    }

    pub fn catalog_extent(&self) -> u32 {
        u32::from_le_bytes(self.boot_system_use[..4].try_into().unwrap())
    }

    pub fn set_catalog_extent(&mut self, extent: u32) {
        self.boot_system_use[..4].copy_from_slice(&extent.to_le_bytes());
    }

    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        bytemuck::bytes_of(self).try_into().unwrap()
    }
}

/// Volume Descriptor Set Terminator (ECMA-119 8.3). Must be the last
/// descriptor before the engine's always-zero Version Descriptor.
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TerminatorDescriptor {
    pub type_code: u8,
    pub standard_identifier: [u8; 5],
    pub version: u8,
    pub reserved: [u8; 2041],
}

static_assertions::assert_eq_size!(TerminatorDescriptor, [u8; SECTOR_SIZE]);

impl TerminatorDescriptor {
    pub fn new() -> Self {
        Self {
            type_code: VolumeDescriptorType::Terminator as u8,
            standard_identifier: *STANDARD_IDENTIFIER,
            version: 1,
            reserved: [0; 2041],
        }
    }

    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        bytemuck::bytes_of(self).try_into().unwrap()
    }
}

impl Default for TerminatorDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

/// One volume descriptor, in whichever variant it parsed as.
pub enum VolumeDescriptor {
    Primary(Box<PrimaryVolumeDescriptor>),
    Supplementary(Box<SupplementaryVolumeDescriptor>),
    BootRecord(Box<BootRecordDescriptor>),
    /// Written as an all-zero sector; its content is source-specific and not
    /// required for ECMA-119 conformance.
    Version,
    Terminator,
}

impl VolumeDescriptor {
    pub fn as_bytes(&self) -> [u8; SECTOR_SIZE] {
        match self {
            VolumeDescriptor::Primary(pvd) => *pvd.as_bytes(),
            VolumeDescriptor::Supplementary(svd) => *svd.as_bytes(),
            VolumeDescriptor::BootRecord(br) => *br.as_bytes(),
            VolumeDescriptor::Terminator => *TerminatorDescriptor::new().as_bytes(),
            VolumeDescriptor::Version => [0u8; SECTOR_SIZE],
        }
    }

    /// Parses one 2048-byte frame, dispatching on its type code. The parser
    /// stops walking the set at the first Set Terminator it sees (Design
    /// Note §9); the Version Descriptor that follows it is never itself
    /// passed to this function.
    pub fn parse(bytes: &[u8; SECTOR_SIZE]) -> Result<Self> {
        if bytes[1..6] != *STANDARD_IDENTIFIER {
            return Err(Error::malformed("bad standard identifier"));
        }
        match VolumeDescriptorType::from_u8(bytes[0])? {
            VolumeDescriptorType::Primary => Ok(VolumeDescriptor::Primary(Box::new(
                PrimaryVolumeDescriptor::parse(bytes)?,
            ))),
            VolumeDescriptorType::Supplementary => Ok(VolumeDescriptor::Supplementary(Box::new(
                SupplementaryVolumeDescriptor::parse(bytes)?,
            ))),
            VolumeDescriptorType::BootRecord => Ok(VolumeDescriptor::BootRecord(Box::new(
                *bytemuck::from_bytes(bytes),
            ))),
            VolumeDescriptorType::Terminator => Ok(VolumeDescriptor::Terminator),
            VolumeDescriptorType::Partition => {
                Err(Error::unsupported("volume partition descriptor"))
            }
        }
    }

    pub fn as_primary(&self) -> Option<&PrimaryVolumeDescriptor> {
        match self {
            VolumeDescriptor::Primary(pvd) => Some(pvd),
            _ => None,
        }
    }

    pub fn as_primary_mut(&mut self) -> Option<&mut PrimaryVolumeDescriptor> {
        match self {
            VolumeDescriptor::Primary(pvd) => Some(pvd),
            _ => None,
        }
    }

    pub fn as_supplementary(&self) -> Option<&SupplementaryVolumeDescriptor> {
        match self {
            VolumeDescriptor::Supplementary(svd) => Some(svd),
            _ => None,
        }
    }

    pub fn as_supplementary_mut(&mut self) -> Option<&mut SupplementaryVolumeDescriptor> {
        match self {
            VolumeDescriptor::Supplementary(svd) => Some(svd),
            _ => None,
        }
    }

    pub fn as_boot_record_mut(&mut self) -> Option<&mut BootRecordDescriptor> {
        match self {
            VolumeDescriptor::BootRecord(br) => Some(br),
            _ => None,
        }
    }
}

/// The ordered descriptor set owned by an image.
#[derive(Default)]
pub struct VolumeDescriptorList {
    descriptors: Vec<VolumeDescriptor>,
}

impl VolumeDescriptorList {
    pub fn empty() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    /// Wraps an already-parsed, in-order descriptor run (the parser reads
    /// one 2048-byte sector at a time rather than assembling a contiguous
    /// buffer up front, so it cannot call [`Self::parse`] directly).
    pub(crate) fn from_descriptors(descriptors: Vec<VolumeDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn push(&mut self, vd: VolumeDescriptor) {
        self.descriptors.push(vd);
    }

    pub fn iter(&self) -> impl Iterator<Item = &VolumeDescriptor> {
        self.descriptors.iter()
    }

    pub fn primary(&self) -> &PrimaryVolumeDescriptor {
        self.descriptors
            .iter()
            .find_map(VolumeDescriptor::as_primary)
            .expect("an image always carries exactly one primary volume descriptor")
    }

    pub fn primary_mut(&mut self) -> &mut PrimaryVolumeDescriptor {
        self.descriptors
            .iter_mut()
            .find_map(VolumeDescriptor::as_primary_mut)
            .expect("an image always carries exactly one primary volume descriptor")
    }

    pub fn joliet(&self) -> Option<&SupplementaryVolumeDescriptor> {
        self.descriptors
            .iter()
            .filter_map(VolumeDescriptor::as_supplementary)
            .find(|svd| svd.is_joliet())
    }

    pub fn joliet_mut(&mut self) -> Option<&mut SupplementaryVolumeDescriptor> {
        self.descriptors
            .iter_mut()
            .filter_map(VolumeDescriptor::as_supplementary_mut)
            .find(|svd| svd.is_joliet())
    }

    pub fn boot_record_mut(&mut self) -> Option<&mut BootRecordDescriptor> {
        self.descriptors
            .iter_mut()
            .find_map(VolumeDescriptor::as_boot_record_mut)
    }

    /// Inserts `vd` immediately before the Set Terminator (`add_eltorito`
    /// needs to grow the descriptor set after `new`/`open` already placed
    /// one), appending it if no terminator is present yet.
    pub fn insert_before_terminator(&mut self, vd: VolumeDescriptor) {
        let pos = self
            .descriptors
            .iter()
            .position(|d| matches!(d, VolumeDescriptor::Terminator))
            .unwrap_or(self.descriptors.len());
        self.descriptors.insert(pos, vd);
    }

    /// Drops the Boot Record Descriptor, if any (`rm_eltorito`).
    pub fn remove_boot_record(&mut self) {
        self.descriptors
            .retain(|d| !matches!(d, VolumeDescriptor::BootRecord(_)));
    }

    /// Total bytes occupied by this set on disk, including the Set
    /// Terminator and the engine's always-emitted Version Descriptor.
    pub fn size_required(&self) -> usize {
        (self.descriptors.len() + 2) * SECTOR_SIZE
    }

    /// Parses a consecutive run of volume descriptors starting at `data[0]`,
    /// stopping at (and including) the first Set Terminator.
    pub fn parse(mut data: &[u8]) -> Result<Self> {
        let mut descriptors = Vec::new();
        loop {
            if data.len() < SECTOR_SIZE {
                return Err(Error::malformed("truncated volume descriptor set"));
            }
            let frame: &[u8; SECTOR_SIZE] = data[..SECTOR_SIZE].try_into().unwrap();
            let vd = VolumeDescriptor::parse(frame)?;
            let is_terminator = matches!(vd, VolumeDescriptor::Terminator);
            descriptors.push(vd);
            data = &data[SECTOR_SIZE..];
            if is_terminator {
                break;
            }
        }
        if !descriptors
            .iter()
            .any(|vd| matches!(vd, VolumeDescriptor::Primary(_)))
        {
            return Err(Error::malformed(
                "volume descriptor set has no primary volume descriptor",
            ));
        }
        Ok(Self { descriptors })
    }
}

/// The number of logical-block extents a single path table copy (the L-table,
/// or separately the M-table) consumes, used by the reshuffle pass to size
/// the path table region. This many extents must be allocated once for the
/// L-table and again for the M-table, not split between them. Each copy is
/// allocated in 2-block units so that, at the default 2048-byte block size,
/// this reduces to the conventional `2 * ceil(path_tbl_size / 4096)`; at
/// other block sizes the 4096-byte unit scales with `block_size` instead, so
/// each table copy still lands on a block boundary (see DESIGN.md).
pub fn path_table_num_extents(path_tbl_size: u32, block_size: u32) -> u32 {
    let per_table = block_size.saturating_mul(2).max(1);
    2 * path_tbl_size.div_ceil(per_table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_roundtrips_through_bytes() {
        let root = RootDirRecord::new(20, 2048, crate::date::DirDateTime::default());
        let pvd = PrimaryVolumeDescriptor::new("MY_VOLUME", root).unwrap();
        let bytes = *pvd.as_bytes();
        let parsed = PrimaryVolumeDescriptor::parse(&bytes).unwrap();
        assert_eq!(parsed.volume_identifier.as_str(), "MY_VOLUME");
    }

    #[test]
    fn joliet_detection_requires_flag_and_escape() {
        let root = RootDirRecord::new(20, 2048, crate::date::DirDateTime::default());
        let svd = SupplementaryVolumeDescriptor::new_joliet(&[0u8; 32], root);
        assert!(svd.is_joliet());

        let mut non_joliet = svd;
        non_joliet.escape_sequences = [0u8; 32];
        assert!(!non_joliet.is_joliet());
    }

    #[test]
    fn boot_record_catalog_extent_roundtrips() {
        let mut br = BootRecordDescriptor::new_el_torito(123);
        assert!(br.is_el_torito());
        assert_eq!(br.catalog_extent(), 123);
        br.set_catalog_extent(456);
        assert_eq!(br.catalog_extent(), 456);
    }

    #[test]
    fn parse_stops_at_first_terminator() {
        let root = RootDirRecord::new(20, 2048, crate::date::DirDateTime::default());
        let pvd = PrimaryVolumeDescriptor::new("VOL", root).unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(pvd.as_bytes());
        data.extend_from_slice(TerminatorDescriptor::new().as_bytes());
        data.extend_from_slice(&[0u8; SECTOR_SIZE]); // would-be Version Descriptor
        let list = VolumeDescriptorList::parse(&data).unwrap();
        assert_eq!(list.descriptors.len(), 2);
    }
}
