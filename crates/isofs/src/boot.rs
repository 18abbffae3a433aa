//! El Torito boot catalog: the Validation Entry, the Initial/
//! Default Entry, and zero or more (Section Header, Section Entry[+
//! Extension]) groups.

use alloc::string::ToString;
use alloc::vec::Vec;

use isofs_io::{Read, Seek, Write};

use crate::error::{Error, Result};
use crate::types::{Endian, LittleEndian, U16, U32};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformId {
    X80X86,
    PowerPC,
    Macintosh,
    Uefi,
    Unknown(u8),
}

impl PlatformId {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::X80X86,
            0x01 => Self::PowerPC,
            0x02 => Self::Macintosh,
            0xEF => Self::Uefi,
            value => Self::Unknown(value),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::X80X86 => 0x00,
            Self::PowerPC => 0x01,
            Self::Macintosh => 0x02,
            Self::Uefi => 0xEF,
            Self::Unknown(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulationType {
    NoEmulation,
    Diskette1_2M,
    Diskette1_44M,
    Diskette2_88M,
    HardDisk,
    Unknown(u8),
}

impl EmulationType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::NoEmulation,
            0x01 => Self::Diskette1_2M,
            0x02 => Self::Diskette1_44M,
            0x03 => Self::Diskette2_88M,
            0x04 => Self::HardDisk,
            value => Self::Unknown(value),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::NoEmulation => 0x00,
            Self::Diskette1_2M => 0x01,
            Self::Diskette1_44M => 0x02,
            Self::Diskette2_88M => 0x03,
            Self::HardDisk => 0x04,
            Self::Unknown(value) => value,
        }
    }
}

/// The 32-byte Validation Entry (always entry 0 of the catalog).
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct ValidationEntry {
    pub header_id: u8,
    pub platform_id: u8,
    pub reserved: [u8; 2],
    pub manufacturer: [u8; 24],
    pub checksum: U16<LittleEndian>,
    pub key: [u8; 2],
}

static_assertions::assert_eq_size!(ValidationEntry, [u8; 32]);

impl ValidationEntry {
    pub fn new(platform_id: PlatformId) -> Self {
        let mut entry = Self {
            header_id: 0x01,
            platform_id: platform_id.to_u8(),
            reserved: [0; 2],
            manufacturer: [0; 24],
            checksum: U16::new(0),
            key: [0x55, 0xAA],
        };
        entry.checksum.set(entry.checksum_of_self());
        entry
    }

    /// The checksum must make the 16-bit little-endian sum of the whole
    /// 32-byte entry equal zero.
    fn checksum_of_self(&self) -> u16 {
        let mut bytes = *bytemuck::bytes_of(self);
        bytes[28] = 0;
        bytes[29] = 0;
        let mut sum = 0u16;
        for chunk in bytes.chunks_exact(2) {
            sum = sum.wrapping_add(u16::from_le_bytes([chunk[0], chunk[1]]));
        }
        (!sum).wrapping_add(1)
    }

    pub fn is_valid(&self) -> bool {
        self.header_id == 0x01
            && self.key == [0x55, 0xAA]
            && self.checksum.get() == self.checksum_of_self()
    }
}

impl core::fmt::Debug for ValidationEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ValidationEntry")
            .field("platform_id", &PlatformId::from_u8(self.platform_id))
            .field("checksum", &self.checksum.get())
            .finish_non_exhaustive()
    }
}

/// A 0x90/0x91 Section Header Entry.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct SectionHeaderEntry {
    /// `0x90` if further section headers follow, `0x91` for the final one.
    pub header_type: u8,
    pub platform_id: u8,
    pub section_count: U16<LittleEndian>,
    pub section_ident: [u8; 28],
}

static_assertions::assert_eq_size!(SectionHeaderEntry, [u8; 32]);

/// A Section Entry (Initial Entry shares this exact shape, minus the
/// `boot_indicator` distinction of 0x00/0x88).
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct SectionEntry {
    pub boot_indicator: u8,
    pub boot_media_type: u8,
    pub load_segment: U16<LittleEndian>,
    pub system_type: u8,
    pub reserved0: u8,
    pub sector_count: U16<LittleEndian>,
    pub load_rba: U32<LittleEndian>,
    pub selection_criteria: u8,
    pub vendor_unique: [u8; 19],
}

static_assertions::assert_eq_size!(SectionEntry, [u8; 32]);

impl SectionEntry {
    pub fn new(media_type: EmulationType, load_segment: u16, sector_count: u16, load_rba: u32) -> Self {
        Self {
            boot_indicator: 0x88,
            boot_media_type: media_type.to_u8(),
            load_segment: U16::new(load_segment),
            system_type: 0,
            reserved0: 0,
            sector_count: U16::new(sector_count),
            load_rba: U32::new(load_rba),
            selection_criteria: 0,
            vendor_unique: [0; 19],
        }
    }

    pub fn is_bootable(&self) -> bool {
        self.boot_indicator == 0x88
    }
}

impl core::fmt::Debug for SectionEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SectionEntry")
            .field("bootable", &self.is_bootable())
            .field("media_type", &EmulationType::from_u8(self.boot_media_type))
            .field("sector_count", &self.sector_count.get())
            .field("load_rba", &self.load_rba.get())
            .finish_non_exhaustive()
    }
}

/// A Section Entry Extension (indicator byte `0x44`). Parsed but never
/// produced by the mutation API (Design Note §9).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct SectionEntryExtension {
    pub extension_indicator: u8,
    pub flags: u8,
    pub vendor_unique: [u8; 30],
}

static_assertions::assert_eq_size!(SectionEntryExtension, [u8; 32]);

impl SectionEntryExtension {
    pub fn more_follow(&self) -> bool {
        self.flags & 0b0010_0000 != 0
    }
}

/// The boot information table patched into the boot image itself when an
/// entry requests it.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct BootInfoTable {
    pub iso_start: U32<LittleEndian>,
    pub file_lba: U32<LittleEndian>,
    pub file_len: U32<LittleEndian>,
    pub checksum: U32<LittleEndian>,
}

static_assertions::assert_eq_size!(BootInfoTable, [u8; 16]);

pub const BOOT_INFO_TABLE_OFFSET: u64 = 8;

/// Computes the boot image checksum the boot information table expects: the
/// wrapping sum of every little-endian `u32` in the image, starting 64 bytes
/// in (past the table itself), read as exact 4-byte words.
pub fn boot_info_table_checksum<R: Read>(
    reader: &mut R,
    image_len: u32,
) -> core::result::Result<u32, isofs_io::Error> {
    let mut checksum = 0u32;
    let mut buf = [0u8; 4];
    let mut offset = 64u32;
    while offset < image_len {
        reader.read_exact(&mut buf)?;
        checksum = checksum.wrapping_add(u32::from_le_bytes(buf));
        offset += 4;
    }
    Ok(checksum)
}

/// One section: its header plus the entries (and any extensions) under it.
#[derive(Debug, Clone)]
pub struct Section {
    pub platform_id: PlatformId,
    pub entries: Vec<(SectionEntry, Vec<SectionEntryExtension>)>,
}

/// The El Torito boot catalog: a validation entry, a default/initial entry,
/// and zero or more platform sections.
#[derive(Debug, Clone)]
pub struct BootCatalog {
    pub validation: ValidationEntry,
    pub initial_entry: SectionEntry,
    pub sections: Vec<Section>,
}

impl BootCatalog {
    pub fn new(platform_id: PlatformId, initial_entry: SectionEntry) -> Self {
        Self {
            validation: ValidationEntry::new(platform_id),
            initial_entry,
            sections: Vec::new(),
        }
    }

    pub fn add_section(&mut self, platform_id: PlatformId, entries: Vec<SectionEntry>) {
        self.sections.push(Section {
            platform_id,
            entries: entries.into_iter().map(|e| (e, Vec::new())).collect(),
        });
    }

    pub fn size_bytes(&self) -> usize {
        let section_bytes: usize = self
            .sections
            .iter()
            .map(|s| 32 + s.entries.iter().map(|(_, ext)| 32 + ext.len() * 32).sum::<usize>())
            .sum();
        64 + section_bytes + 32 // + end-of-entries marker
    }

    /// Parses the catalog as a state machine:
    /// Validation, then Initial Entry, then alternating Section Header /
    /// Section Entry (+ Extension) groups until a final (`0x91`) header's
    /// entries are consumed or a terminating all-zero record is seen.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let validation = Self::read_entry::<_, ValidationEntry>(reader)?;
        if !validation.is_valid() {
            return Err(Error::malformed("boot catalog validation entry is invalid"));
        }

        let initial_entry = Self::read_entry::<_, SectionEntry>(reader)?;

        let mut sections = Vec::new();
        let mut current: Option<(SectionHeaderEntry, Vec<(SectionEntry, Vec<SectionEntryExtension>)>)> =
            None;
        let mut more_headers_expected = false;

        loop {
            let mut buf = [0u8; 32];
            reader.read_exact(&mut buf)?;
            if buf == [0u8; 32] && !more_headers_expected && current.is_none() {
                break;
            }
            match buf[0] {
                0x90 | 0x91 => {
                    let header: SectionHeaderEntry = *bytemuck::from_bytes(&buf);
                    more_headers_expected = header.header_type == 0x90;
                    if let Some((prev_header, entries)) = current.take() {
                        sections.push(Section {
                            platform_id: PlatformId::from_u8(prev_header.platform_id),
                            entries,
                        });
                    }
                    current = Some((header, Vec::new()));
                }
                0x44 => {
                    let ext: SectionEntryExtension = *bytemuck::from_bytes(&buf);
                    let (_, entries) = current
                        .as_mut()
                        .ok_or_else(|| Error::malformed("boot catalog: extension with no entry"))?;
                    let (_, exts) = entries
                        .last_mut()
                        .ok_or_else(|| Error::malformed("boot catalog: extension with no entry"))?;
                    exts.push(ext);
                }
                _ => {
                    let entry: SectionEntry = *bytemuck::from_bytes(&buf);
                    let (_, entries) = current
                        .as_mut()
                        .ok_or_else(|| Error::malformed("boot catalog: entry outside a section"))?;
                    entries.push((entry, Vec::new()));
                }
            }
            if buf == [0u8; 32] {
                break;
            }
        }

        if let Some((header, entries)) = current {
            sections.push(Section {
                platform_id: PlatformId::from_u8(header.platform_id),
                entries,
            });
        }

        Ok(Self {
            validation,
            initial_entry,
            sections,
        })
    }

    fn read_entry<R: Read, T: bytemuck::Pod>(reader: &mut R) -> Result<T> {
        let mut buf = [0u8; 32];
        reader.read_exact(&mut buf)?;
        Ok(*bytemuck::from_bytes::<T>(&buf[..core::mem::size_of::<T>()]))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> core::result::Result<(), isofs_io::Error> {
        writer.write_all(bytemuck::bytes_of(&self.validation))?;
        writer.write_all(bytemuck::bytes_of(&self.initial_entry))?;
        for (i, section) in self.sections.iter().enumerate() {
            let header = SectionHeaderEntry {
                header_type: if i + 1 == self.sections.len() { 0x91 } else { 0x90 },
                platform_id: section.platform_id.to_u8(),
                section_count: U16::new(section.entries.len() as u16),
                section_ident: [0; 28],
            };
            writer.write_all(bytemuck::bytes_of(&header))?;
            for (entry, extensions) in &section.entries {
                writer.write_all(bytemuck::bytes_of(entry))?;
                for ext in extensions {
                    writer.write_all(bytemuck::bytes_of(ext))?;
                }
            }
        }
        writer.write_all(&[0u8; 32])?;
        Ok(())
    }
}

/// The filename used for the synthetic boot catalog entry injected into the
/// directory tree by `add_eltorito`.
pub fn catalog_file_name() -> alloc::string::String {
    "BOOT.CAT;1".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_entry_checksum_is_self_consistent() {
        let entry = ValidationEntry::new(PlatformId::X80X86);
        assert!(entry.is_valid());
    }

    #[test]
    fn tampered_validation_entry_is_invalid() {
        let mut entry = ValidationEntry::new(PlatformId::Uefi);
        entry.manufacturer[0] = b'X';
        assert!(!entry.is_valid());
    }

    #[test]
    fn catalog_roundtrips_through_bytes() {
        let mut catalog = BootCatalog::new(
            PlatformId::X80X86,
            SectionEntry::new(EmulationType::NoEmulation, 0, 4, 20),
        );
        catalog.add_section(
            PlatformId::Uefi,
            alloc::vec![SectionEntry::new(EmulationType::NoEmulation, 0, 8, 40)],
        );

        let mut buf = Vec::new();
        catalog.write(&mut buf).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let parsed = BootCatalog::parse(&mut cursor).unwrap();
        assert_eq!(parsed.sections.len(), 1);
        assert_eq!(parsed.sections[0].platform_id, PlatformId::Uefi);
        assert_eq!(parsed.sections[0].entries[0].0.load_rba.get(), 40);
    }
}
