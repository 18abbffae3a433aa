//! Numeric codecs and filename/character-set validators.
//!
//! Dual-endian fields, the d1-character set, interchange-level filename
//! mangling and the version-suffix grammar all live here, mirroring the
//! teacher crate's `types.rs`.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

pub use isofs_common::{BigEndian, Endian, Endianness, LittleEndian, NativeEndian, U16, U32, U64};

use crate::error::{Error, Result};

/// A dual 16-bit field (ECMA-119 7.2.3): LE16 followed by BE16.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Dual16 {
    lsb: U16<LittleEndian>,
    msb: U16<BigEndian>,
}

unsafe impl bytemuck::Zeroable for Dual16 {}
unsafe impl bytemuck::Pod for Dual16 {}

impl core::fmt::Debug for Dual16 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Dual16").field(&self.lsb.get()).finish()
    }
}

impl Dual16 {
    pub fn new(value: u16) -> Self {
        Self {
            lsb: U16::new(value),
            msb: U16::new(value),
        }
    }

    /// Returns the LE half without checking it against the BE half.
    pub fn get_lenient(&self) -> u16 {
        self.lsb.get()
    }

    /// Returns the value, requiring the LE and BE halves to agree (7.2.3).
    pub fn get_checked(&self, field: &str) -> Result<u16> {
        let le = self.lsb.get();
        let be = self.msb.get();
        if le != be {
            return Err(Error::malformed(format!(
                "{field}: LE/BE disagreement ({le} vs {be})"
            )));
        }
        Ok(le)
    }

    pub fn set(&mut self, value: u16) {
        self.lsb.set(value);
        self.msb.set(value);
    }

    pub(crate) fn record(&self) -> [u8; 4] {
        *bytemuck::bytes_of(self).try_into().unwrap()
    }

    pub(crate) fn from_bytes(b: &[u8]) -> Result<Self> {
        if b.len() != 4 {
            return Err(Error::malformed("dual16 field wrong length"));
        }
        Ok(*bytemuck::from_bytes(b))
    }
}

/// A dual 32-bit field (ECMA-119 7.3.3): LE32 followed by BE32.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Dual32 {
    lsb: U32<LittleEndian>,
    msb: U32<BigEndian>,
}

unsafe impl bytemuck::Zeroable for Dual32 {}
unsafe impl bytemuck::Pod for Dual32 {}

impl core::fmt::Debug for Dual32 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Dual32").field(&self.lsb.get()).finish()
    }
}

impl Dual32 {
    pub fn new(value: u32) -> Self {
        Self {
            lsb: U32::new(value),
            msb: U32::new(value),
        }
    }

    pub fn get_lenient(&self) -> u32 {
        self.lsb.get()
    }

    pub fn get_checked(&self, field: &str) -> Result<u32> {
        let le = self.lsb.get();
        let be = self.msb.get();
        if le != be {
            return Err(Error::malformed(format!(
                "{field}: LE/BE disagreement ({le} vs {be})"
            )));
        }
        Ok(le)
    }

    pub fn set(&mut self, value: u32) {
        self.lsb.set(value);
        self.msb.set(value);
    }
}

static_assertions::assert_eq_size!(Dual16, [u8; 4]);
static_assertions::assert_eq_size!(Dual32, [u8; 8]);

/// The `d1-characters` set: `[A-Z0-9_.\-+()~&!@$]`, as used for identifiers
/// once they have been upper-cased.
pub fn is_d1_char(c: u8) -> bool {
    c.is_ascii_uppercase()
        || c.is_ascii_digit()
        || matches!(
            c,
            b'_' | b'.' | b'-' | b'+' | b'(' | b')' | b'~' | b'&' | b'!' | b'@' | b'$'
        )
}

pub fn is_d1_str(s: &[u8]) -> bool {
    s.iter().all(|&c| is_d1_char(c))
}

/// The interchange level a name/identifier was created for or inferred at.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileInterchange {
    L1 = 1,
    L2 = 2,
    L3 = 3,
}

impl FileInterchange {
    /// Splits an optional `;<version>` suffix and validates the version grammar
    /// (at most one semicolon, version in `[1, 32767]`, name or extension non-empty).
    pub fn parse_filename_grammar(name: &str) -> Result<(&str, Option<u16>)> {
        let semicolons = name.matches(';').count();
        if semicolons > 1 {
            return Err(Error::invalid(format!(
                "{name}: at most one ';' allowed in a filename"
            )));
        }
        if let Some((stem, version)) = name.split_once(';') {
            let version: u16 = version
                .parse()
                .map_err(|_| Error::invalid(format!("{name}: invalid version suffix")))?;
            if !(1..=32767).contains(&version) {
                return Err(Error::invalid(format!(
                    "{name}: version {version} out of range [1, 32767]"
                )));
            }
            if stem.is_empty() || stem == "." {
                return Err(Error::invalid(format!(
                    "{name}: at least one of name or extension must be non-empty"
                )));
            }
            Ok((stem, Some(version)))
        } else {
            Ok((name, None))
        }
    }

    /// Validates `name` (without version suffix) against this interchange level
    /// and returns the upper-cased d1 identifier, suffixed with `;1` if it is a
    /// file (not a bare directory name).
    pub fn validate_name(self, name: &str, is_directory: bool) -> Result<String> {
        let (stem, version) = Self::parse_filename_grammar(name)?;
        let upper = stem.to_ascii_uppercase();
        if !is_d1_str(upper.as_bytes()) {
            return Err(Error::invalid(format!(
                "{name}: contains characters outside the d1-character set"
            )));
        }

        let (base, ext) = match upper.split_once('.') {
            Some((b, e)) => (b, e),
            None => (upper.as_str(), ""),
        };

        match self {
            FileInterchange::L1 => {
                if is_directory {
                    if upper.len() > 8 || upper.contains('.') {
                        return Err(Error::invalid(format!(
                            "{name}: directory name exceeds level 1 limit of 8 characters"
                        )));
                    }
                } else if base.len() > 8 || ext.len() > 3 {
                    return Err(Error::invalid(format!("{name}: exceeds level 1 8.3 limit")));
                }
            }
            FileInterchange::L2 => {
                let cap = if is_directory { 31 } else { 30 };
                if upper.len() > cap {
                    return Err(Error::invalid(format!(
                        "{name}: exceeds level 2 name length limit"
                    )));
                }
            }
            FileInterchange::L3 => {
                let cap = if is_directory { 207 } else { 222 };
                if upper.len() > cap {
                    return Err(Error::invalid(format!(
                        "{name}: exceeds level 3 name length limit"
                    )));
                }
            }
        }

        if is_directory {
            Ok(upper)
        } else {
            Ok(format!("{upper};{}", version.unwrap_or(1)))
        }
    }

    /// Tries level 1 first, then level 3, returning the level that accepted the
    /// name. Used by the parser to infer the image's interchange level
    /// (Design Note §9: replaces the source's try/except control flow).
    pub fn classify(name: &str, is_directory: bool) -> Option<FileInterchange> {
        if FileInterchange::L1.validate_name(name, is_directory).is_ok() {
            Some(FileInterchange::L1)
        } else if FileInterchange::L3.validate_name(name, is_directory).is_ok() {
            Some(FileInterchange::L3)
        } else {
            None
        }
    }
}

/// A space-padded `A`-characters string of fixed byte length `N`, used for
/// the free-text identifiers in volume descriptors (publisher, preparer, ...).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct AString<const N: usize> {
    chars: [u8; N],
}

unsafe impl<const N: usize> bytemuck::Zeroable for AString<N> {}
unsafe impl<const N: usize> bytemuck::Pod for AString<N> {}

impl<const N: usize> Default for AString<N> {
    fn default() -> Self {
        Self { chars: [b' '; N] }
    }
}

impl<const N: usize> AString<N> {
    /// Wraps a pre-encoded `N`-byte field verbatim (used for Joliet's
    /// UTF-16-BE identifiers, which reuse this type's storage shape without
    /// its d/a-character semantics).
    pub fn from_raw(chars: [u8; N]) -> Self {
        Self { chars }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        if s.len() > N {
            return Err(Error::invalid(format!(
                "identifier {s:?} exceeds field cap of {N} bytes"
            )));
        }
        let mut chars = [b' '; N];
        chars[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self { chars })
    }

    pub fn as_str(&self) -> String {
        let len = self
            .chars
            .iter()
            .rposition(|&c| c != b' ')
            .map(|i| i + 1)
            .unwrap_or(0);
        String::from_utf8_lossy(&self.chars[..len]).to_string()
    }
}

impl<const N: usize> core::fmt::Debug for AString<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// An owned ISO identifier: either a bare d1 name, or a filename-form
/// identifier (prefixed with `_` per ECMA-119 8.4.20, validated against the
/// interchange level).
#[derive(Debug, Clone, Default)]
pub struct Identifier(pub Vec<u8>);

impl Identifier {
    pub fn text(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }

    pub fn filename(level: FileInterchange, s: &str) -> Result<Self> {
        let validated = level.validate_name(s, false)?;
        Ok(Self(validated.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual16_roundtrip() {
        let mut d = Dual16::new(0x1234);
        assert_eq!(d.get_checked("test").unwrap(), 0x1234);
        d.set(0xBEEF);
        assert_eq!(d.get_checked("test").unwrap(), 0xBEEF);
    }

    #[test]
    fn dual32_mismatch_is_malformed() {
        let mut d = Dual32::new(1);
        let bytes = bytemuck::bytes_of_mut(&mut d);
        bytes[7] ^= 0xff;
        assert!(d.get_checked("space_size").is_err());
    }

    #[test]
    fn level1_rejects_long_names() {
        assert!(
            FileInterchange::L1
                .validate_name("this_is_too_long", false)
                .is_err()
        );
        assert!(FileInterchange::L1.validate_name("SHORT.TXT", false).is_ok());
    }

    #[test]
    fn filename_grammar_rejects_bad_version() {
        assert!(FileInterchange::parse_filename_grammar("FILE.TXT;0").is_err());
        assert!(FileInterchange::parse_filename_grammar("FILE.TXT;1;2").is_err());
        assert!(FileInterchange::parse_filename_grammar("FILE.TXT;1").is_ok());
    }

    #[test]
    fn idempotent_validation() {
        let name = "report.txt";
        let once = FileInterchange::L3.validate_name(name, false).unwrap();
        let twice = FileInterchange::L3.validate_name(&once, false).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn classify_prefers_level1() {
        assert_eq!(
            FileInterchange::classify("SHORT.TXT", false),
            Some(FileInterchange::L1)
        );
        assert_eq!(
            FileInterchange::classify("a_much_longer_name_than_level_one_allows.txt", false),
            Some(FileInterchange::L3)
        );
    }
}
