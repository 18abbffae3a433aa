//! The `new(...)` configuration surface, expressed as a builder
//! rather than a long positional argument list.

use alloc::string::{String, ToString};

use crate::date::DecDateTime;
use crate::types::FileInterchange;

/// Tolerance selector for known spec anomalies in a parsed image: `Relaxed`
/// and `Default` accept them silently, `Strict` surfaces them as
/// [`crate::error::Error::MalformedImage`].
#[repr(u8)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strictness {
    /// Accept every known tolerated anomaly, and skip checks that only
    /// exist to catch a hostile or badly-formed source.
    Relaxed,
    /// Accept the known tolerated anomalies; still reject anything
    /// actually fatal.
    #[default]
    Default,
    /// Surface every tolerated anomaly as `MalformedImage`.
    Strict,
}

/// Builder consumed by [`crate::Image::new`].
#[derive(Debug, Clone)]
pub struct NewOptions {
    pub interchange_level: FileInterchange,
    pub system_identifier: String,
    pub volume_identifier: String,
    pub set_size: u16,
    pub seqnum: u16,
    pub log_block_size: u16,
    pub volume_set_identifier: String,
    pub publisher_identifier: String,
    pub data_preparer_identifier: String,
    pub application_identifier: String,
    pub copyright_file_identifier: String,
    pub abstract_file_identifier: String,
    pub bibliographic_file_identifier: String,
    pub volume_expiration_date: Option<DecDateTime>,
    pub application_use: [u8; 512],
    pub joliet: bool,
    pub rock_ridge: bool,
    pub strictness: Strictness,
}

impl Default for NewOptions {
    fn default() -> Self {
        Self {
            interchange_level: FileInterchange::L3,
            system_identifier: String::new(),
            volume_identifier: "ISOIMAGE".to_string(),
            set_size: 1,
            seqnum: 1,
            log_block_size: 2048,
            volume_set_identifier: String::new(),
            publisher_identifier: String::new(),
            data_preparer_identifier: String::new(),
            application_identifier: String::new(),
            copyright_file_identifier: String::new(),
            abstract_file_identifier: String::new(),
            bibliographic_file_identifier: String::new(),
            volume_expiration_date: None,
            application_use: [0; 512],
            joliet: false,
            rock_ridge: false,
            strictness: Strictness::Default,
        }
    }
}

impl NewOptions {
    pub fn with_interchange_level(mut self, level: FileInterchange) -> Self {
        self.interchange_level = level;
        self
    }

    pub fn with_system_identifier(mut self, ident: impl Into<String>) -> Self {
        self.system_identifier = ident.into();
        self
    }

    pub fn with_volume_identifier(mut self, ident: impl Into<String>) -> Self {
        self.volume_identifier = ident.into();
        self
    }

    pub fn with_set_size(mut self, set_size: u16) -> Self {
        self.set_size = set_size;
        self
    }

    pub fn with_seqnum(mut self, seqnum: u16) -> Self {
        self.seqnum = seqnum;
        self
    }

    pub fn with_log_block_size(mut self, log_block_size: u16) -> Self {
        self.log_block_size = log_block_size;
        self
    }

    pub fn with_volume_set_identifier(mut self, ident: impl Into<String>) -> Self {
        self.volume_set_identifier = ident.into();
        self
    }

    pub fn with_publisher_identifier(mut self, ident: impl Into<String>) -> Self {
        self.publisher_identifier = ident.into();
        self
    }

    pub fn with_data_preparer_identifier(mut self, ident: impl Into<String>) -> Self {
        self.data_preparer_identifier = ident.into();
        self
    }

    pub fn with_application_identifier(mut self, ident: impl Into<String>) -> Self {
        self.application_identifier = ident.into();
        self
    }

    pub fn with_copyright_file_identifier(mut self, ident: impl Into<String>) -> Self {
        self.copyright_file_identifier = ident.into();
        self
    }

    pub fn with_abstract_file_identifier(mut self, ident: impl Into<String>) -> Self {
        self.abstract_file_identifier = ident.into();
        self
    }

    pub fn with_bibliographic_file_identifier(mut self, ident: impl Into<String>) -> Self {
        self.bibliographic_file_identifier = ident.into();
        self
    }

    pub fn with_volume_expiration_date(mut self, date: DecDateTime) -> Self {
        self.volume_expiration_date = Some(date);
        self
    }

    pub fn with_application_use(mut self, bytes: [u8; 512]) -> Self {
        self.application_use = bytes;
        self
    }

    pub fn with_joliet(mut self, joliet: bool) -> Self {
        self.joliet = joliet;
        self
    }

    pub fn with_rock_ridge(mut self, rock_ridge: bool) -> Self {
        self.rock_ridge = rock_ridge;
        self
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_sane_block_size() {
        let ops = NewOptions::default();
        assert_eq!(ops.log_block_size, 2048);
        assert_eq!(ops.interchange_level, FileInterchange::L3);
    }

    #[test]
    fn builder_chains_override_defaults() {
        let ops = NewOptions::default()
            .with_volume_identifier("MY_VOLUME")
            .with_joliet(true)
            .with_rock_ridge(true)
            .with_strictness(Strictness::Strict);
        assert_eq!(ops.volume_identifier, "MY_VOLUME");
        assert!(ops.joliet);
        assert!(ops.rock_ridge);
        assert_eq!(ops.strictness, Strictness::Strict);
    }
}
