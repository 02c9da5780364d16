use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::format::CompressionVariant;

/// Reader/writer configuration.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// compression = "zlib"
/// verify_checksums = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Codec used for newly written blocks.
    pub compression: CompressionVariant,
    /// Check each block's trailer checksum on read.
    pub verify_checksums: bool,
    /// Deflate level for the zlib variants (0 = store, 9 = smallest).
    pub zlib_level: u32,
    /// Read table files through a memory map instead of positioned reads.
    pub use_mmap: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            compression: CompressionVariant::ZlibRaw,
            verify_checksums: true,
            zlib_level: 6,
            use_mmap: true,
        }
    }
}

impl Options {
    pub const MAX_ZLIB_LEVEL: u32 = 9;

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let options: Options = toml::from_str(s).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Read options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.zlib_level > Self::MAX_ZLIB_LEVEL {
            return Err(Error::Config {
                message: format!(
                    "zlib_level {} out of range 0..={}",
                    self.zlib_level,
                    Self::MAX_ZLIB_LEVEL
                ),
            });
        }
        Ok(())
    }

    pub fn with_compression(mut self, compression: CompressionVariant) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_raw_zlib() {
        let options = Options::default();
        assert_eq!(options.compression, CompressionVariant::ZlibRaw);
        assert!(options.verify_checksums);
    }

    #[test]
    fn parses_partial_toml() {
        let options =
            Options::from_toml_str("compression = \"snappy\"\nuse_mmap = false\n").unwrap();
        assert_eq!(options.compression, CompressionVariant::Snappy);
        assert!(!options.use_mmap);
        assert_eq!(options.zlib_level, 6);
    }

    #[test]
    fn rejects_bad_level_and_unknown_keys() {
        assert!(matches!(
            Options::from_toml_str("zlib_level = 12"),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            Options::from_toml_str("block_cache = 10"),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            Options::from_toml_str("compression = \"lz4\""),
            Err(Error::Config { .. })
        ));
    }
}
