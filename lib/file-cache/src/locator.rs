use std::{
    fmt::{self, Display, Formatter},
    path::Path,
    str::FromStr,
};

use sha2::{Digest, Sha256};

/// The name of a cache entry.
///
/// This is the SHA-256 hash of the canonical source path (not of the file's
/// contents), so the same file always maps to the same entry and editing the
/// file replaces the entry instead of creating a new one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Create a new [`CacheKey`] from the raw SHA-256 hash.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        CacheKey(key)
    }

    /// Derive the key for a source file.
    ///
    /// # Note
    ///
    /// The path is hashed as-is. Callers are expected to pass a canonical
    /// path, otherwise two spellings of the same file get separate entries.
    pub fn for_path(path: &Path) -> Self {
        let mut hasher = Sha256::default();
        hasher.update(path.as_os_str().as_encoded_bytes());
        CacheKey(hasher.finalize().into())
    }

    /// Parse a key from its hex-encoded form.
    pub fn parse_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let mut hash = [0_u8; 32];
        hex::decode_to_slice(hex_str, &mut hash)?;
        Ok(CacheKey(hash))
    }

    /// Get the raw SHA-256 hash.
    pub fn as_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for CacheKey {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheKey::parse_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_displayed_as_lowercase_hex() {
        let key = CacheKey::from_bytes([
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
            0x0e, 0x0f, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b,
            0x1c, 0x1d, 0x1e, 0x1f,
        ]);

        let repr = key.to_string();

        assert_eq!(
            repr,
            "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"
        );
        assert_eq!(repr.parse::<CacheKey>().unwrap(), key);
    }

    #[test]
    fn key_is_the_sha256_of_the_path_string() {
        // sha256("/a.wasm")
        let expected = {
            let mut hasher = Sha256::default();
            hasher.update(b"/a.wasm");
            let raw: [u8; 32] = hasher.finalize().into();
            raw
        };

        let key = CacheKey::for_path(Path::new("/a.wasm"));

        assert_eq!(key.as_bytes(), expected);
    }

    #[test]
    fn distinct_paths_get_distinct_keys() {
        let first = CacheKey::for_path(Path::new("/modules/a.wasm"));
        let second = CacheKey::for_path(Path::new("/modules/b.wasm"));

        assert_ne!(first, second);
        assert_eq!(first, CacheKey::for_path(Path::new("/modules/a.wasm")));
        assert_eq!(first.to_string().len(), 64);
    }

    #[test]
    fn reject_short_hex() {
        assert!(CacheKey::parse_hex("abcd").is_err());
    }
}
