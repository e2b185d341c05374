//! Hashing utilities for replikv
//!
//! - BLAKE3 for key placement (stable across processes and platforms)
//! - BLAKE3 hex digests for on-disk file names
//! - CRC32 for on-disk record checksums

/// Placement hash of a key.
///
/// First 8 bytes of BLAKE3(key) as a little-endian u64. Unlike a
/// per-process seeded hasher this is identical on every node, which is what
/// replica placement relies on.
pub fn key_hash(key: &str) -> u64 {
    let hash = blake3::hash(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(head)
}

/// Fixed-length file name for a key: 64 lowercase hex characters.
///
/// Independent of the key's length and alphabet, so every valid key maps to
/// a valid file name.
pub fn key_digest(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

/// CRC32 checksum of a byte slice
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_hash_deterministic() {
        assert_eq!(key_hash("test-key"), key_hash("test-key"));
    }

    #[test]
    fn test_key_hash_spreads() {
        let distinct: std::collections::HashSet<u64> =
            (0..100).map(|i| key_hash(&format!("key_{}", i))).collect();
        assert_eq!(distinct.len(), 100);
    }

    #[test]
    fn test_key_digest_is_a_short_file_name() {
        let long = "x".repeat(1000);
        for key in ["a", "dir/file", "..", "ключ", long.as_str()] {
            let digest = key_digest(key);
            assert_eq!(digest.len(), 64);
            assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        }
        assert_ne!(key_digest("a"), key_digest("b"));
    }

    #[test]
    fn test_crc32() {
        assert_eq!(crc32(b"hello"), crc32(b"hello"));
        assert_ne!(crc32(b"hello"), crc32(b"hellp"));
    }
}
