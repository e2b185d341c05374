//! Local storage engine for replikv
//!
//! Each node keeps a plain key → record mapping. The coordinator never looks
//! inside it beyond get / upsert / delete. Two backends are provided: an
//! in-memory map (default) and a one-file-per-key directory store.

use crate::common::{crc32, key_digest, Error, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

const RECORD_MAGIC: [u8; 4] = [0x52, 0x4B, 0x56, 0x31]; // "RKV1"
const HEADER_LEN: usize = 4 + 8 + 4 + 8;
const TMP_PREFIX: &str = ".tmp-";

/// A stored value with the timestamp its coordinator stamped it with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Unix milliseconds
    pub timestamp: u64,
    pub value: Bytes,
}

impl Record {
    pub fn new(timestamp: u64, value: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }

    /// On-disk format, the key travels with the value:
    /// [MAGIC:4][TIMESTAMP:8][KEY_LEN:4][VALUE_LEN:8][KEY:k][VALUE:n][CRC32:4]
    fn encode(&self, key: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + key.len() + self.value.len() + 4);
        buf.extend_from_slice(&RECORD_MAGIC);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.value.len() as u64).to_le_bytes());
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(&self.value);
        let crc = crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Returns the stored key and the record
    fn decode(buf: &[u8]) -> Result<(String, Self)> {
        if buf.len() < HEADER_LEN + 4 {
            return Err(Error::Corrupted(format!("record too short: {} bytes", buf.len())));
        }
        if buf[0..4] != RECORD_MAGIC {
            return Err(Error::Corrupted("bad record magic".into()));
        }

        let (body, tail) = buf.split_at(buf.len() - 4);
        let expected = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let actual = crc32(body);
        if expected != actual {
            return Err(Error::ChecksumMismatch {
                expected: format!("{:08x}", expected),
                actual: format!("{:08x}", actual),
            });
        }

        let mut word = [0u8; 8];
        word.copy_from_slice(&body[4..12]);
        let timestamp = u64::from_le_bytes(word);
        let key_len = u32::from_le_bytes([body[12], body[13], body[14], body[15]]) as usize;
        word.copy_from_slice(&body[16..24]);
        let value_len = u64::from_le_bytes(word) as usize;

        let payload = &body[HEADER_LEN..];
        if key_len.checked_add(value_len) != Some(payload.len()) {
            return Err(Error::Corrupted(format!(
                "payload of {} bytes does not match header ({} + {})",
                payload.len(),
                key_len,
                value_len
            )));
        }
        let (key, value) = payload.split_at(key_len);
        let key = std::str::from_utf8(key)
            .map_err(|_| Error::Corrupted("stored key is not UTF-8".into()))?;

        Ok((
            key.to_string(),
            Self {
                timestamp,
                value: Bytes::copy_from_slice(value),
            },
        ))
    }
}

/// Trait for key-value storage backends
pub trait KvStore: Send + Sync {
    /// Fails with [`Error::NotFound`] if the key is absent
    fn get(&self, key: &str) -> Result<Record>;
    /// Create or replace
    fn upsert(&self, key: &str, record: &Record) -> Result<()>;
    /// Write `record` only if the key is absent or holds an older timestamp.
    /// Returns whether it was written. Atomic with respect to other writes
    /// to the same store.
    fn upsert_if_newer(&self, key: &str, record: &Record) -> Result<bool>;
    /// Idempotent
    fn delete(&self, key: &str) -> Result<()>;
    fn len(&self) -> Result<usize>;
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidRequest("key is empty".into()));
    }
    Ok(())
}

fn supersedes(record: &Record, current: Option<&Record>) -> bool {
    current.map_or(true, |c| c.timestamp < record.timestamp)
}

/// In-memory store (default)
#[derive(Default)]
pub struct MemStore {
    map: RwLock<HashMap<String, Record>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Internal("storage lock poisoned".into())
}

impl KvStore for MemStore {
    fn get(&self, key: &str) -> Result<Record> {
        check_key(key)?;
        self.map
            .read()
            .map_err(poisoned)?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn upsert(&self, key: &str, record: &Record) -> Result<()> {
        check_key(key)?;
        self.map
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), record.clone());
        Ok(())
    }

    fn upsert_if_newer(&self, key: &str, record: &Record) -> Result<bool> {
        check_key(key)?;
        let mut map = self.map.write().map_err(poisoned)?;
        if !supersedes(record, map.get(key)) {
            return Ok(false);
        }
        map.insert(key.to_string(), record.clone());
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        self.map.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.map.read().map_err(poisoned)?.len())
    }
}

/// Directory store: one file per key, named by the key's BLAKE3 digest and
/// replaced atomically via rename
pub struct FileStore {
    dir: PathBuf,
    /// Serialises writers so conditional writes see a stable file
    writer: Mutex<()>,
}

impl FileStore {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        // Leftovers of writes interrupted by a crash
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                let _ = fs::remove_file(entry.path());
            }
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            writer: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key_digest(key))
    }

    fn read(&self, key: &str) -> Result<Option<Record>> {
        let mut file = match File::open(self.path_for(key)) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        let (stored, record) = Record::decode(&buf)?;
        if stored != key {
            return Err(Error::Corrupted(format!(
                "file for key {:?} holds key {:?}",
                key, stored
            )));
        }
        Ok(Some(record))
    }

    fn write(&self, key: &str, record: &Record) -> Result<()> {
        let tmp = self
            .dir
            .join(format!("{}{}", TMP_PREFIX, uuid::Uuid::new_v4()));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&record.encode(key))?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, self.path_for(key)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Record> {
        check_key(key)?;
        self.read(key)?
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn upsert(&self, key: &str, record: &Record) -> Result<()> {
        check_key(key)?;
        let _guard = self.writer.lock().map_err(poisoned)?;
        self.write(key, record)
    }

    fn upsert_if_newer(&self, key: &str, record: &Record) -> Result<bool> {
        check_key(key)?;
        let _guard = self.writer.lock().map_err(poisoned)?;
        if !supersedes(record, self.read(key)?.as_ref()) {
            return Ok(false);
        }
        self.write(key, record)?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        let _guard = self.writer.lock().map_err(poisoned)?;
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn len(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.dir)? {
            if !entry?.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Storage handle shared by the coordinator and the inner endpoint
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KvStore>,
}

impl Storage {
    pub fn new_memory() -> Self {
        Self {
            backend: Arc::new(MemStore::new()),
        }
    }

    pub fn open_dir(dir: &Path) -> Result<Self> {
        Ok(Self {
            backend: Arc::new(FileStore::open(dir)?),
        })
    }

    pub fn get(&self, key: &str) -> Result<Record> {
        self.backend.get(key)
    }

    pub fn upsert(&self, key: &str, record: &Record) -> Result<()> {
        self.backend.upsert(key, record)
    }

    pub fn upsert_if_newer(&self, key: &str, record: &Record) -> Result<bool> {
        self.backend.upsert_if_newer(key, record)
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key)
    }

    pub fn len(&self) -> Result<usize> {
        self.backend.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn KvStore) {
        assert!(matches!(store.get("k1"), Err(Error::NotFound(_))));

        store.upsert("k1", &Record::new(1, &b"v1"[..])).unwrap();
        assert_eq!(store.get("k1").unwrap(), Record::new(1, &b"v1"[..]));

        store.upsert("k1", &Record::new(2, &b"v2"[..])).unwrap();
        assert_eq!(store.get("k1").unwrap().value, Bytes::from_static(b"v2"));
        assert_eq!(store.len().unwrap(), 1);

        store.delete("k1").unwrap();
        store.delete("k1").unwrap();
        assert!(matches!(store.get("k1"), Err(Error::NotFound(_))));
        assert_eq!(store.len().unwrap(), 0);

        assert!(matches!(store.get(""), Err(Error::InvalidRequest(_))));
        assert!(store.upsert("", &Record::new(0, Bytes::new())).is_err());
    }

    fn exercise_conditional(store: &dyn KvStore) {
        // Absent key is always written
        assert!(store.upsert_if_newer("k", &Record::new(200, &b"new"[..])).unwrap());

        // Older and equal timestamps leave the stored record alone
        assert!(!store.upsert_if_newer("k", &Record::new(100, &b"old"[..])).unwrap());
        assert!(!store.upsert_if_newer("k", &Record::new(200, &b"same"[..])).unwrap());
        assert_eq!(store.get("k").unwrap(), Record::new(200, &b"new"[..]));

        assert!(store.upsert_if_newer("k", &Record::new(300, &b"newer"[..])).unwrap());
        assert_eq!(store.get("k").unwrap(), Record::new(300, &b"newer"[..]));
    }

    fn exercise_awkward_keys(store: &dyn KvStore) {
        let keys = [
            "with space".to_string(),
            "a&b=c+d?e#f".to_string(),
            "dir/sub/file".to_string(),
            "..".to_string(),
            ".tmp-not-a-temp-file".to_string(),
            "%41".to_string(),
            "ключ-значение".to_string(),
            "鍵".repeat(30),
            "x".repeat(300),
            "ü".repeat(200),
        ];
        for (i, key) in keys.iter().enumerate() {
            store.upsert(key, &Record::new(i as u64, key.as_bytes().to_vec())).unwrap();
        }
        for (i, key) in keys.iter().enumerate() {
            let record = store.get(key).unwrap();
            assert_eq!(record.timestamp, i as u64);
            assert_eq!(record.value.as_ref(), key.as_bytes());
        }
        assert_eq!(store.len().unwrap(), keys.len());
    }

    #[test]
    fn test_mem_store() {
        exercise(&MemStore::new());
        exercise_conditional(&MemStore::new());
        exercise_awkward_keys(&MemStore::new());
    }

    #[test]
    fn test_file_store() {
        let dir = TempDir::new().unwrap();
        exercise(&FileStore::open(dir.path()).unwrap());
    }

    #[test]
    fn test_file_store_conditional_write() {
        let dir = TempDir::new().unwrap();
        exercise_conditional(&FileStore::open(dir.path()).unwrap());
    }

    #[test]
    fn test_file_store_long_and_multibyte_keys() {
        let dir = TempDir::new().unwrap();
        exercise_awkward_keys(&FileStore::open(dir.path()).unwrap());
    }

    #[test]
    fn test_file_store_persistence() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.upsert("a/b", &Record::new(7, &b"nested"[..])).unwrap();
            store.upsert("empty", &Record::new(8, Bytes::new())).unwrap();
        }
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get("a/b").unwrap(), Record::new(7, &b"nested"[..]));
        assert!(store.get("empty").unwrap().value.is_empty());
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_file_store_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.upsert("key", &Record::new(1, &b"value"[..])).unwrap();

        let path = dir.path().join(key_digest("key"));
        let mut bytes = fs::read(&path).unwrap();
        let last = HEADER_LEN + 4;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            store.get("key"),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_file_store_detects_foreign_key() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.upsert("first", &Record::new(1, &b"v"[..])).unwrap();

        // A file that holds another key under this key's name
        fs::copy(
            dir.path().join(key_digest("first")),
            dir.path().join(key_digest("second")),
        )
        .unwrap();

        assert!(matches!(store.get("second"), Err(Error::Corrupted(_))));
        assert!(store.upsert_if_newer("second", &Record::new(2, &b"v"[..])).is_err());
    }

    #[test]
    fn test_file_store_removes_stale_tmp_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(format!("{}leftover", TMP_PREFIX)), b"x").unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_record_too_short() {
        assert!(matches!(Record::decode(b"RKV1"), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_record_length_mismatch() {
        let mut buf = Record::new(1, &b"value"[..]).encode("key");
        // Claim a longer key than the payload holds, then fix up the checksum
        buf[12] = 200;
        let body_len = buf.len() - 4;
        let crc = crc32(&buf[..body_len]);
        buf[body_len..].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(Record::decode(&buf), Err(Error::Corrupted(_))));
    }
}
