use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind as IoErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::backend::{visit_snapshot, Backend};
use crate::storage::file_lock::FileLock;
use crate::storage::key::Key;
use crate::storage::layout::StorageLayout;
use crate::storage::memory::MemoryBackend;

const HEADER_LEN: usize = 8;
const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;
const BATCH_SYNC_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Immediate,  // fsync after every write
    Batch,      // fsync once a megabyte has accumulated
    None,       // Let OS handle it
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub op: LogOp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

struct LogWriter {
    file: File,
    position: u64,
    sequence: u64,
    unsynced: u64,
    sync_mode: SyncMode,
}

impl LogWriter {
    fn append(&mut self, op: LogOp) -> Result<()> {
        let record = LogRecord {
            sequence: self.sequence,
            timestamp: Utc::now(),
            op,
        };
        let frame = encode_frame(&record)?;
        self.file.write_all(&frame)?;

        self.sequence += 1;
        self.position += frame.len() as u64;
        self.unsynced += frame.len() as u64;

        match self.sync_mode {
            SyncMode::Immediate => self.sync()?,
            SyncMode::Batch if self.unsynced >= BATCH_SYNC_BYTES => self.sync()?,
            _ => {}
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.unsynced = 0;
        Ok(())
    }
}

/// Durable backend: the live map is kept in memory and every mutation is
/// appended to `log/data.log` before it becomes visible. Opening a store
/// replays the log.
///
/// Frame layout: `[len: u32 LE][crc32: u32 LE][bincode(LogRecord)]`.
pub struct LogBackend {
    storage: StorageLayout,
    index: RwLock<BTreeMap<String, Vec<u8>>>,
    writer: Mutex<LogWriter>,
    closed: AtomicBool,
    _lock: FileLock,
}

impl LogBackend {
    pub fn open(path: impl Into<PathBuf>, sync_mode: SyncMode) -> Result<Self> {
        let storage = StorageLayout::new(path.into())?;
        let lock = FileLock::acquire(&storage)?;
        let log_path = storage.log_path();

        let replay = replay(&log_path)?;
        if replay.torn {
            warn!(
                path = %log_path.display(),
                valid_bytes = replay.valid_len,
                "truncating torn tail of record log"
            );
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&log_path)?;
        file.set_len(replay.valid_len)?;
        drop(file);
        let file = OpenOptions::new().append(true).open(&log_path)?;

        info!(
            path = %storage.base_dir.display(),
            entries = replay.index.len(),
            records = replay.records,
            "opened record log"
        );

        Ok(LogBackend {
            storage,
            index: RwLock::new(replay.index),
            writer: Mutex::new(LogWriter {
                file,
                position: replay.valid_len,
                sequence: replay.next_sequence,
                unsynced: 0,
                sync_mode,
            }),
            closed: AtomicBool::new(false),
            _lock: lock,
        })
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Size of the log file in bytes.
    pub fn log_size(&self) -> u64 {
        self.writer.lock().position
    }

    pub fn sync(&self) -> Result<()> {
        self.writer.lock().sync()
    }

    /// Rewrites the log with one `Put` per live entry and swaps it in.
    pub fn compact(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        let index = self.index.read();

        let tmp_path = self.storage.compaction_path();
        let mut tmp = File::create(&tmp_path)?;
        let mut position = 0u64;
        let mut sequence = 0u64;
        for (key, value) in index.iter() {
            let record = LogRecord {
                sequence,
                timestamp: Utc::now(),
                op: LogOp::Put { key: key.clone(), value: value.clone() },
            };
            let frame = encode_frame(&record)?;
            tmp.write_all(&frame)?;
            position += frame.len() as u64;
            sequence += 1;
        }
        tmp.sync_all()?;
        drop(tmp);

        let before = writer.position;
        fs::rename(&tmp_path, self.storage.log_path())?;
        writer.file = OpenOptions::new().append(true).open(self.storage.log_path())?;
        writer.position = position;
        writer.sequence = sequence;
        writer.unsynced = 0;

        info!(entries = index.len(), before, after = position, "compacted record log");
        Ok(())
    }

    fn apply(&self, op: LogOp) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut writer = self.writer.lock();
        let (raw, value) = match &op {
            LogOp::Put { key, value } => (key.clone(), Some(value.clone())),
            LogOp::Delete { key } => (key.clone(), None),
        };
        if let Err(err) = writer.append(op) {
            warn!(key = %raw, error = %err, "record log append failed");
            return false;
        }
        let mut index = self.index.write();
        match value {
            Some(value) => {
                index.insert(raw, value);
            }
            None => {
                index.remove(&raw);
            }
        }
        true
    }
}

impl Backend for LogBackend {
    fn raw_set(&self, key: &Key, value: &[u8]) -> bool {
        self.apply(LogOp::Put { key: key.raw(), value: value.to_vec() })
    }

    fn raw_get(&self, key: &Key) -> Option<Vec<u8>> {
        self.index.read().get(&key.raw()).cloned()
    }

    fn raw_delete(&self, key: &Key) -> bool {
        if !self.exists(key) {
            return false;
        }
        self.apply(LogOp::Delete { key: key.raw() })
    }

    fn exists(&self, key: &Key) -> bool {
        self.index.read().contains_key(&key.raw())
    }

    fn iter_keys(&self, prefix: &Key, visit: &mut dyn FnMut(Key) -> bool) {
        let snapshot = MemoryBackend::snapshot(&self.index.read(), &prefix.prefix(), |_| ());
        visit_snapshot(snapshot, |key, _| visit(key));
    }

    fn iter_entries(&self, prefix: &Key, visit: &mut dyn FnMut(Key, Vec<u8>) -> bool) {
        let snapshot = MemoryBackend::snapshot(&self.index.read(), &prefix.prefix(), Vec::clone);
        visit_snapshot(snapshot, |key, value| visit(key, value));
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.sync() {
            warn!(error = %err, "final sync of record log failed");
        }
        debug!(path = %self.storage.base_dir.display(), "closed record log");
    }
}

impl Drop for LogBackend {
    fn drop(&mut self) {
        self.close();
    }
}

fn encode_frame(record: &LogRecord) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record)
        .map_err(|e| Error::new(ErrorKind::Encode, e.to_string()))?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

struct Replay {
    index: BTreeMap<String, Vec<u8>>,
    valid_len: u64,
    next_sequence: u64,
    records: usize,
    torn: bool,
}

/// Reads every complete frame of the log. A short header or body at the end
/// is a torn write and stops the replay; a checksum mismatch is corruption.
fn replay(path: &Path) -> Result<Replay> {
    let mut replay = Replay {
        index: BTreeMap::new(),
        valid_len: 0,
        next_sequence: 0,
        records: 0,
        torn: false,
    };

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(replay),
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(file);

    loop {
        let mut header = [0u8; HEADER_LEN];
        match read_full(&mut reader, &mut header)? {
            0 => break,
            n if n < HEADER_LEN => {
                replay.torn = true;
                break;
            }
            _ => {}
        }

        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if len > MAX_RECORD_LEN {
            return Err(Error::new(
                ErrorKind::Corrupted,
                format!("record at offset {} claims {} bytes", replay.valid_len, len),
            ));
        }

        let mut payload = vec![0u8; len];
        if read_full(&mut reader, &mut payload)? < len {
            replay.torn = true;
            break;
        }
        if crc32fast::hash(&payload) != crc {
            return Err(Error::new(
                ErrorKind::Corrupted,
                format!("checksum mismatch at offset {}", replay.valid_len),
            ));
        }

        let record: LogRecord = bincode::deserialize(&payload)
            .map_err(|e| Error::new(ErrorKind::Corrupted, e.to_string()))?;
        match record.op {
            LogOp::Put { key, value } => {
                replay.index.insert(key, value);
            }
            LogOp::Delete { key } => {
                replay.index.remove(&key);
            }
        }

        replay.next_sequence = record.sequence + 1;
        replay.records += 1;
        replay.valid_len += (HEADER_LEN + len) as u64;
    }

    Ok(replay)
}

/// Like `read_exact`, but reports how many bytes were read before EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::key::TableKey;
    use tempfile::TempDir;

    fn row(id: &str) -> Key {
        Key::Table(TableKey::new("Row", id))
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let backend = LogBackend::open(dir.path(), SyncMode::Immediate).unwrap();
            assert!(backend.raw_set(&row("1"), b"one"));
            assert!(backend.raw_set(&row("2"), b"two"));
            assert!(backend.raw_delete(&row("1")));
        }

        let backend = LogBackend::open(dir.path(), SyncMode::Immediate).unwrap();
        assert_eq!(backend.raw_get(&row("1")), None);
        assert_eq!(backend.raw_get(&row("2")), Some(b"two".to_vec()));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let log_path;
        {
            let backend = LogBackend::open(dir.path(), SyncMode::Immediate).unwrap();
            backend.raw_set(&row("1"), b"kept");
            log_path = backend.storage.log_path();
        }
        let intact = fs::metadata(&log_path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
            file.write_all(&[42, 0, 0, 0, 1, 2]).unwrap();
        }

        let backend = LogBackend::open(dir.path(), SyncMode::Immediate).unwrap();
        assert_eq!(backend.raw_get(&row("1")), Some(b"kept".to_vec()));
        assert_eq!(backend.log_size(), intact);
    }

    #[test]
    fn flipped_byte_is_corruption() {
        let dir = TempDir::new().unwrap();
        let log_path;
        {
            let backend = LogBackend::open(dir.path(), SyncMode::Immediate).unwrap();
            backend.raw_set(&row("1"), b"payload");
            log_path = backend.storage.log_path();
        }
        let mut bytes = fs::read(&log_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&log_path, bytes).unwrap();

        match LogBackend::open(dir.path(), SyncMode::Immediate) {
            Err(err) => assert_eq!(err.kind, ErrorKind::Corrupted),
            Ok(_) => panic!("corrupted log opened cleanly"),
        }
    }

    #[test]
    fn compaction_keeps_only_live_entries() {
        let dir = TempDir::new().unwrap();
        let backend = LogBackend::open(dir.path(), SyncMode::None).unwrap();
        for round in 0..20 {
            backend.raw_set(&row("hot"), format!("v{}", round).as_bytes());
        }
        backend.raw_set(&row("gone"), b"x");
        backend.raw_delete(&row("gone"));

        let before = backend.log_size();
        backend.compact().unwrap();
        assert!(backend.log_size() < before);

        backend.raw_set(&row("after"), b"y");
        drop(backend);

        let backend = LogBackend::open(dir.path(), SyncMode::None).unwrap();
        assert_eq!(backend.raw_get(&row("hot")), Some(b"v19".to_vec()));
        assert_eq!(backend.raw_get(&row("after")), Some(b"y".to_vec()));
        assert!(!backend.exists(&row("gone")));
    }

    #[test]
    fn second_open_is_refused_while_locked() {
        let dir = TempDir::new().unwrap();
        let _first = LogBackend::open(dir.path(), SyncMode::None).unwrap();
        assert!(LogBackend::open(dir.path(), SyncMode::None).is_err());
    }

    #[test]
    fn writes_after_close_are_refused() {
        let dir = TempDir::new().unwrap();
        let backend = LogBackend::open(dir.path(), SyncMode::None).unwrap();
        backend.close();
        backend.close();
        assert!(!backend.raw_set(&row("1"), b""));
    }
}
