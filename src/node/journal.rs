use crc32fast::Hasher as Crc32Hasher;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const JOURNAL_FILE_NAME: &str = "journal.log";
const FRAME_HEADER_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("journal record of {0} bytes exceeds frame limit")]
    RecordTooLarge(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalReplay {
    pub records: Vec<Vec<u8>>,
    /// Byte offset of a torn or corrupt tail, if replay stopped early.
    pub truncated_at: Option<u64>,
}

/// Append-only record log. `append` makes a record visible to replay;
/// `sync` makes everything appended so far durable.
#[derive(Debug)]
pub struct Journal {
    backend: Mutex<Backend>,
}

#[derive(Debug)]
enum Backend {
    File {
        path: PathBuf,
        file: File,
        sync_data: bool,
        unsynced: usize,
    },
    Memory {
        frames: Vec<u8>,
    },
}

impl Journal {
    /// Opens (or creates) the journal file inside `dir`.
    pub fn open(dir: impl AsRef<Path>, sync_data: bool) -> Result<Self, JournalError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .append(true)
            .open(&path)?;
        let len = file.seek(SeekFrom::End(0))?;
        info!(
            "event=journal_opened path={} bytes={}",
            path.display(),
            len
        );
        Ok(Self {
            backend: Mutex::new(Backend::File {
                path,
                file,
                sync_data,
                unsynced: 0,
            }),
        })
    }

    /// Journal that lives only in memory; `sync` is a no-op.
    pub fn in_memory() -> Self {
        Self {
            backend: Mutex::new(Backend::Memory { frames: Vec::new() }),
        }
    }

    pub fn path(&self) -> Option<PathBuf> {
        match &*self.backend.lock() {
            Backend::File { path, .. } => Some(path.clone()),
            Backend::Memory { .. } => None,
        }
    }

    pub fn append(&self, record: &[u8]) -> Result<(), JournalError> {
        let frame = encode_frame(record)?;
        match &mut *self.backend.lock() {
            Backend::File {
                path,
                file,
                unsynced,
                ..
            } => {
                file.write_all(&frame).map_err(|err| {
                    error!(
                        "event=journal_append_failed path={} error={}",
                        path.display(),
                        err
                    );
                    err
                })?;
                *unsynced += 1;
            }
            Backend::Memory { frames } => frames.extend_from_slice(&frame),
        }
        Ok(())
    }

    pub fn sync(&self) -> Result<(), JournalError> {
        if let Backend::File {
            path,
            file,
            sync_data,
            unsynced,
        } = &mut *self.backend.lock()
        {
            if *unsynced == 0 {
                return Ok(());
            }
            file.flush()?;
            if *sync_data {
                file.sync_data().map_err(|err| {
                    error!(
                        "event=journal_fdatasync_failed path={} error={}",
                        path.display(),
                        err
                    );
                    err
                })?;
            }
            *unsynced = 0;
        }
        Ok(())
    }

    /// Number of records appended since the last successful sync.
    pub fn unsynced(&self) -> usize {
        match &*self.backend.lock() {
            Backend::File { unsynced, .. } => *unsynced,
            Backend::Memory { .. } => 0,
        }
    }

    pub fn replay(&self) -> Result<JournalReplay, JournalError> {
        let bytes = match &mut *self.backend.lock() {
            Backend::File { path, .. } => {
                let mut reader = File::open(&*path)?;
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                bytes
            }
            Backend::Memory { frames } => frames.clone(),
        };
        Ok(parse_frames(&bytes))
    }
}

fn encode_frame(record: &[u8]) -> Result<Vec<u8>, JournalError> {
    let len = u32::try_from(record.len()).map_err(|_| JournalError::RecordTooLarge(record.len()))?;
    let mut hasher = Crc32Hasher::new();
    hasher.update(record);
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + record.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&hasher.finalize().to_be_bytes());
    frame.extend_from_slice(record);
    Ok(frame)
}

fn parse_frames(bytes: &[u8]) -> JournalReplay {
    let mut replay = JournalReplay::default();
    let mut offset = 0usize;
    while offset < bytes.len() {
        let Some(record) = read_frame(&bytes[offset..]) else {
            warn!(
                "event=journal_tail_truncated offset={} remaining={}",
                offset,
                bytes.len() - offset
            );
            replay.truncated_at = Some(offset as u64);
            break;
        };
        offset += FRAME_HEADER_LEN + record.len();
        replay.records.push(record.to_vec());
    }
    replay
}

fn read_frame(bytes: &[u8]) -> Option<&[u8]> {
    let len = u32::from_be_bytes(bytes.get(0..4)?.try_into().ok()?) as usize;
    let crc = u32::from_be_bytes(bytes.get(4..8)?.try_into().ok()?);
    let record = bytes.get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len)?;
    let mut hasher = Crc32Hasher::new();
    hasher.update(record);
    (hasher.finalize() == crc).then_some(record)
}
