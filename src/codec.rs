//! Entry, master-key and explicit-LAC record layouts (big-endian, fixed headers).

use crc32fast::Hasher as Crc32Hasher;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// ledgerId + entryId + lastAddConfirmed.
pub const ENTRY_HEADER_LEN: usize = 24;
/// ledgerId + entryId sentinel + key length.
pub const MASTER_KEY_HEADER_LEN: usize = 20;
/// ledgerId + entryId sentinel + payload length.
pub const EXPLICIT_LAC_HEADER_LEN: usize = 20;
/// ledgerId + lastAddConfirmed.
pub const LAC_PAYLOAD_LEN: usize = 16;
pub const FENCE_RECORD_LEN: usize = 16;

pub const METAENTRY_ID_LEDGER_KEY: i64 = -0x1000;
pub const METAENTRY_ID_FENCE_KEY: i64 = -0x2000;
pub const METAENTRY_ID_LEDGER_EXPLICITLAC: i64 = -0x8000;

/// Sentinel used for "nothing confirmed yet".
pub const INVALID_ENTRY_ID: i64 = -1;

const PASSWORD_DIGEST_PREFIX: &[u8] = b"ledger";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("record too short: need {needed} bytes, have {actual}")]
    TooShort { needed: usize, actual: usize },
    #[error("master key must not be empty")]
    MissingMasterKey,
    #[error("declared length {declared} exceeds available {available} bytes")]
    LengthMismatch { declared: usize, available: usize },
    #[error("unexpected record kind: entry id {entry_id}")]
    UnexpectedRecord { entry_id: i64 },
    #[error("digest mismatch for ledger {ledger_id} entry {entry_id}")]
    DigestMismatch { ledger_id: i64, entry_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DigestType {
    #[default]
    Crc32,
    Dummy,
}

impl DigestType {
    pub fn digest_len(self) -> usize {
        match self {
            DigestType::Crc32 => 4,
            DigestType::Dummy => 0,
        }
    }

    fn compute(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            DigestType::Crc32 => {
                let mut hasher = Crc32Hasher::new();
                hasher.update(bytes);
                hasher.finalize().to_be_bytes().to_vec()
            }
            DigestType::Dummy => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub ledger_id: i64,
    pub entry_id: i64,
    pub last_add_confirmed: i64,
}

impl EntryHeader {
    pub fn new(ledger_id: i64, entry_id: i64, last_add_confirmed: i64) -> Self {
        Self {
            ledger_id,
            entry_id,
            last_add_confirmed,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        ensure_len(bytes, ENTRY_HEADER_LEN)?;
        Ok(Self {
            ledger_id: read_i64(bytes, 0)?,
            entry_id: read_i64(bytes, 8)?,
            last_add_confirmed: read_i64(bytes, 16)?,
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ledger_id.to_be_bytes());
        out.extend_from_slice(&self.entry_id.to_be_bytes());
        out.extend_from_slice(&self.last_add_confirmed.to_be_bytes());
    }
}

/// Reads the ledger id without consuming anything from `entry`.
pub fn ledger_id(entry: &[u8]) -> Result<i64, CodecError> {
    ensure_len(entry, ENTRY_HEADER_LEN)?;
    read_i64(entry, 0)
}

/// Reads the entry id without consuming anything from `entry`.
pub fn entry_id(entry: &[u8]) -> Result<i64, CodecError> {
    ensure_len(entry, ENTRY_HEADER_LEN)?;
    read_i64(entry, 8)
}

/// Builds `header || payload || digest(header || payload)`.
pub fn encode_entry(header: EntryHeader, payload: &[u8], digest: DigestType) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENTRY_HEADER_LEN + payload.len() + digest.digest_len());
    header.encode_into(&mut out);
    out.extend_from_slice(payload);
    let code = digest.compute(&out);
    out.extend_from_slice(&code);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEntry {
    pub header: EntryHeader,
    pub payload: Vec<u8>,
}

/// Splits an encoded entry and checks its trailing digest.
pub fn decode_entry(bytes: &[u8], digest: DigestType) -> Result<DecodedEntry, CodecError> {
    let header = EntryHeader::decode(bytes)?;
    let digest_len = digest.digest_len();
    ensure_len(bytes, ENTRY_HEADER_LEN + digest_len)?;
    let body_end = bytes.len() - digest_len;
    if digest.compute(&bytes[..body_end]) != bytes[body_end..] {
        return Err(CodecError::DigestMismatch {
            ledger_id: header.ledger_id,
            entry_id: header.entry_id,
        });
    }
    Ok(DecodedEntry {
        header,
        payload: bytes[ENTRY_HEADER_LEN..body_end].to_vec(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKeyRecord {
    pub ledger_id: i64,
    pub master_key: Vec<u8>,
}

pub fn encode_master_key_record(ledger_id: i64, master_key: &[u8]) -> Result<Vec<u8>, CodecError> {
    if master_key.is_empty() {
        return Err(CodecError::MissingMasterKey);
    }
    let mut out = Vec::with_capacity(MASTER_KEY_HEADER_LEN + master_key.len());
    out.extend_from_slice(&ledger_id.to_be_bytes());
    out.extend_from_slice(&METAENTRY_ID_LEDGER_KEY.to_be_bytes());
    out.extend_from_slice(&length_prefix(master_key.len())?);
    out.extend_from_slice(master_key);
    Ok(out)
}

pub fn decode_master_key_record(bytes: &[u8]) -> Result<MasterKeyRecord, CodecError> {
    let (ledger_id, body) = decode_prefixed(bytes, METAENTRY_ID_LEDGER_KEY)?;
    Ok(MasterKeyRecord {
        ledger_id,
        master_key: body.to_vec(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitLacRecord {
    pub ledger_id: i64,
    pub lac: Vec<u8>,
}

/// Wraps an explicit LAC payload so it can live alongside entries in the journal.
pub fn encode_explicit_lac_record(ledger_id: i64, lac: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(EXPLICIT_LAC_HEADER_LEN + lac.len());
    out.extend_from_slice(&ledger_id.to_be_bytes());
    out.extend_from_slice(&METAENTRY_ID_LEDGER_EXPLICITLAC.to_be_bytes());
    out.extend_from_slice(&length_prefix(lac.len())?);
    out.extend_from_slice(lac);
    Ok(out)
}

pub fn decode_explicit_lac_record(bytes: &[u8]) -> Result<ExplicitLacRecord, CodecError> {
    let (ledger_id, body) = decode_prefixed(bytes, METAENTRY_ID_LEDGER_EXPLICITLAC)?;
    Ok(ExplicitLacRecord {
        ledger_id,
        lac: body.to_vec(),
    })
}

/// Explicit LAC payload as sent by a writer: ledger id then the confirmed entry id.
pub fn encode_lac_payload(ledger_id: i64, lac: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(LAC_PAYLOAD_LEN);
    out.extend_from_slice(&ledger_id.to_be_bytes());
    out.extend_from_slice(&lac.to_be_bytes());
    out
}

/// Returns `(ledger_id, lac)`; trailing bytes are ignored.
pub fn decode_lac_payload(bytes: &[u8]) -> Result<(i64, i64), CodecError> {
    ensure_len(bytes, LAC_PAYLOAD_LEN)?;
    Ok((read_i64(bytes, 0)?, read_i64(bytes, 8)?))
}

pub fn encode_fence_record(ledger_id: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(FENCE_RECORD_LEN);
    out.extend_from_slice(&ledger_id.to_be_bytes());
    out.extend_from_slice(&METAENTRY_ID_FENCE_KEY.to_be_bytes());
    out
}

/// Ledger id of any record, including the 16-byte fence record.
pub fn ledger_id_of_record(bytes: &[u8]) -> Result<i64, CodecError> {
    ensure_len(bytes, FENCE_RECORD_LEN)?;
    read_i64(bytes, 0)
}

/// What a journal record holds, judged by the entry-id slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Entry,
    MasterKey,
    Fence,
    ExplicitLac,
}

pub fn record_kind(bytes: &[u8]) -> Result<RecordKind, CodecError> {
    ensure_len(bytes, FENCE_RECORD_LEN)?;
    match read_i64(bytes, 8)? {
        METAENTRY_ID_LEDGER_KEY => Ok(RecordKind::MasterKey),
        METAENTRY_ID_FENCE_KEY => Ok(RecordKind::Fence),
        METAENTRY_ID_LEDGER_EXPLICITLAC => Ok(RecordKind::ExplicitLac),
        entry_id if entry_id >= 0 => {
            ensure_len(bytes, ENTRY_HEADER_LEN)?;
            Ok(RecordKind::Entry)
        }
        entry_id => Err(CodecError::UnexpectedRecord { entry_id }),
    }
}

/// Derives a ledger master key from a writer password.
pub fn master_key_from_password(password: &[u8]) -> Vec<u8> {
    let mut sha = Sha256::new();
    sha.update(PASSWORD_DIGEST_PREFIX);
    sha.update(password);
    sha.finalize().to_vec()
}

fn decode_prefixed(bytes: &[u8], expected: i64) -> Result<(i64, &[u8]), CodecError> {
    ensure_len(bytes, MASTER_KEY_HEADER_LEN)?;
    let ledger_id = read_i64(bytes, 0)?;
    let entry_id = read_i64(bytes, 8)?;
    if entry_id != expected {
        return Err(CodecError::UnexpectedRecord { entry_id });
    }
    let declared = read_i32(bytes, 16)?;
    let available = bytes.len() - MASTER_KEY_HEADER_LEN;
    let declared = usize::try_from(declared).map_err(|_| CodecError::LengthMismatch {
        declared: 0,
        available,
    })?;
    if declared > available {
        return Err(CodecError::LengthMismatch {
            declared,
            available,
        });
    }
    Ok((
        ledger_id,
        &bytes[MASTER_KEY_HEADER_LEN..MASTER_KEY_HEADER_LEN + declared],
    ))
}

/// Big-endian i32 length field; bodies past `i32::MAX` bytes cannot be framed.
fn length_prefix(len: usize) -> Result<[u8; 4], CodecError> {
    i32::try_from(len)
        .map(i32::to_be_bytes)
        .map_err(|_| CodecError::LengthMismatch {
            declared: len,
            available: i32::MAX as usize,
        })
}

fn ensure_len(bytes: &[u8], needed: usize) -> Result<(), CodecError> {
    if bytes.len() < needed {
        return Err(CodecError::TooShort {
            needed,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn read_i64(bytes: &[u8], offset: usize) -> Result<i64, CodecError> {
    bytes
        .get(offset..offset + 8)
        .and_then(|slice| slice.try_into().ok())
        .map(i64::from_be_bytes)
        .ok_or(CodecError::TooShort {
            needed: offset + 8,
            actual: bytes.len(),
        })
}

fn read_i32(bytes: &[u8], offset: usize) -> Result<i32, CodecError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|slice| slice.try_into().ok())
        .map(i32::from_be_bytes)
        .ok_or(CodecError::TooShort {
            needed: offset + 4,
            actual: bytes.len(),
        })
}
