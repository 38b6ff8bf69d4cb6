#![allow(dead_code)]

use ledgerstore::codec::{encode_entry, EntryHeader};
use ledgerstore::config::ServerConfig;
use ledgerstore::node::{Bookie, BookieBuilder, BookieId, FixedDiskUsage};
use ledgerstore::telemetry::{InMemoryStats, StatsSink};
use ledgerstore::DigestType;
use std::path::Path;
use std::sync::Arc;

pub const KEY: &[u8] = b"master-key";

pub fn builder(base: &Path) -> BookieBuilder {
    BookieBuilder::new(ServerConfig::with_base_dir(base))
        .bookie_id(BookieId::parse("bookie-0:3181").expect("valid id"))
}

pub fn started(base: &Path) -> Bookie {
    let bookie = builder(base).build().expect("bookie builds");
    bookie.start().expect("bookie starts");
    bookie
}

/// Started node reporting into the returned stats sink.
pub fn started_with_stats(base: &Path) -> (Bookie, InMemoryStats) {
    let stats = InMemoryStats::new();
    let sink: Arc<dyn StatsSink> = Arc::new(stats.clone());
    let bookie = builder(base).stats(sink).build().expect("bookie builds");
    bookie.start().expect("bookie starts");
    (bookie, stats)
}

/// Started node whose ledger directories report `usage`.
pub fn started_with_usage(base: &Path, usage: f32) -> Bookie {
    let bookie = builder(base)
        .disk_usage(Arc::new(FixedDiskUsage::new(usage)))
        .build()
        .expect("bookie builds");
    bookie.start().expect("bookie starts");
    bookie
}

pub fn entry(ledger_id: i64, entry_id: i64, payload: &[u8]) -> Vec<u8> {
    encode_entry(
        EntryHeader::new(ledger_id, entry_id, entry_id - 1),
        payload,
        DigestType::Crc32,
    )
}

pub fn add(bookie: &Bookie, ledger_id: i64, entry_id: i64) -> Vec<u8> {
    let bytes = entry(ledger_id, entry_id, format!("payload-{entry_id}").as_bytes());
    bookie
        .add_entry(&bytes, false, KEY)
        .expect("add accepted")
        .join()
        .expect("add durable");
    bytes
}
