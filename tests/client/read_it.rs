use crate::cluster::{quorum_config, TestCluster, PASSWORD};
use ledgerstore::client::{ClientError, NodeState};
use ledgerstore::codec::{encode_entry, EntryHeader};
use ledgerstore::DigestType;
use std::sync::mpsc;
use std::time::Duration;

#[test]
fn range_reads_return_payloads_in_order() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    for idx in 0..6 {
        ledger.add_entry(format!("value-{idx}").as_bytes()).expect("add");
    }
    let entries = ledger.read_entries(1, 4).expect("read");
    let payloads: Vec<String> = entries
        .iter()
        .map(|entry| String::from_utf8(entry.payload.clone()).expect("utf8"))
        .collect();
    assert_eq!(payloads, ["value-1", "value-2", "value-3", "value-4"]);
    assert!(entries
        .iter()
        .all(|entry| entry.ledger_id == ledger.ledger_id()));
    assert_eq!(cluster.stats.snapshot().successes("client.read_entry"), 4);
}

#[test]
fn reads_are_bounded_by_the_confirmed_entry() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    ledger.add_entry(b"only").expect("add");
    assert!(matches!(
        ledger.read_entries(0, 1),
        Err(ClientError::ReadException(_))
    ));
    assert!(matches!(
        ledger.read_entries(2, 1),
        Err(ClientError::IncorrectParameter(_))
    ));
    assert!(matches!(
        ledger.read_entries(-1, 0),
        Err(ClientError::IncorrectParameter(_))
    ));
}

#[test]
fn callback_read_delivers_entries() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 3, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    ledger.add_entry(b"a").expect("add");
    ledger.add_entry(b"b").expect("add");
    let (tx, rx) = mpsc::channel();
    ledger.async_read_entries(0, 1, move |outcome| {
        tx.send(outcome).expect("send");
    });
    let entries = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback ran")
        .expect("read");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].payload, b"b".to_vec());
}

#[test]
fn corrupt_copies_are_rejected() {
    let cluster = TestCluster::start(2);
    let client = cluster.client(quorum_config(2, 2, 1));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    let mut corrupt = encode_entry(
        EntryHeader::new(ledger.ledger_id(), 0, -1),
        b"payload",
        DigestType::Crc32,
    );
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xff;
    for slot in 0..2 {
        cluster.store_raw(cluster.ensemble_member(&ledger, slot), &corrupt);
    }

    let reader = client
        .open_ledger_no_recovery(ledger.ledger_id(), PASSWORD)
        .expect("reader");
    assert_eq!(reader.read_last_confirmed(), Ok(0));
    assert!(matches!(
        reader.read_entries(0, 0),
        Err(ClientError::ReadException(_))
    ));
    assert_eq!(cluster.stats.snapshot().counter("client.digest_mismatch"), 2);
}

#[test]
fn diverging_copies_are_reported() {
    let cluster = TestCluster::start(2);
    let client = cluster.client(quorum_config(2, 2, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    let header = EntryHeader::new(ledger.ledger_id(), 0, -1);
    cluster.store_directly(cluster.ensemble_member(&ledger, 0), header, b"left");
    cluster.store_directly(cluster.ensemble_member(&ledger, 1), header, b"right");

    let reader = client
        .open_ledger_no_recovery(ledger.ledger_id(), PASSWORD)
        .expect("reader");
    reader.read_last_confirmed().expect("lac");
    assert_eq!(
        reader.read_entries(0, 0),
        Err(ClientError::InconsistentEntry {
            ledger_id: ledger.ledger_id(),
            entry_id: 0
        })
    );
}

#[test]
fn closed_ledger_serves_lac_from_metadata() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    for _ in 0..3 {
        ledger.add_entry(b"entry").expect("add");
    }
    ledger.close().expect("close");

    let reader = client.open_ledger(ledger.ledger_id(), PASSWORD).expect("reader");
    assert!(reader.is_closed());
    assert!(reader.is_read_only());
    assert_eq!(reader.read_entries(0, 2).expect("read").len(), 3);

    for idx in 0..3 {
        cluster.set_state(idx, NodeState::Down);
    }
    assert_eq!(reader.read_last_confirmed(), Ok(2));
    assert!(matches!(
        reader.read_entries(0, 0),
        Err(ClientError::ReadException(_))
    ));
}

#[test]
fn reader_handles_cannot_write() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    let reader = client
        .open_ledger_no_recovery(ledger.ledger_id(), PASSWORD)
        .expect("reader");
    assert!(matches!(
        reader.add_entry(b"nope"),
        Err(ClientError::IllegalOp(_))
    ));
    assert!(matches!(
        client.open_ledger_no_recovery(ledger.ledger_id(), b"wrong"),
        Err(ClientError::Unauthorized(id)) if id == ledger.ledger_id()
    ));
    assert!(matches!(
        client.open_ledger(999, PASSWORD),
        Err(ClientError::NoSuchLedger(999))
    ));
}
