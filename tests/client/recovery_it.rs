use crate::cluster::{quorum_config, TestCluster, PASSWORD};
use ledgerstore::client::{ClientError, LedgerStatus, NodeState};
use ledgerstore::codec::EntryHeader;
use ledgerstore::node::LedgerState;

#[test]
fn opening_fences_the_writer_out() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let writer = client.create_ledger(PASSWORD).expect("ledger");
    for _ in 0..5 {
        writer.add_entry(b"entry").expect("add");
    }

    let reader = client.open_ledger(writer.ledger_id(), PASSWORD).expect("open");
    assert!(reader.is_closed());
    assert_eq!(reader.get_last_add_confirmed(), 4);
    assert_eq!(reader.metadata().status, LedgerStatus::Closed);
    assert_eq!(reader.metadata().last_entry_id, 4);
    for idx in 0..3 {
        assert_eq!(
            cluster.bookie(idx).ledger_state(writer.ledger_id()),
            Some(LedgerState::Fenced)
        );
    }

    assert_eq!(
        writer.add_entry(b"too late"),
        Err(ClientError::LedgerFenced(writer.ledger_id()))
    );
    assert!(writer.is_closed());
    let stored = client.metadata_store().read(writer.ledger_id()).expect("metadata");
    assert_eq!(stored.last_entry_id, 4);
    assert_eq!(reader.read_entries(0, 4).expect("read").len(), 5);
}

#[test]
fn partially_written_tail_is_re_replicated() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 3, 2));
    let writer = client.create_ledger(PASSWORD).expect("ledger");
    for _ in 0..3 {
        writer.add_entry(b"acked").expect("add");
    }
    let lone = cluster.ensemble_member(&writer, 0);
    cluster.store_directly(
        lone,
        EntryHeader::new(writer.ledger_id(), 3, 2),
        b"crashed mid-add",
    );

    let reader = client.open_ledger(writer.ledger_id(), PASSWORD).expect("open");
    assert_eq!(reader.metadata().last_entry_id, 3);
    for slot in 0..3 {
        let idx = cluster.ensemble_member(&writer, slot);
        assert!(cluster.bookie(idx).read_entry(writer.ledger_id(), 3).is_ok());
    }
    let tail = reader.read_entries(3, 3).expect("read");
    assert_eq!(tail[0].payload, b"crashed mid-add".to_vec());
}

#[test]
fn empty_ledger_recovers_to_nothing() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let writer = client.create_ledger(PASSWORD).expect("ledger");
    let reader = client.open_ledger(writer.ledger_id(), PASSWORD).expect("open");
    assert_eq!(reader.metadata().last_entry_id, -1);
    assert_eq!(reader.read_last_confirmed(), Ok(-1));
    assert!(matches!(
        writer.add_entry(b"x"),
        Err(ClientError::LedgerFenced(_))
    ));
}

#[test]
fn recovery_needs_every_write_set_reachable() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 3, 2));
    let writer = client.create_ledger(PASSWORD).expect("ledger");
    writer.add_entry(b"x").expect("add");
    cluster.set_state(cluster.ensemble_member(&writer, 0), NodeState::Down);
    cluster.set_state(cluster.ensemble_member(&writer, 1), NodeState::Down);
    assert!(matches!(
        client.open_ledger(writer.ledger_id(), PASSWORD),
        Err(ClientError::NotEnoughBookies(_))
    ));
    assert!(!client
        .metadata_store()
        .read(writer.ledger_id())
        .expect("metadata")
        .is_closed());
}

#[test]
fn recovery_checks_the_password_first() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let writer = client.create_ledger(PASSWORD).expect("ledger");
    writer.add_entry(b"x").expect("add");
    assert!(matches!(
        client.open_ledger(writer.ledger_id(), b"guess"),
        Err(ClientError::Unauthorized(_))
    ));
    assert_eq!(
        cluster.bookie(0).ledger_state(writer.ledger_id()),
        Some(LedgerState::Open)
    );
    assert_eq!(writer.add_entry(b"still writable"), Ok(1));
}

#[test]
fn no_recovery_open_leaves_the_writer_alone() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let writer = client.create_ledger(PASSWORD).expect("ledger");
    writer.add_entry(b"x").expect("add");
    let reader = client
        .open_ledger_no_recovery(writer.ledger_id(), PASSWORD)
        .expect("reader");
    assert!(!reader.is_closed());
    assert_eq!(writer.add_entry(b"y"), Ok(1));
    reader.close().expect("reader close");
    assert_eq!(writer.add_entry(b"z"), Ok(2));
    assert!(!client
        .metadata_store()
        .read(writer.ledger_id())
        .expect("metadata")
        .is_closed());
}
