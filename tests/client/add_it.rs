use crate::cluster::{quorum_config, TestCluster, PASSWORD};
use ledgerstore::client::{ClientError, LedgerStatus, NodeState};
use ledgerstore::config::ClientConfig;
use ledgerstore::DigestType;
use std::sync::mpsc;
use std::time::Duration;

#[test]
fn adds_are_numbered_from_zero_and_confirmed_in_order() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    assert_eq!(ledger.get_last_add_confirmed(), -1);

    for expected in 0..5 {
        let id = ledger
            .add_entry(format!("entry-{expected}").as_bytes())
            .expect("add");
        assert_eq!(id, expected);
    }
    assert_eq!(ledger.get_last_add_confirmed(), 4);
    assert_eq!(ledger.get_last_add_pushed(), 4);
    assert_eq!(ledger.length(), 5 * "entry-0".len() as u64);
    assert_eq!(cluster.stats.snapshot().successes("client.add_entry"), 5);
}

#[test]
fn pipelined_appends_resolve_in_entry_order() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 3, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    let pending: Vec<_> = (0..20)
        .map(|idx| ledger.append_async(&[idx as u8; 16]))
        .collect();
    let ids: Vec<i64> = pending
        .iter()
        .map(|completion| completion.join().expect("append"))
        .collect();
    assert_eq!(ids, (0..20).collect::<Vec<i64>>());
    assert_eq!(ledger.get_last_add_confirmed(), 19);
}

#[test]
fn entries_land_on_their_round_robin_write_set() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    ledger.add_entry(b"zero").expect("add 0");
    ledger.add_entry(b"one").expect("add 1");

    let slot = |idx: usize| cluster.bookie(cluster.ensemble_member(&ledger, idx));
    assert!(slot(0).read_entry(ledger.ledger_id(), 0).is_ok());
    assert!(slot(1).read_entry(ledger.ledger_id(), 0).is_ok());
    assert!(slot(2).read_entry(ledger.ledger_id(), 0).is_err());
    assert!(slot(0).read_entry(ledger.ledger_id(), 1).is_err());
    assert!(slot(1).read_entry(ledger.ledger_id(), 1).is_ok());
    assert!(slot(2).read_entry(ledger.ledger_id(), 1).is_ok());
}

#[test]
fn callback_add_honours_offset_and_length() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    let (tx, rx) = mpsc::channel();
    ledger
        .async_add_entry(b"xxpayloadyy", 2, 7, move |outcome| {
            tx.send(outcome).expect("send");
        })
        .expect("range accepted");
    let id = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback ran")
        .expect("add");
    assert_eq!(id, 0);
    let entries = ledger.read_entries(0, 0).expect("read");
    assert_eq!(entries[0].payload, b"payload".to_vec());

    let err = ledger
        .async_add_entry(b"short", 3, 9, |_| panic!("nothing is sent"))
        .unwrap_err();
    assert_eq!(
        err,
        ClientError::IndexOutOfBounds {
            offset: 3,
            length: 9,
            len: 5
        }
    );
    assert_eq!(ledger.get_last_add_pushed(), 0);
}

#[tokio::test]
async fn appends_can_be_awaited() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    assert_eq!(ledger.append_async(b"first").await, Ok(0));
    assert_eq!(ledger.append_async(b"second").await, Ok(1));
}

#[test]
fn ensemble_needs_enough_available_nodes() {
    let cluster = TestCluster::start(3);
    cluster.set_state(1, NodeState::Down);
    let client = cluster.client(quorum_config(3, 2, 2));
    assert!(matches!(
        client.create_ledger(PASSWORD),
        Err(ClientError::NotEnoughBookies(_))
    ));
    assert!(matches!(
        client.create_ledger_with(2, 3, 2, DigestType::Crc32, PASSWORD),
        Err(ClientError::IncorrectParameter(_))
    ));
    assert!(matches!(
        client.create_ledger_with(2, 2, 0, DigestType::Crc32, PASSWORD),
        Err(ClientError::IncorrectParameter(_))
    ));
    let ledger = client
        .create_ledger_with(2, 2, 1, DigestType::Dummy, PASSWORD)
        .expect("two nodes are up");
    assert!(!ledger.metadata().ensemble.contains(cluster.bookie(1).id()));
}

#[test]
fn lost_ack_quorum_fails_the_add_and_closes_the_ledger() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 3, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    ledger.add_entry(b"kept").expect("add 0");

    cluster.set_state(cluster.ensemble_member(&ledger, 0), NodeState::Down);
    cluster.set_state(cluster.ensemble_member(&ledger, 1), NodeState::Down);
    assert!(matches!(
        ledger.add_entry(b"lost"),
        Err(ClientError::NotEnoughBookies(_))
    ));
    assert!(ledger.is_closed());
    assert_eq!(ledger.add_entry(b"late"), Err(ClientError::LedgerClosed(ledger.ledger_id())));

    let metadata = client
        .metadata_store()
        .read(ledger.ledger_id())
        .expect("metadata");
    assert_eq!(metadata.status, LedgerStatus::Closed);
    assert_eq!(metadata.last_entry_id, 0);
    assert_eq!(cluster.stats.snapshot().failures("client.add_entry"), 1);
}

#[test]
fn silent_node_times_out_only_when_its_ack_is_needed() {
    let cluster = TestCluster::start(3);
    let config = ClientConfig {
        add_entry_timeout_ms: 200,
        ..ClientConfig::with_quorum(3, 3, 2)
    };
    let client = cluster.client(config);
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    cluster.set_state(cluster.ensemble_member(&ledger, 2), NodeState::Unresponsive);
    assert_eq!(ledger.add_entry(b"two acks suffice"), Ok(0));

    cluster.set_state(cluster.ensemble_member(&ledger, 1), NodeState::Unresponsive);
    let outcome = ledger
        .append_async(b"needs a silent node")
        .join_timeout(Duration::from_secs(5))
        .expect("settled by the timer");
    assert!(matches!(outcome, Err(ClientError::NotEnoughBookies(_))));
}

#[test]
fn close_seals_metadata_at_the_last_confirmed_entry() {
    let cluster = TestCluster::start(3);
    let client = cluster.client(quorum_config(3, 2, 2));
    let ledger = client.create_ledger(PASSWORD).expect("ledger");
    for _ in 0..3 {
        ledger.add_entry(b"data").expect("add");
    }
    ledger.close().expect("close");
    ledger.close().expect("second close is a no-op");
    assert!(ledger.is_closed());
    assert_eq!(ledger.metadata().last_entry_id, 2);
    assert_eq!(
        ledger.add_entry(b"after close"),
        Err(ClientError::LedgerClosed(ledger.ledger_id()))
    );
    let stored = client.metadata_store().read(ledger.ledger_id()).expect("metadata");
    assert!(stored.is_closed());
    assert_eq!(stored.last_entry_id, 2);
}
