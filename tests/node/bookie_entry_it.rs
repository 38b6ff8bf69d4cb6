use crate::node_fixture::{self, add, entry, KEY};
use ledgerstore::codec::{encode_lac_payload, CodecError};
use ledgerstore::node::{BookieError, LedgerState};
use tempfile::TempDir;

#[test]
fn added_entries_read_back_byte_for_byte() {
    let temp = TempDir::new().expect("tempdir");
    let (bookie, stats) = node_fixture::started_with_stats(temp.path());
    let first = add(&bookie, 1, 0);
    let second = add(&bookie, 1, 1);

    assert_eq!(bookie.read_entry(1, 0).expect("entry 0"), first);
    assert_eq!(bookie.read_entry(1, 1).expect("entry 1"), second);
    assert_eq!(bookie.read_last_add_confirmed(1).expect("lac"), 1);
    assert_eq!(bookie.ledger_state(1), Some(LedgerState::Open));

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.successes("bookie.add_entry"), 2);
    assert_eq!(snapshot.successes("bookie.read_entry"), 2);
}

#[test]
fn ack_before_sync_completes_immediately() {
    let temp = TempDir::new().expect("tempdir");
    let bookie = node_fixture::started(temp.path());
    let ack = bookie
        .add_entry(&entry(4, 0, b"fast"), true, KEY)
        .expect("accepted");
    let ack = ack.peek().expect("already done").expect("ack");
    assert_eq!((ack.ledger_id, ack.entry_id), (4, 0));
    assert_eq!(ack.bookie_id, *bookie.id());
}

#[test]
fn malformed_and_negative_ids_are_rejected() {
    let temp = TempDir::new().expect("tempdir");
    let (bookie, stats) = node_fixture::started_with_stats(temp.path());
    let short = vec![0u8; 23];
    assert_eq!(
        bookie.add_entry(&short, false, KEY).unwrap_err(),
        BookieError::Codec(CodecError::TooShort {
            needed: 24,
            actual: 23
        })
    );
    assert_eq!(
        bookie.add_entry(&entry(-3, 0, b"x"), false, KEY).unwrap_err(),
        BookieError::InvalidLedgerId(-3)
    );
    assert_eq!(
        bookie.add_entry(&entry(3, -7, b"x"), false, KEY).unwrap_err(),
        BookieError::InvalidEntryId(-7)
    );
    assert_eq!(bookie.ledger_state(3), None);
    assert_eq!(stats.snapshot().failures("bookie.add_entry"), 3);
}

#[test]
fn master_key_is_bound_on_first_write() {
    let temp = TempDir::new().expect("tempdir");
    let bookie = node_fixture::started(temp.path());
    add(&bookie, 2, 0);
    let err = bookie
        .add_entry(&entry(2, 1, b"intruder"), false, b"other-key")
        .unwrap_err();
    assert_eq!(err, BookieError::Unauthorized { ledger_id: 2 });
    assert_eq!(err.code(), 102);
    assert_eq!(
        bookie.add_entry(&entry(2, 1, b"x"), false, b"").unwrap_err(),
        BookieError::MissingMasterKey { ledger_id: 2 }
    );
    assert_eq!(bookie.read_last_add_confirmed(2).expect("lac"), 0);
}

#[test]
fn unknown_ledger_and_entry_are_errors() {
    let temp = TempDir::new().expect("tempdir");
    let bookie = node_fixture::started(temp.path());
    assert_eq!(bookie.read_entry(9, 0), Err(BookieError::NoSuchLedger(9)));
    assert_eq!(
        bookie.read_last_add_confirmed(9),
        Err(BookieError::NoSuchLedger(9))
    );
    add(&bookie, 9, 0);
    assert_eq!(
        bookie.read_entry(9, 5),
        Err(BookieError::NoSuchEntry {
            ledger_id: 9,
            entry_id: 5
        })
    );
}

#[test]
fn identical_readd_is_idempotent_conflicting_readd_is_not() {
    let temp = TempDir::new().expect("tempdir");
    let bookie = node_fixture::started(temp.path());
    let original = add(&bookie, 5, 0);
    bookie
        .add_entry(&original, false, KEY)
        .expect("duplicate accepted")
        .join()
        .expect("duplicate acked");
    assert_eq!(
        bookie
            .add_entry(&entry(5, 0, b"different"), false, KEY)
            .unwrap_err(),
        BookieError::EntryConflict {
            ledger_id: 5,
            entry_id: 0
        }
    );
    assert_eq!(bookie.read_entry(5, 0).expect("entry"), original);
}

#[test]
fn fencing_blocks_adds_but_not_recovery_adds() {
    let temp = TempDir::new().expect("tempdir");
    let bookie = node_fixture::started(temp.path());
    add(&bookie, 6, 0);
    add(&bookie, 6, 1);
    assert_eq!(bookie.fence_ledger(6, KEY).expect("fence"), 1);
    assert_eq!(bookie.ledger_state(6), Some(LedgerState::Fenced));
    assert_eq!(
        bookie.add_entry(&entry(6, 2, b"late"), false, KEY).unwrap_err(),
        BookieError::LedgerFenced(6)
    );
    bookie
        .recovery_add_entry(&entry(6, 2, b"recovered"), KEY)
        .expect("recovery accepted")
        .join()
        .expect("recovery durable");
    assert_eq!(bookie.read_last_add_confirmed(6).expect("lac"), 2);
    assert_eq!(
        bookie.fence_ledger(6, b"wrong"),
        Err(BookieError::Unauthorized { ledger_id: 6 })
    );
}

#[test]
fn full_disks_reject_writes() {
    let temp = TempDir::new().expect("tempdir");
    let bookie = node_fixture::started_with_usage(temp.path(), 0.99);
    assert_eq!(
        bookie.add_entry(&entry(1, 0, b"x"), false, KEY).unwrap_err(),
        BookieError::NoWritableDirectory
    );
    assert_eq!(
        bookie.recovery_add_entry(&entry(2, 0, b"x"), KEY).unwrap_err(),
        BookieError::NoWritableDirectory
    );
    assert_eq!(
        bookie
            .set_explicit_lac(&encode_lac_payload(3, 0), KEY)
            .unwrap_err(),
        BookieError::NoWritableDirectory
    );
    for ledger_id in 1..=3 {
        assert_eq!(bookie.ledger_state(ledger_id), None);
    }
}

#[test]
fn restart_replays_the_journal() {
    let temp = TempDir::new().expect("tempdir");
    let first = {
        let bookie = node_fixture::started(temp.path());
        let first = add(&bookie, 7, 0);
        add(&bookie, 7, 1);
        add(&bookie, 8, 0);
        bookie.fence_ledger(8, KEY).expect("fence");
        assert!(bookie.trigger_bookie_shutdown(0));
        first
    };

    let bookie = node_fixture::started(temp.path());
    assert_eq!(bookie.read_entry(7, 0).expect("replayed"), first);
    assert_eq!(bookie.read_last_add_confirmed(7).expect("lac"), 1);
    assert_eq!(bookie.ledger_state(8), Some(LedgerState::Fenced));
    assert_eq!(
        bookie
            .add_entry(&entry(7, 2, b"x"), false, b"other-key")
            .unwrap_err(),
        BookieError::Unauthorized { ledger_id: 7 }
    );
    add(&bookie, 7, 2);
    assert_eq!(bookie.read_last_add_confirmed(7).expect("lac"), 2);
}

#[test]
fn master_key_record_helper_rejects_empty_keys() {
    assert!(ledgerstore::Bookie::create_master_key_entry(1, KEY).is_ok());
    assert_eq!(
        ledgerstore::Bookie::create_master_key_entry(1, b""),
        Err(BookieError::Codec(CodecError::MissingMasterKey))
    );
}
