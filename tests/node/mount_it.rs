use crate::dir_scenario::DirScenario;
use crate::node_fixture;
use ledgerstore::config::ServerConfig;
use ledgerstore::lifecycle::DirectoryError;
use ledgerstore::node::{
    current_directories, mount_ledger_storage_offline, BookieBuilder, BookieError,
    InMemoryLedgerStorage, LedgerStorage, StorageError,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn offline_mount_initializes_fresh_storage() {
    let temp = TempDir::new().expect("tempdir");
    let config = ServerConfig::with_base_dir(temp.path());
    let storage = mount_ledger_storage_offline(&config, None).expect("mounted");
    assert!(storage.is_initialized());
    assert!(!storage.has_ledger(1));
}

#[test]
fn offline_mount_refuses_initialized_storage() {
    let temp = TempDir::new().expect("tempdir");
    let config = ServerConfig::with_base_dir(temp.path());
    let storage: Arc<dyn LedgerStorage> = Arc::new(InMemoryLedgerStorage::new());
    storage.initialize(&config).expect("first init");
    assert_eq!(
        mount_ledger_storage_offline(&config, Some(Arc::clone(&storage))).err(),
        Some(StorageError::AlreadyInitialized)
    );
    let err = node_fixture::builder(temp.path())
        .storage(storage)
        .build()
        .unwrap_err();
    assert!(matches!(err, BookieError::IllegalState(_)));
}

#[test]
fn offline_mount_validates_configuration() {
    let config = ServerConfig::default();
    assert!(matches!(
        mount_ledger_storage_offline(&config, None),
        Err(StorageError::InvalidConfig(_))
    ));
    let err = BookieBuilder::new(config).build().unwrap_err();
    assert!(matches!(err, BookieError::InvalidConfig(_)));
}

#[test]
fn current_directories_has_no_default() {
    let dirs = vec![PathBuf::from("/data/a"), PathBuf::from("/data/b")];
    assert_eq!(current_directories(Some(dirs.as_slice())).expect("dirs"), dirs);
    assert!(matches!(
        current_directories(None),
        Err(BookieError::InvalidArgument(_))
    ));
}

#[test]
fn build_checks_every_directory_group() {
    let temp = TempDir::new().expect("tempdir");
    let journal = DirScenario::RegularFile.build(temp.path(), "journal");
    let config = ServerConfig {
        journal_dirs: Some(vec![journal.clone()]),
        ledger_dirs: Some(vec![temp.path().join("node/ledgers")]),
        ..ServerConfig::default()
    };
    let err = BookieBuilder::new(config).build().unwrap_err();
    assert_eq!(
        err,
        BookieError::Directory(DirectoryError::NotADirectory { path: journal })
    );
}

#[test]
fn build_rejects_legacy_layout() {
    let temp = TempDir::new().expect("tempdir");
    let ledgers = DirScenario::LegacyVersionFile.build(temp.path(), "ledgers");
    let config = ServerConfig {
        journal_dirs: Some(vec![temp.path().join("journal")]),
        ledger_dirs: Some(vec![ledgers]),
        ..ServerConfig::default()
    };
    let err = BookieBuilder::new(config).build().unwrap_err();
    assert!(matches!(
        err,
        BookieError::Directory(DirectoryError::OldLayout { .. })
    ));
}

#[test]
fn build_creates_missing_directories() {
    let temp = TempDir::new().expect("tempdir");
    let bookie = node_fixture::builder(&temp.path().join("fresh"))
        .build()
        .expect("bookie builds");
    assert!(temp.path().join("fresh/journal").is_dir());
    assert!(temp.path().join("fresh/ledgers").is_dir());
    assert!(!bookie.is_running());
}
