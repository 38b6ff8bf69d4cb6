use crate::dir_scenario::DirScenario;
use crate::faulty_fs::FaultyFileSystem;
use ledgerstore::lifecycle::{check_directory_structure, DirectoryError, OsFileSystem};
use tempfile::TempDir;

#[test]
fn missing_and_empty_dirs_are_accepted() {
    let temp = TempDir::new().expect("tempdir");
    for (idx, scenario) in [DirScenario::Missing, DirScenario::Empty, DirScenario::WithData]
        .into_iter()
        .enumerate()
    {
        let dir = scenario.build(temp.path(), &format!("dir-{idx}"));
        check_directory_structure(&dir, &OsFileSystem).expect("directory accepted");
        assert!(dir.is_dir(), "{scenario:?} leaves a directory behind");
    }
}

#[test]
fn regular_file_is_not_a_directory() {
    let temp = TempDir::new().expect("tempdir");
    let path = DirScenario::RegularFile.build(temp.path(), "journal");
    let err = check_directory_structure(&path, &OsFileSystem).unwrap_err();
    assert_eq!(err, DirectoryError::NotADirectory { path });
}

#[test]
fn legacy_markers_in_parent_reject_the_layout() {
    for scenario in [DirScenario::LegacyLogMarker, DirScenario::LegacyVersionFile] {
        let temp = TempDir::new().expect("tempdir");
        let dir = scenario.build(temp.path(), "ledgers");
        match check_directory_structure(&dir, &OsFileSystem) {
            Err(DirectoryError::OldLayout { parent, marker }) => {
                assert_eq!(parent, temp.path().join("node"));
                assert_eq!(marker.parent(), Some(parent.as_path()));
            }
            other => panic!("{scenario:?}: expected old layout, got {other:?}"),
        }
    }
}

#[test]
fn failed_creation_is_reported_with_path() {
    let temp = TempDir::new().expect("tempdir");
    let dir = DirScenario::Missing.build(temp.path(), "journal");
    let fs = FaultyFileSystem::failing_mkdirs();
    match check_directory_structure(&dir, &fs) {
        Err(DirectoryError::CreateFailed { path, reason }) => {
            assert_eq!(path, dir);
            assert!(reason.contains("mkdirs refused"));
        }
        other => panic!("expected create failure, got {other:?}"),
    }
    assert!(!dir.exists());
}
