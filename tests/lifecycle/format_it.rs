use crate::dir_scenario::DirScenario;
use crate::faulty_fs::FaultyFileSystem;
use ledgerstore::config::{DirGroup, ServerConfig};
use ledgerstore::lifecycle::{format, ConfirmPrompt, FormatError, LinePrompt, OsFileSystem};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct NodeDirs {
    _temp: TempDir,
    journal: PathBuf,
    ledgers: PathBuf,
    config: ServerConfig,
}

fn populated() -> NodeDirs {
    let temp = TempDir::new().expect("tempdir");
    let journal = DirScenario::WithData.build(temp.path(), "journal");
    let ledgers = DirScenario::WithData.build(temp.path(), "ledgers");
    let config = ServerConfig {
        journal_dirs: Some(vec![journal.clone()]),
        ledger_dirs: Some(vec![ledgers.clone()]),
        ..ServerConfig::default()
    };
    NodeDirs {
        _temp: temp,
        journal,
        ledgers,
        config,
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    dir.is_dir() && std::fs::read_dir(dir).expect("read dir").next().is_none()
}

/// Prompt that must never be consulted.
struct NoPrompt;

impl ConfirmPrompt for NoPrompt {
    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        panic!("unexpected prompt: {question}");
    }
}

#[test]
fn interactive_yes_wipes_every_group() {
    let dirs = populated();
    let mut shown = Vec::new();
    let mut prompt = LinePrompt::new(Cursor::new("Y\nY\n"), &mut shown);
    let formatted = format(&dirs.config, true, false, &mut prompt, &OsFileSystem).expect("format");
    assert!(formatted);
    assert!(is_empty_dir(&dirs.journal));
    assert!(is_empty_dir(&dirs.ledgers));
    let shown = String::from_utf8(shown).expect("utf8");
    assert!(shown.contains("journal directories"));
    assert!(shown.contains("ledger directories"));
}

#[test]
fn interactive_no_leaves_data_untouched() {
    let dirs = populated();
    let mut prompt = LinePrompt::new(Cursor::new("Y\nN\n"), io::sink());
    let formatted = format(&dirs.config, true, false, &mut prompt, &OsFileSystem).expect("format");
    assert!(!formatted);
    assert!(dirs.journal.join("data.bin").exists());
    assert!(dirs.ledgers.join("nested/more.bin").exists());
}

#[test]
fn prompt_eof_surfaces_as_error() {
    let dirs = populated();
    let mut prompt = LinePrompt::new(Cursor::new(""), io::sink());
    let err = format(&dirs.config, true, false, &mut prompt, &OsFileSystem).unwrap_err();
    assert!(matches!(err, FormatError::Prompt(ref source) if source.kind() == io::ErrorKind::UnexpectedEof));
    assert!(dirs.journal.join("data.bin").exists());
}

#[test]
fn non_interactive_without_force_refuses() {
    let dirs = populated();
    let formatted = format(&dirs.config, false, false, &mut NoPrompt, &OsFileSystem).expect("format");
    assert!(!formatted);
    assert!(dirs.journal.join("data.bin").exists());
}

#[test]
fn force_formats_repeatedly() {
    let dirs = populated();
    assert!(format(&dirs.config, false, true, &mut NoPrompt, &OsFileSystem).expect("first"));
    assert!(is_empty_dir(&dirs.journal));
    assert!(format(&dirs.config, false, true, &mut NoPrompt, &OsFileSystem).expect("second"));
    assert!(is_empty_dir(&dirs.ledgers));
}

#[test]
fn empty_dirs_need_no_confirmation() {
    let temp = TempDir::new().expect("tempdir");
    let config = ServerConfig::with_base_dir(temp.path());
    assert!(format(&config, true, false, &mut NoPrompt, &OsFileSystem).expect("format"));
}

#[test]
fn undeletable_child_fails_the_format() {
    let dirs = populated();
    let fs = FaultyFileSystem::new();
    fs.protect(dirs.journal.join("data.bin"));
    let formatted = format(&dirs.config, false, true, &mut NoPrompt, &fs).expect("format");
    assert!(!formatted);
    assert!(dirs.journal.join("data.bin").exists());
}

#[test]
fn unset_group_is_a_configuration_error() {
    let temp = TempDir::new().expect("tempdir");
    let config = ServerConfig {
        ledger_dirs: Some(vec![temp.path().join("ledgers")]),
        ..ServerConfig::default()
    };
    match format(&config, false, true, &mut NoPrompt, &OsFileSystem) {
        Err(FormatError::MissingDirectories(group)) => assert_eq!(group, DirGroup::Journal),
        other => panic!("expected missing journal dirs, got {other:?}"),
    }
}
