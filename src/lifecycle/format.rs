use super::fs::FileSystem;
use crate::config::{DirGroup, ServerConfig};
use log::{error, info, warn};
use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("{0} directories are not configured")]
    MissingDirectories(DirGroup),
    #[error("confirmation prompt failed: {0}")]
    Prompt(#[from] io::Error),
}

/// Source of yes/no answers for interactive formatting.
pub trait ConfirmPrompt {
    fn confirm(&mut self, question: &str) -> io::Result<bool>;
}

/// Reads `Y`/`N` tokens line by line, asking again on anything else.
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> ConfirmPrompt for LinePrompt<R, W> {
    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        loop {
            write!(self.output, "{question} (Y or N) ")?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "no answer before end of input",
                ));
            }
            match line.trim() {
                "Y" | "y" | "yes" => return Ok(true),
                "N" | "n" | "no" => return Ok(false),
                _ => continue,
            }
        }
    }
}

/// Wipes every configured journal, ledger and index directory.
///
/// All groups holding data are confirmed before anything is deleted, so a
/// refusal leaves the disk untouched. Returns `Ok(false)` when the operator
/// declines, when a non-interactive run lacks `force`, or when any child
/// cannot be removed.
pub fn format(
    config: &ServerConfig,
    interactive: bool,
    force: bool,
    prompt: &mut dyn ConfirmPrompt,
    fs: &dyn FileSystem,
) -> Result<bool, FormatError> {
    let groups = resolve_groups(config)?;

    for (group, dirs) in &groups {
        let has_data = dirs.iter().any(|dir| holds_data(dir, fs));
        if !has_data {
            continue;
        }
        let confirmed = if force {
            true
        } else if interactive {
            prompt.confirm(&format!(
                "Are you sure to format {group} directories {dirs:?}?"
            ))?
        } else {
            false
        };
        if !confirmed {
            warn!("event=format_aborted group={} interactive={}", group, interactive);
            return Ok(false);
        }
    }

    for (group, dirs) in &groups {
        for dir in dirs {
            if !clean_dir(dir, fs) {
                error!(
                    "event=format_failed group={} path={}",
                    group,
                    dir.display()
                );
                return Ok(false);
            }
        }
    }
    info!("event=format_complete groups={}", groups.len());
    Ok(true)
}

fn resolve_groups(config: &ServerConfig) -> Result<Vec<(DirGroup, Vec<PathBuf>)>, FormatError> {
    let mut seen = HashSet::new();
    let mut groups = Vec::new();
    for group in [DirGroup::Journal, DirGroup::Ledger, DirGroup::Index] {
        let dirs = config
            .dirs(group)
            .ok_or(FormatError::MissingDirectories(group))?;
        let unique: Vec<PathBuf> = dirs
            .iter()
            .filter(|dir| seen.insert((*dir).clone()))
            .cloned()
            .collect();
        groups.push((group, unique));
    }
    Ok(groups)
}

fn holds_data(dir: &Path, fs: &dyn FileSystem) -> bool {
    fs.is_dir(dir)
        && fs
            .list(dir)
            .map(|children| !children.is_empty())
            .unwrap_or(true)
}

fn clean_dir(dir: &Path, fs: &dyn FileSystem) -> bool {
    if !fs.exists(dir) {
        return true;
    }
    let children = match fs.list(dir) {
        Ok(children) => children,
        Err(err) => {
            error!("event=format_list_failed path={} error={}", dir.display(), err);
            return false;
        }
    };
    for child in children {
        if let Err(err) = fs.remove(&child) {
            error!(
                "event=format_delete_failed path={} error={}",
                child.display(),
                err
            );
            return false;
        }
    }
    true
}
