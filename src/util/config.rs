use std::path::{Path, PathBuf};

/// If `path` is relative, joins it to `base`; otherwise returns it unchanged.
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Base directory used to resolve relative paths found in a config file.
pub fn config_base_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolves every directory in a configured group against `base`.
pub fn resolve_dir_group(base: &Path, dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter().map(|dir| resolve_relative(base, dir)).collect()
}
