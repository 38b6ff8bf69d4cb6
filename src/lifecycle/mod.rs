//! Directory validation, formatting and shutdown sequencing for storage nodes.

pub mod directories;
pub mod format;
pub mod fs;
pub mod shutdown;

pub use directories::{
    check_directory_structure, DirectoryError, LEGACY_LAYOUT_EXTENSIONS, LEGACY_VERSION_FILE,
};
pub use format::{format, ConfirmPrompt, FormatError, LinePrompt};
pub use fs::{FileSystem, OsFileSystem};
pub use shutdown::ShutdownTrigger;
