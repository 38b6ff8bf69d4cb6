//! Miscellaneous shared helpers (completions, config paths, errors).

pub mod completion;
pub mod config;
pub mod error;

pub use completion::{Cancelled, Completion};
pub use config::{config_base_dir, resolve_dir_group, resolve_relative};
pub use error::{LedgerStoreError, Result};
