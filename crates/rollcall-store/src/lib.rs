//! rollcall-store — SQLite persistence shared by the scanner and dashboard.
//!
//! The two processes never share memory; this database is their only
//! point of contact. Every operation opens its own short-lived
//! connection and relies on SQLite locking across processes.

pub mod database;

pub use database::{Database, StoreError};

use std::path::PathBuf;

/// Default database location: `$ROLLCALL_DB_PATH`, else
/// `$XDG_DATA_HOME/rollcall/attendance.db` (falling back to `~/.local/share`).
pub fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("ROLLCALL_DB_PATH") {
        return PathBuf::from(path);
    }

    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("attendance.db")
}
