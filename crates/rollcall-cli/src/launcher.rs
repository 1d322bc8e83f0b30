//! Starting the scanner as a child process.
//!
//! The scanner inherits the terminal, so its stop key and Ctrl-C work as
//! if it had been started directly. The dashboard only waits for it.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const SCANNER_BIN: &str = "rollcall-scanner";

/// `ROLLCALL_SCANNER_BIN`, else a `rollcall-scanner` next to this binary,
/// else whatever `PATH` resolves.
pub fn scanner_path() -> PathBuf {
    if let Some(path) = std::env::var_os("ROLLCALL_SCANNER_BIN") {
        return PathBuf::from(path);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(sibling_scanner))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(SCANNER_BIN))
}

fn sibling_scanner(dir: &Path) -> PathBuf {
    dir.join(format!("{SCANNER_BIN}{}", std::env::consts::EXE_SUFFIX))
}

/// Run the scanner against `db_path` and wait for it to exit.
pub async fn run_scanner(scanner: &Path, db_path: &Path) -> Result<()> {
    tracing::info!(scanner = %scanner.display(), db = %db_path.display(), "launching scanner");

    let mut child = Command::new(scanner)
        .env("ROLLCALL_DB_PATH", db_path)
        .spawn()
        .with_context(|| format!("failed to start {}", scanner.display()))?;

    // Ctrl-C reaches the child too; keep waiting so its summary prints
    // before the dashboard exits.
    let finished = tokio::select! {
        status = child.wait() => Some(status),
        _ = tokio::signal::ctrl_c() => None,
    };
    let status = match finished {
        Some(status) => status,
        None => {
            tracing::info!("interrupt received; waiting for scanner to stop");
            child.wait().await
        }
    }
    .context("failed to wait for scanner")?;

    if !status.success() {
        bail!("scanner exited with {status}");
    }
    Ok(())
}
