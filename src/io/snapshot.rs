//! JSON persistence of the whole ledger state
//!
//! Saves go to a sibling temporary file that is synced and then renamed over
//! the target, so a crash mid-write leaves the previous state intact.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::LedgerSnapshot;
use crate::types::TrustError;

/// Load a snapshot, or `None` if the file does not exist yet
pub fn load_snapshot(path: &Path) -> Result<Option<LedgerSnapshot>, TrustError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(TrustError::Io {
                message: format!("failed to open state '{}': {}", path.display(), e),
            })
        }
    };
    let snapshot = serde_json::from_reader(BufReader::new(file))?;
    debug!(path = %path.display(), "loaded ledger state");
    Ok(Some(snapshot))
}

/// Atomically replace `path` with `snapshot`
pub fn save_snapshot(path: &Path, snapshot: &LedgerSnapshot) -> Result<(), TrustError> {
    let tmp = temp_path(path);
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, snapshot)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "saved ledger state");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
