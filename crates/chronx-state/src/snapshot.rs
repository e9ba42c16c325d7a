//! Disk-level snapshot/revert over a sled directory tree.
//!
//! Used for both of the node's persisted directories (`db/`, `state_db/`):
//! every `snapshot_interval` periods a full copy is taken as a sibling
//! `<name><period>/` directory; `revert_to` swaps the live directory for one
//! of those copies and discards anything newer.

use std::fs;
use std::path::{Path, PathBuf};

use chronx_core::error::ChronxError;
use chronx_core::types::Period;

fn io_err(e: std::io::Error) -> ChronxError {
    ChronxError::Storage(e.to_string())
}

fn snapshot_path(live_dir: &Path, period: Period) -> PathBuf {
    let mut name = live_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(period.to_string());
    live_dir.with_file_name(name)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), ChronxError> {
    fs::create_dir_all(dst).map_err(io_err)?;
    for entry in fs::read_dir(src).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if entry.file_type().map_err(io_err)?.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(io_err)?;
        }
    }
    Ok(())
}

/// Take a consistent disk copy of `live_dir` as snapshot `period`, then
/// delete the oldest snapshots beyond `max_snapshots`. Callers must flush
/// the live store before calling this so the copy is consistent.
pub fn take_snapshot(
    live_dir: &Path,
    period: Period,
    existing_periods: &[Period],
    max_snapshots: usize,
) -> Result<(), ChronxError> {
    let dest = snapshot_path(live_dir, period);
    if dest.exists() {
        fs::remove_dir_all(&dest).map_err(io_err)?;
    }
    copy_dir_recursive(live_dir, &dest)?;

    let mut periods: Vec<Period> = existing_periods.to_vec();
    periods.push(period);
    periods.sort_unstable();
    periods.dedup();
    while periods.len() > max_snapshots {
        let oldest = periods.remove(0);
        let path = snapshot_path(live_dir, oldest);
        if path.exists() {
            fs::remove_dir_all(&path).map_err(io_err)?;
        }
    }
    Ok(())
}

/// Replace `live_dir` with snapshot `period`'s directory and delete every
/// snapshot newer than `period`. The caller must have closed the sled
/// handle on `live_dir` before calling this.
pub fn revert_to(
    live_dir: &Path,
    period: Period,
    existing_periods: &[Period],
) -> Result<(), ChronxError> {
    let source = snapshot_path(live_dir, period);
    if !source.exists() {
        return Err(ChronxError::Storage(format!(
            "no snapshot for period {period} at {}",
            source.display()
        )));
    }
    if live_dir.exists() {
        fs::remove_dir_all(live_dir).map_err(io_err)?;
    }
    copy_dir_recursive(&source, live_dir)?;

    for &p in existing_periods {
        if p > period {
            let stale = snapshot_path(live_dir, p);
            if stale.exists() {
                fs::remove_dir_all(&stale).map_err(io_err)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chronx_snapshot_test_{}", name));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn snapshot_then_revert_restores_file_contents() {
        let live = scratch_dir("live_a");
        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("data.bin"), b"period-1-data").unwrap();
        take_snapshot(&live, 1, &[], 4).unwrap();

        fs::write(live.join("data.bin"), b"period-2-data").unwrap();
        assert_eq!(fs::read(live.join("data.bin")).unwrap(), b"period-2-data");

        revert_to(&live, 1, &[1]).unwrap();
        assert_eq!(fs::read(live.join("data.bin")).unwrap(), b"period-1-data");
    }

    #[test]
    fn old_snapshots_beyond_max_are_pruned() {
        let live = scratch_dir("live_b");
        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("data.bin"), b"v").unwrap();

        take_snapshot(&live, 1, &[], 2).unwrap();
        take_snapshot(&live, 2, &[1], 2).unwrap();
        take_snapshot(&live, 3, &[1, 2], 2).unwrap();

        assert!(!snapshot_path(&live, 1).exists(), "oldest snapshot must be pruned");
        assert!(snapshot_path(&live, 2).exists());
        assert!(snapshot_path(&live, 3).exists());
    }
}
