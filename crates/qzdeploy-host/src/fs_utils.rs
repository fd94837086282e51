use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

pub(crate) fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}

/// Creates `<tmp>/<prefix>-<pid>-<unix seconds>` for one run's downloads.
pub fn make_run_dir(prefix: &str) -> Result<PathBuf> {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "{}-{}-{}",
        prefix,
        std::process::id(),
        current_unix_timestamp()?
    ));
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed creating run dir: {}", dir.display()))?;
    Ok(dir)
}
