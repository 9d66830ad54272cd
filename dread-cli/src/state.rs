use anyhow::{Context, Result};
use dread_core::Task;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub fn dread_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("DREAD_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".dread"))
}

pub fn ensure_dread_home() -> Result<PathBuf> {
    let dir = dread_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// Tasks still active when the last session ended.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Snapshot {
    pub saved_at_utc: Option<String>,
    pub tasks: Vec<Task>,
}

pub fn snapshot_path() -> Result<PathBuf> {
    Ok(ensure_dread_home()?.join("tasks.json"))
}

pub fn write_snapshot(snapshot: &Snapshot) -> Result<()> {
    write_snapshot_to(&snapshot_path()?, snapshot)
}

pub fn read_snapshot() -> Result<Snapshot> {
    read_snapshot_from(&snapshot_path()?)
}

pub fn write_snapshot_to(p: &Path, snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(p, json).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn read_snapshot_from(p: &Path) -> Result<Snapshot> {
    if !p.exists() {
        return Ok(Snapshot::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_snapshot_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snap = read_snapshot_from(&dir.path().join("tasks.json")).unwrap();
        assert!(snap.tasks.is_empty());
        assert!(snap.saved_at_utc.is_none());
    }
}
