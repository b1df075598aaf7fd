use crate::conflict::Conflict;
use crate::model::{Bureau, Employee, Shift};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// État complet persisté : registres, shifts et conflits (y compris écartés).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub bureaus: Vec<Bureau>,
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub shifts: Vec<Shift>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
}

pub trait Storage: Send + Sync {
    /// Charge un snapshot ; `Ok(None)` si rien n'a encore été sauvegardé.
    fn load(&self) -> anyhow::Result<Option<Snapshot>>;
    /// Sauvegarde de manière atomique.
    fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()>;
}

pub struct JsonStorage {
    path: PathBuf,
}

impl JsonStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self { path: path.as_ref().to_path_buf() })
    }
}

impl Storage for JsonStorage {
    fn load(&self) -> anyhow::Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path).with_context(|| format!("reading {}", self.path.display()))?;
        let snapshot: Snapshot = serde_json::from_slice(&data)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).with_context(|| "creating temp file")?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).with_context(|| "atomic rename")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BureauId;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::open(dir.path().join("garde.json")).unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::open(dir.path().join("garde.json")).unwrap();
        let snapshot = Snapshot {
            bureaus: vec![Bureau::new("milan", "Milan")],
            employees: vec![Employee::new(
                "Marco Rossi",
                BureauId::new("milan"),
                crate::model::Role::Lead,
                48,
            )],
            ..Default::default()
        };
        storage.save(&snapshot).unwrap();
        assert_eq!(storage.load().unwrap(), Some(snapshot));
    }
}
