use crate::rules::RuleOptions;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

/// Configuration du moteur, lue depuis un fichier JSON optionnel.
///
/// Tous les champs ont une valeur par défaut ; un fichier partiel suffit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rules: RuleOptions,
    pub server: ServerConfig,
    /// Snapshot JSON ; `None` = moteur purement en mémoire.
    pub data_path: Option<PathBuf>,
    /// Période du balayage complet, 0 pour le désactiver.
    pub sweep_interval_secs: u64,
    /// Jours couverts par le balayage à partir d'hier.
    pub sweep_horizon_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules: RuleOptions::default(),
            server: ServerConfig::default(),
            data_path: None,
            sweep_interval_secs: 300,
            sweep_horizon_days: 28,
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_slice(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.rules.overtime_ratio) || self.rules.overtime_ratio == 0.0 {
            anyhow::bail!("rules.overtime_ratio must be in (0, 1]");
        }
        if self.rules.min_rest_hours > 24 {
            anyhow::bail!("rules.min_rest_hours must be <= 24");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garde.config.json");
        fs::write(&path, r#"{ "rules": { "min_staff": 3 }, "server": { "port": 8088 } }"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.rules.min_staff, 3);
        assert_eq!(config.rules.min_rest_hours, 11);
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.sweep_interval_secs, 300);
    }

    #[test]
    fn rejects_bad_ratio() {
        let mut config = EngineConfig::default();
        config.rules.overtime_ratio = 1.5;
        assert!(config.validate().is_err());
    }
}
