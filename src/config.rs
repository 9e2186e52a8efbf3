use anyhow::Result;
use arena_core::NetConfig;
use arena_physics::{Aabb, CastConfig, DashConfig, MovementConfig, SimContext};
use arena_testkit::{LinkConfig, ScenarioConfig};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/arena.toml";

/// Everything a headless run reads from disk.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub net: NetConfig,
    pub link: LinkConfig,
    pub arena: ArenaConfig,
    pub scenario: ScenarioConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Half the side of the square arena; `0` leaves it unbounded.
    pub half_extent: f32,
    pub movement: MovementConfig,
    pub dash: DashConfig,
    pub cast: CastConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            half_extent: 40.0,
            movement: MovementConfig::default(),
            dash: DashConfig::default(),
            cast: CastConfig::default(),
        }
    }
}

impl ArenaConfig {
    pub fn sim_context(&self) -> SimContext {
        SimContext {
            movement: self.movement,
            dash: self.dash,
            cast: self.cast,
            bounds: (self.half_extent > 0.0).then(|| Aabb::square_arena(self.half_extent)),
        }
    }
}

impl SessionConfig {
    /// Load configuration from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<SessionConfig>(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    SessionConfig::default()
                }
            },
            Err(err) => {
                if path != Path::new(DEFAULT_CONFIG_PATH)
                    || err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                } else {
                    warn!(
                        "Session config not found at {}. Using defaults",
                        path.display()
                    );
                }
                SessionConfig::default()
            }
        }
    }

    /// Save session configuration to an explicit path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        Ok(())
    }

    /// Check every section, naming the first bad one.
    pub fn verify(&self) -> Result<()> {
        self.net
            .verify()
            .map_err(|err| anyhow::anyhow!("[net] {err}"))?;
        self.link
            .verify()
            .map_err(|err| anyhow::anyhow!("[link] {err}"))?;
        self.scenario
            .verify()
            .map_err(|err| anyhow::anyhow!("[scenario] {err}"))?;
        if !self.arena.half_extent.is_finite() || self.arena.half_extent < 0.0 {
            anyhow::bail!("[arena] half_extent must be finite and non-negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::RedundancyPolicy;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.toml");
        fs::write(
            &path,
            "[net]\nhost_redundancy = \"ack_window\"\n\n[link]\nloss = 0.2\n\n[scenario]\nclients = 3\n",
        )
        .unwrap();

        let cfg = SessionConfig::load_from_path(&path);
        assert_eq!(cfg.link.loss, 0.2);
        assert_eq!(cfg.link.latency_ticks, LinkConfig::default().latency_ticks);
        assert_eq!(cfg.scenario.clients, 3);
        assert_eq!(cfg.net.host_redundancy, RedundancyPolicy::AckWindow);
        assert_eq!(cfg.net.buffer_size, 1024);
        assert!(cfg.verify().is_ok());
    }

    #[test]
    fn malformed_or_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[link\nloss = ").unwrap();
        assert_eq!(
            SessionConfig::load_from_path(&path).scenario,
            ScenarioConfig::default()
        );
        let missing = SessionConfig::load_from_path(&dir.path().join("missing.toml"));
        assert_eq!(missing.link, LinkConfig::default());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/arena.toml");
        let mut cfg = SessionConfig::default();
        cfg.arena.half_extent = 0.0;
        cfg.link.seed = 99;
        cfg.save_to_path(&path).unwrap();

        let loaded = SessionConfig::load_from_path(&path);
        assert_eq!(loaded.link.seed, 99);
        assert_eq!(loaded.arena, cfg.arena);
        assert!(loaded.arena.sim_context().bounds.is_none());
    }

    #[test]
    fn verify_names_the_bad_section() {
        let mut cfg = SessionConfig::default();
        cfg.link.loss = 2.0;
        let err = cfg.verify().unwrap_err().to_string();
        assert!(err.starts_with("[link]"), "{err}");
    }
}
