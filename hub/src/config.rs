use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, guardian::GuardianStyle, threat::ThreatLevel};

const DEFAULT_SPAWN_FACTOR: usize = 3;
const DEFAULT_MAX_GUARDIANS: usize = 27;
const DEFAULT_GUARDIAN_BUDGET_MS: u64 = 250;
const DEFAULT_CALL_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_MAX_INPUT_BYTES: usize = 64 * 1024;

/// Settings consumed by the hub. Every value is injected; nothing is read implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubConfig {
    /// Guardians spawned per growth trigger.
    pub spawn_factor: usize,
    /// Pool cap; reaching it halts the hub.
    pub max_guardians: usize,
    /// Highest aggregated level still reported as safe.
    pub safe_threshold: ThreatLevel,
    /// Time budget of one guardian evaluation, in milliseconds.
    pub guardian_budget_ms: u64,
    /// Upper bound for a whole `analyze` call, in milliseconds.
    pub call_timeout_ms: u64,
    /// Inputs longer than this are rejected by every guardian.
    pub max_input_bytes: usize,
    /// Seed for spawn style selection; entropy when absent.
    pub seed: Option<u64>,
    /// When false, growth triggers are counted but nothing is spawned.
    pub auto_grow: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            spawn_factor: DEFAULT_SPAWN_FACTOR,
            max_guardians: DEFAULT_MAX_GUARDIANS,
            safe_threshold: ThreatLevel::Low,
            guardian_budget_ms: DEFAULT_GUARDIAN_BUDGET_MS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            seed: None,
            auto_grow: true,
        }
    }
}

impl HubConfig {
    /// Loads a TOML file; missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `CERBERUS_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup (the environment in production).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup("CERBERUS_SPAWN_FACTOR") {
            self.spawn_factor = parse_override("CERBERUS_SPAWN_FACTOR", &raw)?;
        }
        if let Some(raw) = lookup("CERBERUS_MAX_GUARDIANS") {
            self.max_guardians = parse_override("CERBERUS_MAX_GUARDIANS", &raw)?;
        }
        if let Some(raw) = lookup("CERBERUS_SAFE_THRESHOLD") {
            self.safe_threshold = raw.parse().map_err(|_| invalid("CERBERUS_SAFE_THRESHOLD", &raw))?;
        }
        if let Some(raw) = lookup("CERBERUS_GUARDIAN_BUDGET_MS") {
            self.guardian_budget_ms = parse_override("CERBERUS_GUARDIAN_BUDGET_MS", &raw)?;
        }
        if let Some(raw) = lookup("CERBERUS_CALL_TIMEOUT_MS") {
            self.call_timeout_ms = parse_override("CERBERUS_CALL_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("CERBERUS_MAX_INPUT_BYTES") {
            self.max_input_bytes = parse_override("CERBERUS_MAX_INPUT_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("CERBERUS_SEED") {
            self.seed = Some(parse_override("CERBERUS_SEED", &raw)?);
        }
        if let Some(raw) = lookup("CERBERUS_AUTO_GROW") {
            self.auto_grow = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid("CERBERUS_AUTO_GROW", &raw)),
            };
        }
        Ok(self)
    }

    /// Rejects configurations the pool state machine cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spawn_factor < 1 {
            return Err(ConfigError::SpawnFactorTooSmall);
        }
        if self.max_guardians < self.spawn_factor {
            return Err(ConfigError::CapacityBelowSpawnFactor {
                max: self.max_guardians,
                spawn_factor: self.spawn_factor,
            });
        }
        let seed = GuardianStyle::ALL.len();
        if self.max_guardians < seed {
            return Err(ConfigError::CapacityBelowSeed {
                max: self.max_guardians,
                seed,
            });
        }
        if self.guardian_budget_ms == 0 {
            return Err(ConfigError::ZeroBudget("guardian budget"));
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::ZeroBudget("call timeout"));
        }
        if self.max_input_bytes == 0 {
            return Err(ConfigError::ZeroInputLimit);
        }
        Ok(())
    }

    /// Per-guardian budget.
    #[must_use]
    pub const fn guardian_budget(&self) -> Duration {
        Duration::from_millis(self.guardian_budget_ms)
    }

    /// Whole-call budget.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Deadline applied to each guardian of a call. Guardians run concurrently, so the
    /// call finishes within this bound as well.
    #[must_use]
    pub fn evaluation_limit(&self) -> Duration {
        self.guardian_budget().min(self.call_timeout())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| invalid(key, raw))
}

fn invalid(key: &str, raw: &str) -> ConfigError {
    ConfigError::InvalidOverride {
        key: key.into(),
        value: raw.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::tempdir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = HubConfig::default();
        assert_eq!(config.spawn_factor, 3);
        assert_eq!(config.max_guardians, 27);
        assert_eq!(config.safe_threshold, ThreatLevel::Low);
        assert!(config.auto_grow);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_spawn_factor() {
        let config = HubConfig {
            spawn_factor: 0,
            ..HubConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SpawnFactorTooSmall)
        ));
    }

    #[test]
    fn rejects_cap_below_spawn_factor() {
        let config = HubConfig {
            spawn_factor: 5,
            max_guardians: 4,
            ..HubConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityBelowSpawnFactor { max: 4, spawn_factor: 5 })
        ));
    }

    #[test]
    fn rejects_cap_below_seed_set() {
        let config = HubConfig {
            spawn_factor: 1,
            max_guardians: 2,
            ..HubConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityBelowSeed { max: 2, seed: 3 })
        ));
    }

    #[test]
    fn rejects_zero_budgets() {
        let config = HubConfig {
            guardian_budget_ms: 0,
            ..HubConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroBudget(_))));
        let config = HubConfig {
            max_input_bytes: 0,
            ..HubConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInputLimit)));
    }

    #[test]
    fn overrides_replace_values() {
        let config = HubConfig::default()
            .with_overrides(lookup(&[
                ("CERBERUS_SPAWN_FACTOR", "2"),
                ("CERBERUS_MAX_GUARDIANS", "9"),
                ("CERBERUS_SAFE_THRESHOLD", "medium"),
                ("CERBERUS_SEED", "42"),
                ("CERBERUS_AUTO_GROW", "off"),
            ]))
            .unwrap();
        assert_eq!(config.spawn_factor, 2);
        assert_eq!(config.max_guardians, 9);
        assert_eq!(config.safe_threshold, ThreatLevel::Medium);
        assert_eq!(config.seed, Some(42));
        assert!(!config.auto_grow);
    }

    #[test]
    fn malformed_override_is_reported_with_key() {
        let err = HubConfig::default()
            .with_overrides(lookup(&[("CERBERUS_MAX_GUARDIANS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("CERBERUS_MAX_GUARDIANS"));
    }

    #[test]
    fn loads_partial_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        fs::write(&path, "max_guardians = 12\nsafe_threshold = \"none\"\nseed = 7\n").unwrap();
        let config = HubConfig::load(&path).unwrap();
        assert_eq!(config.max_guardians, 12);
        assert_eq!(config.safe_threshold, ThreatLevel::None);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.spawn_factor, 3);
    }

    #[test]
    fn unknown_toml_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        fs::write(&path, "max_guardian = 12\n").unwrap();
        assert!(matches!(
            HubConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn evaluation_limit_is_the_tighter_budget() {
        let config = HubConfig {
            guardian_budget_ms: 500,
            call_timeout_ms: 200,
            ..HubConfig::default()
        };
        assert_eq!(config.evaluation_limit(), Duration::from_millis(200));
    }
}
