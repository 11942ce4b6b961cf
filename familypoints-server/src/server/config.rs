use familypoints_shared::domain::{self, ActivityId, TierId, now_utc};
use familypoints_shared::{
    TierMode, ValidationError, validate_activity, validate_tier, validate_tier_partition,
};
use serde::Deserialize;
use std::{env, fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Catalog entries upserted on startup.
    #[serde(default)]
    pub activities: Vec<ActivitySeed>,
    /// Tiers upserted on startup.
    #[serde(default)]
    pub tiers: Vec<TierSeed>,
    #[serde(default)]
    pub tier_mode: TierMode,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivitySeed {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub points: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TierSeed {
    pub id: String,
    pub name: String,
    pub min_points: i32,
    pub max_points: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid {section} entry {id:?}: {source}")]
    Invalid {
        section: &'static str,
        id: String,
        source: ValidationError,
    },
    #[error("invalid tiers: {0}")]
    Tiers(ValidationError),
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        Ok(cfg)
    }

    pub fn seed_activities(&self) -> Vec<domain::Activity> {
        let created_at = now_utc();
        self.activities
            .iter()
            .map(|a| domain::Activity {
                id: ActivityId::from(a.id.as_str()),
                name: a.name.clone(),
                description: a.description.clone(),
                points: a.points,
                created_at,
            })
            .collect()
    }

    pub fn seed_tiers(&self) -> Vec<domain::Tier> {
        let created_at = now_utc();
        self.tiers
            .iter()
            .map(|t| domain::Tier {
                id: TierId::from(t.id.as_str()),
                name: t.name.clone(),
                min_points: t.min_points,
                max_points: t.max_points,
                created_at,
            })
            .collect()
    }

    /// Runs the record validators over the seed catalog and tiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for a in self.seed_activities() {
            validate_activity(&a).map_err(|source| ConfigError::Invalid {
                section: "activities",
                id: a.id.to_string(),
                source,
            })?;
        }
        let tiers = self.seed_tiers();
        for t in &tiers {
            validate_tier(t).map_err(|source| ConfigError::Invalid {
                section: "tiers",
                id: t.id.to_string(),
                source,
            })?;
        }
        validate_tier_partition(&tiers).map_err(ConfigError::Tiers)
    }
}
