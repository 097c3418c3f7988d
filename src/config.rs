use std::path::Path;

use anyhow::Context;

use crate::ranking::Weights;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_connections = match lookup("PLACEMENT_DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| {
                    format!("PLACEMENT_DB_MAX_CONNECTIONS must be a positive integer, got '{raw}'")
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Settings {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections,
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance (or pass --dataset)")
    }
}

/// Reads a JSON object of component weights. Components left out weigh 0.
pub fn load_weights(path: &Path) -> anyhow::Result<Weights> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read weights {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse weights {}", path.display()))?;
    let weights = Weights::from_json(&value)
        .with_context(|| format!("invalid weights in {}", path.display()))?;
    tracing::debug!(path = %path.display(), ?weights, "loaded ranking weights");
    Ok(weights)
}
