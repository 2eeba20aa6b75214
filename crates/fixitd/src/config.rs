//! Service configuration: TOML file, then `FIXIT_*` environment, then CLI flags

use std::path::{Path, PathBuf};

use clap::Parser;
use fixit_engine::{
    Actor, Category, ConfigError, EngineConfig, Role, StaticDirectory, StoreError,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Engine config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// RocksDB directory for tickets and the audit trail; in-memory when omitted
    #[arg(long)]
    pub state_path: Option<PathBuf>,

    /// Seconds between SLA sweeps
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// Staff directory seed file (TOML)
    #[arg(long)]
    pub actors: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid actors file {path}: {source}")]
    Actors {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("--state-path {0} needs the heavy-state feature")]
    DurableStoreDisabled(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub engine: EngineConfig,
    pub state_path: Option<PathBuf>,
    pub actors_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Resolve from args and the process environment
    pub fn load(args: &Args) -> Result<Self, ServiceError> {
        Self::resolve(args, |key| std::env::var(key).ok())
    }

    /// Resolve from args and an arbitrary env-shaped lookup
    pub fn resolve<F>(args: &Args, lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = args
            .config
            .clone()
            .or_else(|| lookup("FIXIT_CONFIG").map(PathBuf::from));
        let mut engine = match config_path {
            Some(path) => EngineConfig::from_file(&path)?,
            None => EngineConfig::default(),
        };
        engine.apply_overrides(&lookup)?;

        if let Some(secs) = args.sweep_interval_secs {
            engine.sweep_interval_secs = secs;
        }
        engine.validate()?;

        Ok(Self {
            engine,
            state_path: args
                .state_path
                .clone()
                .or_else(|| lookup("FIXIT_STATE_PATH").map(PathBuf::from)),
            actors_path: args
                .actors
                .clone()
                .or_else(|| lookup("FIXIT_ACTORS").map(PathBuf::from)),
        })
    }
}

/// One staff member in the seed file
#[derive(Debug, Clone, Deserialize)]
struct ActorEntry {
    user_id: String,
    role: Role,
    #[serde(default)]
    assigned_blocks: Vec<u8>,
    #[serde(default)]
    category: Option<Category>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    actors: Vec<ActorEntry>,
}

impl From<ActorEntry> for Actor {
    fn from(entry: ActorEntry) -> Self {
        Actor {
            user_id: entry.user_id,
            role: entry.role,
            assigned_blocks: entry.assigned_blocks,
            category: entry.category,
            active: entry.active,
        }
    }
}

/// Parse a seed file body into actors
///
/// ```toml
/// [[actors]]
/// user_id = "c-12"
/// role = "coordinator"
/// assigned_blocks = [12, 14]
///
/// [[actors]]
/// user_id = "f-7"
/// role = "fixer"
/// category = "electrical"
/// ```
pub fn parse_actors(raw: &str) -> Result<Vec<Actor>, toml::de::Error> {
    let seed: SeedFile = toml::from_str(raw)?;
    Ok(seed.actors.into_iter().map(Actor::from).collect())
}

/// Build the in-process directory from a seed file
pub fn load_directory(path: &Path) -> Result<StaticDirectory, ServiceError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ServiceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let actors = parse_actors(&raw).map_err(|source| ServiceError::Actors {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(StaticDirectory::from_actors(actors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_layering() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fixit.toml");
        std::fs::write(&file, "duplicate_threshold = 0.8\nsweep_interval_secs = 120\n").unwrap();

        let env: HashMap<&str, &str> = [
            ("FIXIT_SWEEP_INTERVAL_SECS", "60"),
            ("FIXIT_STATE_PATH", "/var/lib/fixit"),
        ]
        .into_iter()
        .collect();
        let args = Args {
            config: Some(file),
            sweep_interval_secs: Some(30),
            ..Args::default()
        };

        let config = ServiceConfig::resolve(&args, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.engine.duplicate_threshold, 0.8);
        assert_eq!(config.engine.sweep_interval_secs, 30);
        assert_eq!(config.state_path, Some(PathBuf::from("/var/lib/fixit")));
        assert!(config.actors_path.is_none());
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = ServiceConfig::resolve(&Args::default(), |_| None).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.state_path.is_none());
    }

    #[test]
    fn test_missing_config_file() {
        let args = Args {
            config: Some(PathBuf::from("/nonexistent/fixit.toml")),
            ..Args::default()
        };
        assert!(matches!(
            ServiceConfig::resolve(&args, |_| None),
            Err(ServiceError::Config(ConfigError::Io(_)))
        ));
    }

    #[test]
    fn test_cli_flags() {
        let args = Args::parse_from([
            "fixitd",
            "--state-path",
            "/tmp/fixit",
            "--sweep-interval-secs",
            "15",
        ]);
        assert_eq!(args.state_path, Some(PathBuf::from("/tmp/fixit")));
        assert_eq!(args.sweep_interval_secs, Some(15));
    }

    #[test]
    fn test_parse_actors() {
        let actors = parse_actors(
            r#"
            [[actors]]
            user_id = "c-12"
            role = "coordinator"
            assigned_blocks = [12, 14]

            [[actors]]
            user_id = "f-7"
            role = "fixer"
            category = "electrical"
            active = false
            "#,
        )
        .unwrap();

        assert_eq!(actors.len(), 2);
        assert_eq!(actors[0].role, Role::Coordinator);
        assert_eq!(actors[0].assigned_blocks, vec![12, 14]);
        assert!(actors[0].active);
        assert_eq!(actors[1].category, Some(Category::Electrical));
        assert!(!actors[1].active);

        assert!(parse_actors("[[actors]]\nuser_id = \"x\"\nrole = \"janitor\"\n").is_err());
    }
}
