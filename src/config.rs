use std::path::PathBuf;

/// Which `SortedStore` backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// In-memory map made durable by a write-ahead log under `data_dir`.
    Wal,
    /// Volatile in-memory map.
    Memory,
}

/// Process configuration, read once from `DAYBLOCKS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub store: StoreKind,
    pub max_connections: usize,
    /// Log appends between compactions.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = get("DAYBLOCKS_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5480);
        let bind = get("DAYBLOCKS_BIND").unwrap_or_else(|| "0.0.0.0".into());
        let data_dir = PathBuf::from(get("DAYBLOCKS_DATA_DIR").unwrap_or_else(|| "./data".into()));
        let store = match get("DAYBLOCKS_STORE").as_deref() {
            None | Some("wal") => StoreKind::Wal,
            Some("memory") => StoreKind::Memory,
            Some(other) => {
                return Err(ConfigError(format!(
                    "DAYBLOCKS_STORE must be \"wal\" or \"memory\", got {other:?}"
                )));
            }
        };
        let max_connections = get("DAYBLOCKS_MAX_CONNECTIONS")
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(256);
        let compact_threshold = get("DAYBLOCKS_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let metrics_port = get("DAYBLOCKS_METRICS_PORT").and_then(|s| s.parse().ok());

        Ok(Self {
            bind,
            port,
            data_dir,
            store,
            max_connections,
            compact_threshold,
            metrics_port,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("blocks.wal")
    }
}
