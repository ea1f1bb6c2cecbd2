use serde::Deserialize;
use std::{fs, io, time::Duration};

use consumption_store::db::{effective_batch_size, DEFAULT_BATCH_SIZE};
use url::Url;

use crate::octopus::{DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};

pub const MAX_MPAN_LEN: usize = 13;
pub const MAX_SERIAL_LEN: usize = 50;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("{field} must be at most {max} characters, got {len}")]
    TooLong {
        field: &'static str,
        max: usize,
        len: usize,
    },
    #[error("invalid {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

/// On-disk shape. Every key is optional so the environment can fill the rest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    octopus: OctopusFile,
    database: DatabaseFile,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OctopusFile {
    api_key: Option<String>,
    mpan: Option<String>,
    serial: Option<String>,
    base_url: Option<String>,
    page_size: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DatabaseFile {
    uri: Option<String>,
    max_connections: Option<u32>,
    batch_size: Option<usize>,
}

#[derive(Clone)]
pub struct OctopusConfig {
    pub api_key: String,
    pub mpan: String,
    pub serial: String,
    pub base_url: String,
    pub page_size: u32,
    pub timeout: Duration,
}

impl std::fmt::Debug for OctopusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctopusConfig")
            .field("api_key", &"<redacted>")
            .field("mpan", &self.mpan)
            .field("serial", &self.serial)
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub octopus: OctopusConfig,
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load from `$OCTO_SYNC_CONFIG` (default `octo-sync.toml`) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(read_file_config()?, |key: &str| std::env::var(key).ok())
    }

    /// Load the database section only; the API settings are not required.
    pub fn load_database() -> Result<DatabaseConfig, ConfigError> {
        resolve_database(read_file_config()?.database, &|key: &str| {
            std::env::var(key).ok()
        })
    }

    /// Parse TOML text and apply overrides from `env`.
    pub fn from_toml<F>(contents: &str, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        Self::resolve(file, env)
    }

    fn resolve<F>(file: FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());
        let o = file.octopus;

        let api_key = env("OCTOPUS_API_KEY")
            .or(o.api_key)
            .ok_or(ConfigError::Missing("OCTOPUS_API_KEY"))?;
        let mpan = env("OCTOPUS_ELECTRICITY_MPAN")
            .or(o.mpan)
            .ok_or(ConfigError::Missing("OCTOPUS_ELECTRICITY_MPAN"))?;
        let serial = env("OCTOPUS_ELECTRICITY_SN")
            .or(o.serial)
            .ok_or(ConfigError::Missing("OCTOPUS_ELECTRICITY_SN"))?;

        check_len("OCTOPUS_ELECTRICITY_MPAN", &mpan, MAX_MPAN_LEN)?;
        check_len("OCTOPUS_ELECTRICITY_SN", &serial, MAX_SERIAL_LEN)?;

        let page_size = o.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "octopus.page_size",
                value: page_size.to_string(),
            });
        }

        let octopus = OctopusConfig {
            api_key,
            mpan,
            serial,
            base_url: o.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            page_size,
            timeout: Duration::from_secs(o.timeout_secs.unwrap_or(30)),
        };
        let database = resolve_database(file.database, &env)?;

        Ok(Self { octopus, database })
    }
}

/// The config file is optional; a missing file yields empty sections.
fn read_file_config() -> Result<FileConfig, ConfigError> {
    let path =
        std::env::var("OCTO_SYNC_CONFIG").unwrap_or_else(|_| "octo-sync.toml".to_string());
    match fs::read_to_string(&path) {
        Ok(contents) => {
            toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path, "no config file, using environment only");
            Ok(FileConfig::default())
        }
        Err(source) => Err(ConfigError::Read { path, source }),
    }
}

fn resolve_database<F>(d: DatabaseFile, env: &F) -> Result<DatabaseConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let uri = match env("DATABASE_URL").or(d.uri) {
        Some(uri) => uri,
        None => postgres_uri(
            &env("POSTGRES_HOST").unwrap_or_else(|| "localhost".to_string()),
            &env("POSTGRES_PORT").unwrap_or_else(|| "5432".to_string()),
            &env("POSTGRES_USER").unwrap_or_else(|| "octopus".to_string()),
            &env("POSTGRES_PASSWORD").unwrap_or_else(|| "octopus".to_string()),
            &env("POSTGRES_DB").unwrap_or_else(|| "octopus_energy".to_string()),
        )?,
    };

    Ok(DatabaseConfig {
        uri,
        max_connections: d.max_connections.unwrap_or(5).max(1),
        batch_size: effective_batch_size(d.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)),
    })
}

/// Assemble a connection URI, percent-encoding the credentials.
fn postgres_uri(
    host: &str,
    port: &str,
    user: &str,
    password: &str,
    db: &str,
) -> Result<String, ConfigError> {
    let invalid = |field: &'static str, value: &str| ConfigError::Invalid {
        field,
        value: value.to_string(),
    };

    let port: u16 = port.parse().map_err(|_| invalid("POSTGRES_PORT", port))?;
    let mut uri = Url::parse(&format!("postgres://{host}"))
        .ok()
        .filter(|u| u.host_str().is_some())
        .ok_or_else(|| invalid("POSTGRES_HOST", host))?;

    uri.set_port(Some(port))
        .map_err(|_| invalid("POSTGRES_PORT", &port.to_string()))?;
    uri.set_username(user)
        .map_err(|_| invalid("POSTGRES_USER", user))?;
    uri.set_password(Some(password))
        .map_err(|_| invalid("POSTGRES_PASSWORD", "<redacted>"))?;
    uri.path_segments_mut()
        .map_err(|_| invalid("POSTGRES_DB", db))?
        .clear()
        .push(db);

    Ok(uri.into())
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ConfigError> {
    let len = value.chars().count();
    if len > max {
        return Err(ConfigError::TooLong { field, max, len });
    }
    Ok(())
}
