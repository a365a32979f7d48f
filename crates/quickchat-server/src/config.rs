use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;

fn harden_secret_file_permissions(path: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Optional path to a directory containing the built web UI
    pub web_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5001".into(),
            web_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/quickchat.db?mode=rwc".into(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: generate_random_hex(64),
            jwt_expiry_seconds: default_jwt_expiry(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Reconnection policy advertised to gateway clients on the handshake.
#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_reconnect_backoff_factor")]
    pub reconnect_backoff_factor: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            reconnect_max_attempts: default_reconnect_max_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_backoff_factor: default_reconnect_backoff_factor(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!(
                "Config file not found at '{}', generating defaults...",
                path
            );
            let config = Config::default();

            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, toml::to_string_pretty(&config)?)?;
            let _ = harden_secret_file_permissions(path);
            tracing::info!("Generated default config at '{}'", path);
            config
        };
        let _ = harden_secret_file_permissions(path);

        // Environment variable overrides
        if let Ok(value) = std::env::var("QUICKCHAT_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("QUICKCHAT_WEB_DIR") {
            config.server.web_dir = Some(value);
        }
        if let Ok(value) = std::env::var("QUICKCHAT_DATABASE_URL") {
            config.database.url = value;
        }
        if let Ok(value) = std::env::var("QUICKCHAT_JWT_SECRET") {
            config.auth.jwt_secret = value;
        }
        if let Ok(value) = std::env::var("QUICKCHAT_STORAGE_PATH") {
            config.storage.path = value;
        }

        Ok(config)
    }
}

fn generate_random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..16u8);
            char::from(if idx < 10 {
                b'0' + idx
            } else {
                b'a' + idx - 10
            })
        })
        .collect()
}

fn default_max_connections() -> u32 {
    20
}
fn default_jwt_expiry() -> u64 {
    7 * 24 * 3600
}
fn default_storage_path() -> String {
    "./data/storage".into()
}
fn default_max_upload_size() -> u64 {
    10 * 1024 * 1024
}
fn default_reconnect_max_attempts() -> u32 {
    5
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_reconnect_backoff_factor() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_a_generated_secret() {
        let config = Config::default();
        assert_eq!(config.auth.jwt_secret.len(), 64);
        assert_eq!(config.gateway.reconnect_max_attempts, 5);
        assert_eq!(config.gateway.reconnect_delay_ms, 1000);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            bind_address = "127.0.0.1:9000"

            [auth]
            jwt_secret = "fixed-secret"
            "#,
        )
        .expect("parse");
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.auth.jwt_secret, "fixed-secret");
        assert_eq!(config.storage.path, "./data/storage");
        assert_eq!(config.database.max_connections, 20);
    }

    #[test]
    fn missing_file_is_generated_and_reloadable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("quickchat.toml");
        let path = path.to_string_lossy().into_owned();

        let first = Config::load(&path).expect("generate");
        let second = Config::load(&path).expect("reload");
        assert_eq!(first.auth.jwt_secret, second.auth.jwt_secret);
    }
}
