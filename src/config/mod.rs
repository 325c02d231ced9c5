use serde::Deserialize;

/// Complete Icepeek configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IcepeekConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Persistence paths: sessions and the master key live in separate databases
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_sessions_db")]
    pub sessions_db: String,
    #[serde(default = "default_keystore_db")]
    pub keystore_db: String,
}

fn default_sessions_db() -> String {
    "sessions.db".to_string()
}

fn default_keystore_db() -> String {
    "keystore.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_db: default_sessions_db(),
            keystore_db: default_keystore_db(),
        }
    }
}

/// Outbound call behavior (OAuth exchange and proxied catalog requests)
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Timeout for each outbound call, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for IcepeekConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<IcepeekConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: IcepeekConfig = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IcepeekConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.sessions_db, "sessions.db");
        assert_eq!(config.storage.keystore_db, "keystore.db");
        assert_eq!(config.upstream.timeout_seconds, 30);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind = "127.0.0.1"
            port = 9090

            [storage]
            sessions_db = "/var/lib/icepeek/sessions.db"
            keystore_db = "/var/lib/icepeek/keystore.db"

            [upstream]
            timeout_seconds = 10
        "#;

        let config: IcepeekConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.storage.sessions_db, "/var/lib/icepeek/sessions.db");
        assert_eq!(config.upstream.timeout_seconds, 10);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [server]
            port = 3000
        "#;

        let config: IcepeekConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind, "0.0.0.0"); // Default
        assert_eq!(config.upstream.timeout_seconds, 30); // Default
    }
}
