//! Server configuration for collab-server
//!
//! Loads and parses collab-server.toml configuration file with collaboration
//! tuning, SSL/TLS, security, database, and LDAP settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub mod ldap;
pub mod security;
pub mod ssl;

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// SSL/TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SslConfig {
    /// SSL cipher suite
    pub cipher: String,
    /// TLS version ("1.2" or "1.3")
    pub version: String,
    /// MAC algorithm
    pub mac: String,
    /// SSL mode: "auto" (auto-generate PEM) or "pem" (use predefined PEM)
    pub mode: SslMode,
    /// X509 certificate configuration for auto-generation
    #[serde(default)]
    pub x509: X509Config,
}

/// SSL mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// Auto-generate PEM files
    Auto,
    /// Use predefined PEM files
    Pem,
}

/// X509 certificate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct X509Config {
    /// Country code (ISO 3166-1 alpha-2)
    pub country: String,
    /// State or Province
    pub state: String,
    /// City or Locality
    pub locality: String,
    /// Organization name
    pub organization: String,
    /// Organizational unit
    pub organizational_unit: String,
    /// Common Name (CN)
    pub common_name: String,
    /// Certificate validity period in days
    pub validity_days: u32,
}

impl Default for X509Config {
    fn default() -> Self {
        Self {
            country: "US".to_string(),
            state: "CA".to_string(),
            locality: "San Francisco".to_string(),
            organization: "Collab".to_string(),
            organizational_unit: "Engineering".to_string(),
            common_name: "collab-server".to_string(),
            validity_days: 365,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file path
    pub path: String,
}

/// Security mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityMode {
    /// No authentication required
    Open,
    /// API key based authentication
    SecretKey,
    /// User login credentials
    UserLogin,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Security mode
    pub mode: SecurityMode,
    /// Secret key (can be overridden by SECRET_KEY environment variable)
    #[serde(default)]
    pub secret_key: Option<String>,
}

/// LDAP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Enable LDAP authentication
    pub enabled: bool,
    /// LDAP server URL (e.g., "ldap://localhost:389" or "ldaps://ldap.example.com:636")
    pub server_url: String,
    /// Distinguished Name (DN) for LDAP bind
    pub dn: String,
    /// LDAP suffix (e.g., "dc=example,dc=com")
    pub suffix: String,
    /// LDAP group for authorization
    pub group: String,
    /// Read-only login credentials (username:password or DN:password)
    pub readonly_login: String,
}

/// Server identification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfoConfig {
    /// Server name for identification (displayed to clients)
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Bind address for the HTTP/WebSocket listener
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerInfoConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_server_name() -> String {
    "collab-server".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Collaboration-core tuning options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollabConfig {
    /// Route session state through the shared coordination backend vs. in-process.
    #[serde(default)]
    pub use_shared_sessions: bool,
    /// Cross-instance broadcast via the shared coordination bus vs. local only.
    #[serde(default)]
    pub use_shared_sockets: bool,
    /// Cross-instance op stream via the shared coordination backend vs. in-process queue.
    #[serde(default)]
    pub use_shared_ordering: bool,
    /// TTL in seconds for shared session entries.
    #[serde(default = "default_session_ttl")]
    pub session_ttl: u64,
    /// Presence eviction threshold in milliseconds.
    #[serde(default = "default_presence_inactive_ms")]
    pub presence_inactive_ms: u64,
    /// Session inactivity cutoff in milliseconds.
    #[serde(default = "default_session_idle_ms")]
    pub session_idle_ms: u64,
    /// Maximum retries for transient storage conflicts.
    #[serde(default = "default_serializer_max_retries")]
    pub serializer_max_retries: u32,
    /// Base backoff delay in milliseconds (doubles per attempt).
    #[serde(default = "default_serializer_initial_backoff_ms")]
    pub serializer_initial_backoff_ms: u64,
    /// Allowed origin for the socket handshake.
    #[serde(default)]
    pub frontend_origin: Option<String>,
    /// Handshake JWT verification secret (overridable by `JWT_SECRET` env var).
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Redis connection URL, required when any `use_shared_*` flag is set.
    #[serde(default)]
    pub redis_url: Option<String>,
}

fn default_session_ttl() -> u64 {
    45
}

fn default_presence_inactive_ms() -> u64 {
    30_000
}

fn default_session_idle_ms() -> u64 {
    300_000
}

fn default_serializer_max_retries() -> u32 {
    5
}

fn default_serializer_initial_backoff_ms() -> u64 {
    50
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            use_shared_sessions: false,
            use_shared_sockets: false,
            use_shared_ordering: false,
            session_ttl: default_session_ttl(),
            presence_inactive_ms: default_presence_inactive_ms(),
            session_idle_ms: default_session_idle_ms(),
            serializer_max_retries: default_serializer_max_retries(),
            serializer_initial_backoff_ms: default_serializer_initial_backoff_ms(),
            frontend_origin: None,
            jwt_secret: None,
            redis_url: None,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server identification
    #[serde(default)]
    pub server: ServerInfoConfig,
    /// Collaboration-core tuning
    #[serde(default)]
    pub collab: CollabConfig,
    /// SSL/TLS configuration
    pub ssl: SslConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// LDAP configuration
    pub ldap: LdapConfig,
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ServerConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(ServerConfigError::ReadError)?;
        Self::from_str(&content)
    }

    /// Load configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ServerConfigError> {
        toml::from_str(content).map_err(ServerConfigError::ParseError)
    }

    /// Load configuration from default location or environment
    ///
    /// Searches for config in:
    /// 1. CONFIG_PATH environment variable
    /// 2. ./config/collab-server.toml
    /// 3. ../config/collab-server.toml (for development)
    pub fn load() -> Result<Self, ServerConfigError> {
        if let Ok(config_path) = std::env::var("CONFIG_PATH") {
            return Self::from_file(config_path);
        }

        let paths = [
            PathBuf::from("config/collab-server.toml"),
            PathBuf::from("../config/collab-server.toml"),
            PathBuf::from("./collab-server.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        Err(ServerConfigError::InvalidConfig(
            "Configuration file not found. Set CONFIG_PATH or place collab-server.toml in config/".to_string(),
        ))
    }

    /// Get the secret key, checking environment variable first
    pub fn get_secret_key(&self) -> Option<String> {
        std::env::var("SECRET_KEY")
            .ok()
            .or_else(|| self.security.secret_key.clone())
    }

    /// Get the JWT handshake secret, checking environment variable first
    pub fn get_jwt_secret(&self) -> Option<String> {
        std::env::var("JWT_SECRET")
            .ok()
            .or_else(|| self.collab.jwt_secret.clone())
    }

    /// Get database URL from configuration
    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.database.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parsing() {
        let toml_content = r#"
[ssl]
cipher = "ECDHE-RSA-AES256-GCM-SHA384"
version = "1.3"
mac = "SHA256"
mode = "auto"

[ssl.x509]
country = "US"
state = "CA"
locality = "San Francisco"
organization = "Collab"
organizational_unit = "Engineering"
common_name = "collab-server"
validity_days = 365

[database]
path = "collab.db"

[security]
mode = "secret-key"
secret_key = ""

[ldap]
enabled = false
dn = ""
suffix = ""
group = ""
readonly_login = ""
"#;

        let config = ServerConfig::from_str(toml_content).unwrap();
        assert_eq!(config.ssl.cipher, "ECDHE-RSA-AES256-GCM-SHA384");
        assert_eq!(config.ssl.version, "1.3");
        assert_eq!(config.ssl.mode, SslMode::Auto);
        assert_eq!(config.database.path, "collab.db");
        assert_eq!(config.security.mode, SecurityMode::SecretKey);
        assert!(!config.ldap.enabled);
        assert_eq!(config.collab.session_idle_ms, 300_000);
        assert_eq!(config.collab.serializer_max_retries, 5);
    }

    #[test]
    fn test_collab_config_defaults() {
        let collab = CollabConfig::default();
        assert_eq!(collab.session_ttl, 45);
        assert_eq!(collab.presence_inactive_ms, 30_000);
        assert!(!collab.use_shared_sessions);
    }
}
