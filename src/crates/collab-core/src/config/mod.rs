//! Configuration module for the collaboration core
//!
//! Provides layered TOML configuration loading for:
//! - Collaboration tuning
//! - Server configuration (bind address, database, SSL/TLS, security, LDAP)
//! - Environment variable expansion and file includes

pub mod loader;
pub mod server;

pub use loader::{deep_merge, load_toml_config, load_toml_file};
pub use server::{
    CollabConfig, DatabaseConfig, LdapConfig, SecurityConfig, SecurityMode, ServerConfig,
    ServerConfigError, SslConfig, SslMode, X509Config,
};
pub use server::ldap::{LdapClient, LdapError};
pub use server::security::{SecurityState, security_middleware};
pub use server::ssl::{setup_ssl_certificates, SslCertPaths, SslError};
