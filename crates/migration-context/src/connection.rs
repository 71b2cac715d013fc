//! Connection settings for the inspector and applier roles.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ContextError;

/// TLS settings for a MySQL connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Accept certificates that fail chain validation
    pub accept_invalid_certs: bool,
    /// Skip hostname verification
    pub skip_domain_validation: bool,
}

/// Connection settings for one logical MySQL connection
///
/// # Security Note
///
/// `Debug` redacts the password so the config can be logged safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    /// Default schema for the session
    pub database: Option<String>,
    pub tls: Option<TlsConfig>,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("tls", &self.tls)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: None,
            database: None,
            tls: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port`, for logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ContextError> {
        if self.port == 0 {
            return Err(ContextError::InvalidPort {
                host: self.host.clone(),
                port: self.port,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let config = ConnectionConfig::new("db.internal", "ghost").with_password("hunter2");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("db.internal"));
    }

    #[test]
    fn test_builder_and_address() {
        let config = ConnectionConfig::new("127.0.0.1", "root")
            .with_port(13306)
            .with_database("testdb")
            .with_tls(TlsConfig {
                accept_invalid_certs: true,
                skip_domain_validation: false,
            });
        assert_eq!(config.address(), "127.0.0.1:13306");
        assert_eq!(config.database.as_deref(), Some("testdb"));
        assert!(config.tls.as_ref().is_some_and(|t| t.accept_invalid_certs));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let config = ConnectionConfig::default().with_port(0);
        assert_eq!(
            config.validate(),
            Err(ContextError::InvalidPort {
                host: "localhost".to_string(),
                port: 0
            })
        );
    }
}
