use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio_postgres::config::SslMode;

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Configuration for connecting to a Postgres database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the Postgres server is listening.
    pub port: u16,
    /// Name of the Postgres database to connect to.
    pub name: String,
    /// Username for authenticating with the Postgres server.
    pub username: String,
    /// Password for the specified user. This field is sensitive and redacted in debug output.
    pub password: Option<SerializableSecretString>,
    /// TLS configuration for secure connections.
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    /// Builds `tokio_postgres` connect options without a database name.
    ///
    /// Useful for administrative round-trips that run before the target database exists.
    pub fn without_db(&self) -> tokio_postgres::Config {
        // Only the ssl mode comes from the tls config here; the trusted roots feed the
        // rustls connector built by the caller, since tokio_postgres has no native
        // rustls support.
        let ssl_mode = if self.tls.enabled {
            SslMode::Require
        } else {
            SslMode::Prefer
        };

        let mut options = tokio_postgres::Config::new();
        options
            .host(self.host.clone())
            .port(self.port)
            .user(self.username.clone())
            .ssl_mode(ssl_mode);

        if let Some(password) = &self.password {
            options.password(password.expose_secret());
        }

        options
    }

    /// Builds `tokio_postgres` connect options for the configured database.
    pub fn with_db(&self) -> tokio_postgres::Config {
        let mut options = self.without_db();
        options.dbname(self.name.clone());
        options
    }
}

/// TLS settings for secure Postgres connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    pub trusted_root_certs: String,
    /// Whether TLS is enabled for the connection.
    pub enabled: bool,
}

impl TlsConfig {
    /// Validates the [`TlsConfig`].
    ///
    /// Returns [`ValidationError::MissingTrustedRootCerts`] if TLS is enabled but no
    /// certificates are provided.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            trusted_root_certs: String::new(),
            enabled: false,
        }
    }
}
