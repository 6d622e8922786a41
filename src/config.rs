use crate::error::{BadEnvVarSnafu, ParseEnvNumberSnafu, RollcallResult};
use dotenvy::var;
use secrecy::{ExposeSecret, SecretString};
use snafu::ResultExt;
use std::sync::Arc;
use time::Duration;

#[derive(Clone, Debug)]
pub struct RuntimeConfiguration {
    db_config: Arc<DbConfig>,
    server_config: Arc<ServerConfig>,
}

impl RuntimeConfiguration {
    pub fn new() -> RollcallResult<Self> {
        Ok(Self {
            db_config: Arc::new(DbConfig::new()?),
            server_config: Arc::new(ServerConfig::new()?),
        })
    }

    pub fn db_config(&self) -> Arc<DbConfig> {
        self.db_config.clone()
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        self.server_config.clone()
    }
}

#[derive(Debug)]
pub struct DbConfig {
    user: String,
    password: SecretString,
    path: String,
    port: u16,
    database: String,
}

impl DbConfig {
    pub fn new() -> RollcallResult<Self> {
        let get_env_var = |name| var(name).context(BadEnvVarSnafu { name });

        Ok(Self {
            user: get_env_var("DB_USER")?,
            password: SecretString::from(get_env_var("DB_PASSWORD")?),
            path: get_env_var("DB_PATH")?,
            port: get_env_var("DB_PORT")?
                .parse()
                .context(ParseEnvNumberSnafu { name: "DB_PORT" })?,
            database: get_env_var("DB_NAME")?,
        })
    }

    pub fn get_db_path(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user,
            self.password.expose_secret(),
            self.path,
            self.port,
            self.database
        )
    }
}

/// Settings with sensible defaults, all overridable from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_ip: String,
    /// Base URL that verification links in outgoing emails point at.
    pub public_url: String,
    pub verification_ttl: Duration,
}

impl ServerConfig {
    const DEFAULT_SERVER_IP: &'static str = "127.0.0.1:8080";
    const DEFAULT_PUBLIC_URL: &'static str = "http://localhost:8080";
    const DEFAULT_VERIFICATION_TTL_HOURS: i64 = 48;

    pub fn new() -> RollcallResult<Self> {
        let verification_ttl_hours = match var("ROLLCALL_VERIFICATION_TTL_HOURS") {
            Ok(hours) => hours.parse().context(ParseEnvNumberSnafu {
                name: "ROLLCALL_VERIFICATION_TTL_HOURS",
            })?,
            Err(_) => Self::DEFAULT_VERIFICATION_TTL_HOURS,
        };

        Ok(Self {
            server_ip: var("ROLLCALL_SERVER_IP")
                .unwrap_or_else(|_| Self::DEFAULT_SERVER_IP.to_string()),
            public_url: var("ROLLCALL_PUBLIC_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| Self::DEFAULT_PUBLIC_URL.to_string()),
            verification_ttl: Duration::hours(verification_ttl_hours),
        })
    }
}
