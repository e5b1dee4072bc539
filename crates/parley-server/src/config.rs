use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Process configuration, read from `PARLEY_*` environment variables
/// (a `.env` file is loaded first if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Shared chat password; unset or empty means no password.
    pub password: Option<String>,
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub static_dir: PathBuf,
    pub vapid_public_key: Option<String>,
    /// Relay that delivers web push on our behalf. Push is off without it.
    pub push_relay_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = var("PARLEY_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PARLEY_PORT must be a port number")?;

        Ok(Self {
            host: var("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            password: var("PARLEY_PASSWORD"),
            db_path: var("PARLEY_DB_PATH")
                .unwrap_or_else(|| "parley.db".into())
                .into(),
            uploads_dir: var("PARLEY_UPLOADS_DIR")
                .unwrap_or_else(|| "uploads".into())
                .into(),
            static_dir: var("PARLEY_STATIC_DIR")
                .unwrap_or_else(|| "public".into())
                .into(),
            vapid_public_key: var("PARLEY_VAPID_PUBLIC_KEY"),
            push_relay_url: var("PARLEY_PUSH_RELAY_URL"),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

/// A set, non-empty environment variable.
fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> Config {
        Config {
            host: host.into(),
            port: 3000,
            password: None,
            db_path: "parley.db".into(),
            uploads_dir: "uploads".into(),
            static_dir: "public".into(),
            vapid_public_key: None,
            push_relay_url: None,
        }
    }

    #[test]
    fn listen_address() {
        assert_eq!(config("127.0.0.1").addr().unwrap().port(), 3000);
        assert!(config("not a host").addr().is_err());
    }
}
