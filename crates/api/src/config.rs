//! Service configuration from environment variables.

use std::net::SocketAddr;

use anyhow::Context;

pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres when set; in-memory stores otherwise.
    pub database_url: Option<String>,
    pub seed_catalog: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            database_url: None,
            seed_catalog: true,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let bind_addr = match lookup("PLATFORM_BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PLATFORM_BIND_ADDR is not a socket address: {raw}"))?,
            None => defaults.bind_addr,
        };

        let jwt_secret = lookup("JWT_SECRET").filter(|s| !s.is_empty()).unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            defaults.jwt_secret.clone()
        });

        let database_url = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty());

        let seed_catalog = match lookup("PLATFORM_SEED_CATALOG") {
            Some(raw) => raw
                .trim()
                .parse::<bool>()
                .with_context(|| format!("PLATFORM_SEED_CATALOG must be true or false, got {raw}"))?,
            None => defaults.seed_catalog,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url,
            seed_catalog,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert!(config.database_url.is_none());
        assert!(config.seed_catalog);
    }

    #[test]
    fn values_are_read_and_validated() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("PLATFORM_BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/platform"),
            ("PLATFORM_SEED_CATALOG", "false"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/platform"));
        assert!(!config.seed_catalog);

        assert!(ApiConfig::from_lookup(lookup(&[("PLATFORM_BIND_ADDR", "nope")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("PLATFORM_SEED_CATALOG", "maybe")])).is_err());
    }
}
