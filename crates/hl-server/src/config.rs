//! Server configuration.
//!
//! Layering: built-in defaults, then the JSON file (missing keys keep their
//! defaults), then `HUSHLINE_*` environment overrides. Secrets are never
//! read from the file.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use hl_crypto::keys::{DEFAULT_MODULUS_BITS, MIN_MODULUS_BITS};

use crate::paths::default_database_path;

pub const ENV_LISTEN_ADDR: &str = "HUSHLINE_LISTEN_ADDR";
pub const ENV_DATABASE: &str = "HUSHLINE_DATABASE";
pub const ENV_MODULUS_BITS: &str = "HUSHLINE_MODULUS_BITS";
pub const ENV_CRYPTO_WORKERS: &str = "HUSHLINE_CRYPTO_WORKERS";
pub const ENV_AUTH_SECRET: &str = "HUSHLINE_AUTH_SECRET";
pub const ENV_VAULT_PASSPHRASE: &str = "HUSHLINE_VAULT_PASSPHRASE";

const MIN_AUTH_SECRET_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub database_path: PathBuf,
    /// RSA modulus for newly registered identities.
    pub modulus_bits: usize,
    /// Upper bound on concurrently running asymmetric operations.
    pub crypto_workers: usize,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    pub history_default_limit: usize,
    pub history_max_limit: usize,
    pub store_retry_attempts: u32,
    pub store_retry_backoff_ms: u64,
    /// Time allowed between accept and the `connect` frame.
    pub handshake_timeout_secs: u64,
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7420".into(),
            database_path: default_database_path(),
            modulus_bits: DEFAULT_MODULUS_BITS,
            crypto_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            outbound_buffer: 256,
            history_default_limit: 50,
            history_max_limit: 200,
            store_retry_attempts: 3,
            store_retry_backoff_ms: 50,
            handshake_timeout_secs: 10,
            log_filter: "info".into(),
        }
    }
}

impl ServerConfig {
    /// Defaults, overlaid with `path` when given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup(ENV_LISTEN_ADDR) {
            self.listen_addr = v;
        }
        if let Some(v) = lookup(ENV_DATABASE) {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_MODULUS_BITS) {
            self.modulus_bits = v
                .parse()
                .with_context(|| format!("{ENV_MODULUS_BITS}={v:?}"))?;
        }
        if let Some(v) = lookup(ENV_CRYPTO_WORKERS) {
            self.crypto_workers = v
                .parse()
                .with_context(|| format!("{ENV_CRYPTO_WORKERS}={v:?}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.modulus_bits < MIN_MODULUS_BITS {
            bail!(
                "modulus_bits must be at least {MIN_MODULUS_BITS}, got {}",
                self.modulus_bits
            );
        }
        if self.crypto_workers == 0 {
            bail!("crypto_workers must be at least 1");
        }
        if self.outbound_buffer == 0 {
            bail!("outbound_buffer must be at least 1");
        }
        if self.history_default_limit == 0 || self.history_max_limit == 0 {
            bail!("history limits must be at least 1");
        }
        if self.history_default_limit > self.history_max_limit {
            bail!(
                "history_default_limit ({}) exceeds history_max_limit ({})",
                self.history_default_limit,
                self.history_max_limit
            );
        }
        if self.store_retry_attempts == 0 {
            bail!("store_retry_attempts must be at least 1");
        }
        Ok(())
    }
}

/// Secrets, taken only from the environment.
pub struct Secrets {
    pub auth_secret: Zeroizing<Vec<u8>>,
    pub vault_passphrase: Zeroizing<String>,
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let auth_secret = Zeroizing::new(
            lookup(ENV_AUTH_SECRET)
                .ok_or_else(|| anyhow!("{ENV_AUTH_SECRET} is not set"))?
                .into_bytes(),
        );
        if auth_secret.len() < MIN_AUTH_SECRET_LEN {
            bail!("{ENV_AUTH_SECRET} must be at least {MIN_AUTH_SECRET_LEN} bytes");
        }
        let vault_passphrase = Zeroizing::new(
            lookup(ENV_VAULT_PASSPHRASE)
                .ok_or_else(|| anyhow!("{ENV_VAULT_PASSPHRASE} is not set"))?,
        );
        if vault_passphrase.is_empty() {
            bail!("{ENV_VAULT_PASSPHRASE} must not be empty");
        }
        Ok(Self {
            auth_secret,
            vault_passphrase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.modulus_bits, 4096);
        assert_eq!(config.history_default_limit, 50);
        assert!(config.crypto_workers >= 1);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"listen_addr":"0.0.0.0:9000","history_max_limit":500}"#).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let config: ServerConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.history_max_limit, 500);
        assert_eq!(config.outbound_buffer, 256);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = ServerConfig::default();
        config
            .apply_env(env(&[
                (ENV_LISTEN_ADDR, "0.0.0.0:1"),
                (ENV_MODULUS_BITS, "2048"),
                (ENV_CRYPTO_WORKERS, "2"),
                (ENV_DATABASE, "/tmp/x.db"),
            ]))
            .unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:1");
        assert_eq!(config.modulus_bits, 2048);
        assert_eq!(config.crypto_workers, 2);
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn bad_env_value_is_an_error() {
        let mut config = ServerConfig::default();
        assert!(config.apply_env(env(&[(ENV_MODULUS_BITS, "lots")])).is_err());
    }

    #[test]
    fn validate_rejects_weak_or_inconsistent_values() {
        let mut config = ServerConfig {
            modulus_bits: 1024,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
        config.modulus_bits = 2048;
        config.crypto_workers = 0;
        assert!(config.validate().is_err());
        config.crypto_workers = 1;
        config.history_default_limit = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn secrets_come_from_env_only() {
        assert!(Secrets::from_lookup(env(&[])).is_err());
        assert!(Secrets::from_lookup(env(&[(ENV_AUTH_SECRET, "short"), (ENV_VAULT_PASSPHRASE, "p")])).is_err());
        let secrets = Secrets::from_lookup(env(&[
            (ENV_AUTH_SECRET, "0123456789abcdef0123"),
            (ENV_VAULT_PASSPHRASE, "passphrase"),
        ]))
        .unwrap();
        assert_eq!(secrets.auth_secret.len(), 20);
    }
}
