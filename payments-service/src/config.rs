use anyhow::{Context, Result};
use common_crypto::MasterKey;
use std::env;

#[derive(Clone)]
pub struct PlatformConfig {
    /// Secret behind API key checksums. Injected, never read from a global.
    pub api_key_secret: String,
    /// Master key sealing provider credential blobs at rest.
    pub credential_master_key: MasterKey,
    pub database_url: Option<String>,
    /// Hard timeout for tenant callback notifications, in seconds.
    pub notify_timeout_secs: u64,
}

impl PlatformConfig {
    pub fn from_env() -> Result<Self> {
        let api_key_secret = env::var("API_KEY_SECRET").context("API_KEY_SECRET must be set")?;
        let credential_master_key = env::var("CREDENTIAL_MASTER_KEY")
            .context("CREDENTIAL_MASTER_KEY must be set")
            .and_then(|value| {
                MasterKey::from_base64(&value)
                    .context("CREDENTIAL_MASTER_KEY must be 32 base64-encoded bytes")
            })?;
        let database_url = env::var("DATABASE_URL").ok();
        let notify_timeout_secs = u64_from_env("NOTIFY_TIMEOUT_SECONDS", 5);

        Ok(Self {
            api_key_secret,
            credential_master_key,
            database_url,
            notify_timeout_secs: notify_timeout_secs.max(1),
        })
    }
}

fn u64_from_env(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}
