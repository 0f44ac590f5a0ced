use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PlatformError;
use crate::store::{PlatformStore, TenantApp};

/// Key shape: tab_<first 6 of org id>_<48 hex random>_<8 hex checksum>,
/// checksum = HMAC-SHA256(platform secret, "<app>:<org>:<random>")[..8].
pub const KEY_PREFIX: &str = "tab";
const ORG_PREFIX_LEN: usize = 6;
const RANDOM_BYTES: usize = 24;
const CHECKSUM_LEN: usize = 8;

/// Generates, rotates, and validates per-app bearer keys. The HMAC secret is
/// injected at construction; there is no process-wide secret state.
#[derive(Clone)]
pub struct ApiKeyManager {
    store: Arc<dyn PlatformStore>,
    secret: String,
}

pub struct KeyParts<'a> {
    pub org_prefix: &'a str,
    pub random_part: &'a str,
    pub checksum: &'a str,
}

/// Structural pre-check: rejects malformed keys before any storage lookup.
pub fn parse_key(raw: &str) -> Option<KeyParts<'_>> {
    let mut segments = raw.split('_');
    let prefix = segments.next()?;
    let org_prefix = segments.next()?;
    let random_part = segments.next()?;
    let checksum = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    if prefix != KEY_PREFIX
        || org_prefix.len() != ORG_PREFIX_LEN
        || random_part.len() != RANDOM_BYTES * 2
        || checksum.len() != CHECKSUM_LEN
        || !is_lower_hex(random_part)
        || !is_lower_hex(checksum)
    {
        return None;
    }
    Some(KeyParts { org_prefix, random_part, checksum })
}

fn is_lower_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

impl ApiKeyManager {
    pub fn new(store: Arc<dyn PlatformStore>, secret: impl Into<String>) -> Self {
        Self { store, secret: secret.into() }
    }

    pub fn generate_key_string(&self, app_id: Uuid, org_id: Uuid) -> String {
        let random_part = common_crypto::random_hex(RANDOM_BYTES);
        let checksum = self.checksum(app_id, org_id, &random_part);
        let org = org_id.to_string();
        format!("{KEY_PREFIX}_{}_{random_part}_{checksum}", &org[..ORG_PREFIX_LEN])
    }

    fn checksum(&self, app_id: Uuid, org_id: Uuid, random_part: &str) -> String {
        let message = format!("{app_id}:{org_id}:{random_part}");
        let digest = common_crypto::hmac_hex(self.secret.as_bytes(), message.as_bytes())
            .expect("HMAC accepts any key length");
        digest[..CHECKSUM_LEN].to_string()
    }

    /// Deactivate the current key, persist a fresh one, and hand the raw
    /// value back exactly once. The store makes the swap atomic.
    pub async fn rotate(&self, app_id: Uuid) -> Result<(TenantApp, String), PlatformError> {
        let app = self
            .store
            .find_app(app_id)
            .await?
            .ok_or(PlatformError::AppNotFound(app_id))?;
        let key = self.generate_key_string(app.id, app.organization_id);
        let record = self.store.rotate_api_key(app.id, &key).await?;
        info!(app_id = %app.id, key_id = %record.id, "rotated API key");
        Ok((app, key))
    }

    /// Exact-value lookup among active keys, then checksum recomputation
    /// against the owning app and organization. The embedded checksum is not
    /// enough on its own (it binds the app id, which the raw key does not
    /// carry), so the lookup comes first and the recomputation guards against
    /// tampered or mis-issued rows.
    pub async fn validate(&self, raw: &str) -> Result<TenantApp, PlatformError> {
        let parts = parse_key(raw).ok_or(PlatformError::InvalidApiKey)?;
        let Some((record, app)) = self.store.find_active_api_key(raw).await? else {
            return Err(PlatformError::InvalidApiKey);
        };
        let expected = self.checksum(app.id, app.organization_id, parts.random_part);
        if !common_crypto::constant_time_eq(expected.as_bytes(), parts.checksum.as_bytes()) {
            warn!(app_id = %app.id, key_id = %record.id, "API key checksum mismatch");
            return Err(PlatformError::InvalidApiKey);
        }
        Ok(app)
    }
}
