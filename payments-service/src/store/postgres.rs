use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use common_crypto::MasterKey;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::status::PaymentStatus;
use crate::store::{
    ApiKeyRecord, CredentialRecord, PaymentRecord, PlatformStore, TenantApp, TransitionOutcome,
};

/// Postgres-backed store. Credential blobs are sealed with the platform
/// master key before they touch the database; see migrations/0001_init.sql
/// for the schema.
pub struct PgStore {
    pool: PgPool,
    master_key: MasterKey,
}

impl PgStore {
    pub fn new(pool: PgPool, master_key: MasterKey) -> Self {
        Self { pool, master_key }
    }

    fn seal(&self, credentials: &Value) -> Result<Vec<u8>> {
        let plain = serde_json::to_vec(credentials)?;
        self.master_key
            .seal(&plain)
            .map_err(|err| anyhow!("failed to seal credential blob: {err}"))
    }

    fn open(&self, blob: &[u8]) -> Result<Value> {
        let plain = self
            .master_key
            .open(blob)
            .map_err(|err| anyhow!("failed to open credential blob: {err}"))?;
        Ok(serde_json::from_slice(&plain)?)
    }
}

#[derive(sqlx::FromRow)]
struct AppRow {
    id: Uuid,
    name: String,
    environment: String,
    organization_id: Uuid,
}

impl From<AppRow> for TenantApp {
    fn from(row: AppRow) -> Self {
        TenantApp {
            id: row.id,
            name: row.name,
            environment: row.environment,
            organization_id: row.organization_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    app_id: Uuid,
    key: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<ApiKeyRow> for ApiKeyRecord {
    fn from(row: ApiKeyRow) -> Self {
        ApiKeyRecord {
            id: row.id,
            app_id: row.app_id,
            key: row.key,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    app_id: Uuid,
    provider: String,
    credentials: Vec<u8>,
    active: bool,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    app_id: Uuid,
    organization_id: Uuid,
    provider: String,
    provider_ref: String,
    amount: BigDecimal,
    currency: String,
    status: String,
    metadata: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_record(self) -> Result<PaymentRecord> {
        let status = PaymentStatus::from_str(&self.status)
            .ok_or_else(|| anyhow!("unknown payment status '{}' in storage", self.status))?;
        Ok(PaymentRecord {
            id: self.id,
            app_id: self.app_id,
            organization_id: self.organization_id,
            provider: self.provider,
            provider_ref: self.provider_ref,
            amount: self.amount,
            currency: self.currency,
            status,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const PAYMENT_COLUMNS: &str = "id, app_id, organization_id, provider, provider_ref, amount, currency, status, metadata, created_at, updated_at";

#[async_trait]
impl PlatformStore for PgStore {
    async fn find_app(&self, app_id: Uuid) -> Result<Option<TenantApp>> {
        let row = sqlx::query_as::<_, AppRow>(
            "SELECT id, name, environment, organization_id FROM apps WHERE id = $1",
        )
        .bind(app_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TenantApp::from))
    }

    async fn active_credential(
        &self,
        app_id: Uuid,
        provider: &str,
    ) -> Result<Option<CredentialRecord>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"SELECT app_id, provider, credentials, active
               FROM provider_configs
               WHERE app_id = $1 AND provider = $2 AND active"#,
        )
        .bind(app_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(CredentialRecord {
                app_id: row.app_id,
                provider: row.provider,
                credentials: self.open(&row.credentials)?,
                active: row.active,
            })),
            None => Ok(None),
        }
    }

    async fn upsert_credential(
        &self,
        app_id: Uuid,
        provider: &str,
        credentials: &Value,
    ) -> Result<CredentialRecord> {
        let sealed = self.seal(credentials)?;
        sqlx::query(
            r#"INSERT INTO provider_configs (app_id, provider, credentials, active)
               VALUES ($1, $2, $3, TRUE)
               ON CONFLICT (app_id, provider)
               DO UPDATE SET credentials = EXCLUDED.credentials, active = TRUE, updated_at = now()"#,
        )
        .bind(app_id)
        .bind(provider)
        .bind(&sealed)
        .execute(&self.pool)
        .await
        .context("failed to upsert provider credential")?;
        Ok(CredentialRecord {
            app_id,
            provider: provider.to_string(),
            credentials: credentials.clone(),
            active: true,
        })
    }

    async fn deactivate_credential(&self, app_id: Uuid, provider: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE provider_configs SET active = FALSE, updated_at = now() WHERE app_id = $1 AND provider = $2 AND active",
        )
        .bind(app_id)
        .bind(provider)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_credentials(&self, app_id: Uuid) -> Result<Vec<CredentialRecord>> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            "SELECT app_id, provider, credentials, active FROM provider_configs WHERE app_id = $1 ORDER BY provider",
        )
        .bind(app_id)
        .fetch_all(&self.pool)
        .await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(CredentialRecord {
                app_id: row.app_id,
                provider: row.provider,
                credentials: self.open(&row.credentials)?,
                active: row.active,
            });
        }
        Ok(records)
    }

    async fn rotate_api_key(&self, app_id: Uuid, key: &str) -> Result<ApiKeyRecord> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE app_api_keys SET active = FALSE WHERE app_id = $1 AND active")
            .bind(app_id)
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"INSERT INTO app_api_keys (id, app_id, key, active)
               VALUES ($1, $2, $3, TRUE)
               RETURNING id, app_id, key, active, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(app_id)
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await.context("failed to commit key rotation")?;
        Ok(row.into())
    }

    async fn find_active_api_key(&self, raw: &str) -> Result<Option<(ApiKeyRecord, TenantApp)>> {
        #[derive(sqlx::FromRow)]
        struct KeyWithApp {
            key_id: Uuid,
            app_id: Uuid,
            key: String,
            active: bool,
            created_at: DateTime<Utc>,
            name: String,
            environment: String,
            organization_id: Uuid,
        }
        let row = sqlx::query_as::<_, KeyWithApp>(
            r#"SELECT k.id AS key_id, k.app_id, k.key, k.active, k.created_at,
                      a.name, a.environment, a.organization_id
               FROM app_api_keys k
               JOIN apps a ON a.id = k.app_id
               WHERE k.key = $1 AND k.active"#,
        )
        .bind(raw)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| {
            (
                ApiKeyRecord {
                    id: row.key_id,
                    app_id: row.app_id,
                    key: row.key,
                    active: row.active,
                    created_at: row.created_at,
                },
                TenantApp {
                    id: row.app_id,
                    name: row.name,
                    environment: row.environment,
                    organization_id: row.organization_id,
                },
            )
        }))
    }

    async fn count_active_api_keys(&self, app_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM app_api_keys WHERE app_id = $1 AND active",
        )
        .bind(app_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO payments
               (id, app_id, organization_id, provider, provider_ref, amount, currency, status, metadata, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(payment.id)
        .bind(payment.app_id)
        .bind(payment.organization_id)
        .bind(&payment.provider)
        .bind(&payment.provider_ref)
        .bind(&payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.metadata)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to insert payment")?;
        Ok(())
    }

    async fn find_payment(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentRow::into_record).transpose()
    }

    async fn find_payment_by_provider_ref(
        &self,
        provider: &str,
        provider_ref: &str,
    ) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider = $1 AND provider_ref = $2"
        ))
        .bind(provider)
        .bind(provider_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentRow::into_record).transpose()
    }

    async fn transition_payment_status(
        &self,
        payment_id: Uuid,
        to: PaymentStatus,
    ) -> Result<TransitionOutcome> {
        // The allowed source states are encoded in the WHERE clause so two
        // concurrent deliveries race on a single guarded UPDATE.
        let allowed_from: &[&str] = match to {
            PaymentStatus::Success | PaymentStatus::Failed => &["PENDING"],
            PaymentStatus::Refunded => &["SUCCESS", "FAILED"],
            PaymentStatus::Pending => &[],
        };
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"UPDATE payments SET status = $2, updated_at = now()
               WHERE id = $1 AND status = ANY($3)
               RETURNING {PAYMENT_COLUMNS}"#
        ))
        .bind(payment_id)
        .bind(to.as_str())
        .bind(allowed_from)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            return Ok(TransitionOutcome::Applied(row.into_record()?));
        }
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM payments WHERE id = $1")
                .bind(payment_id)
                .fetch_optional(&self.pool)
                .await?;
        match current {
            Some(status) => {
                let status = PaymentStatus::from_str(&status)
                    .ok_or_else(|| anyhow!("unknown payment status '{status}' in storage"))?;
                Ok(TransitionOutcome::Ignored(status))
            }
            None => Ok(TransitionOutcome::NotFound),
        }
    }
}
