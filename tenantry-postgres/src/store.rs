//! PostgreSQL tenant store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tenantry_core::{Datasource, DatasourceRole, Tenant, TenantError, TenantStore};
use tracing::{debug, info};
use uuid::Uuid;

/// Idempotent schema bootstrap.
///
/// `position` keeps datasources in the order they were supplied; rows written
/// in one transaction share a timestamp, so `created_at` cannot order them.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tenants (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    metadata JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS datasources (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    dsn TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('read', 'write', 'rw')),
    pool_size INTEGER NOT NULL DEFAULT 10 CHECK (pool_size > 0),
    position INTEGER NOT NULL DEFAULT 0,
    metadata JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_tenants_name ON tenants(name);
CREATE INDEX IF NOT EXISTS idx_tenants_active ON tenants(is_active);
CREATE INDEX IF NOT EXISTS idx_datasources_tenant_id ON datasources(tenant_id);
CREATE INDEX IF NOT EXISTS idx_datasources_role ON datasources(role);
"#;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const NOT_NULL_VIOLATION: &str = "23502";

const SELECT_TENANT: &str = "SELECT id, name, is_active, metadata, created_at, updated_at FROM tenants";
const SELECT_DATASOURCE: &str =
    "SELECT id, tenant_id, dsn, role, pool_size, metadata, created_at, updated_at FROM datasources";

/// Connection settings for the store's own pool.
#[derive(Debug, Clone)]
pub struct PostgresStoreConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 30,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30 * 60),
            max_lifetime: Duration::from_secs(60 * 60),
        }
    }
}

/// Tenant store backed by the `tenants` and `datasources` tables.
#[derive(Clone)]
pub struct PostgresTenantStore {
    pool: PgPool,
}

impl PostgresTenantStore {
    /// Connect with default settings and bootstrap the schema.
    pub async fn connect(dsn: &str) -> Result<Self, TenantError> {
        Self::connect_with(dsn, PostgresStoreConfig::default()).await
    }

    /// Connect, verify with `SELECT 1`, and bootstrap the schema.
    ///
    /// The pool is closed again if verification or bootstrap fails.
    pub async fn connect_with(dsn: &str, config: PostgresStoreConfig) -> Result<Self, TenantError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections.min(config.max_connections))
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(dsn)
            .await
            .map_err(|e| TenantError::Connection(format!("failed to connect to tenant database: {}", e)))?;

        if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
            pool.close().await;
            return Err(TenantError::Connection(format!("tenant database ping failed: {}", e)));
        }

        let store = Self { pool };
        if let Err(e) = store.setup_schema().await {
            store.pool.close().await;
            return Err(e);
        }

        info!("PostgreSQL tenant store ready");
        Ok(store)
    }

    /// Wrap an existing pool. The schema is not touched.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they are missing.
    pub async fn setup_schema(&self) -> Result<(), TenantError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        debug!("tenant schema verified");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn insert_datasources(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        datasources: &[Datasource],
    ) -> Result<(), TenantError> {
        for (position, ds) in datasources.iter().enumerate() {
            let pool_size = i32::try_from(ds.pool_size)
                .map_err(|_| TenantError::Validation("datasource pool size is too large".to_string()))?;

            sqlx::query(
                "INSERT INTO datasources \
                 (id, tenant_id, dsn, role, pool_size, position, metadata, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(parse_id(&ds.id, "datasource ID must be a valid UUID")?)
            .bind(tenant_id)
            .bind(&ds.dsn)
            .bind(ds.role.as_str())
            .bind(pool_size)
            .bind(position as i32)
            .bind(metadata_param(&ds.metadata))
            .bind(ds.created_at)
            .bind(ds.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl TenantStore for PostgresTenantStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Tenant>, TenantError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query(&format!("{} WHERE name = $1", SELECT_TENANT))
            .bind(name)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut tenant = tenant_from_row(&row)?;

        let rows = sqlx::query(&format!(
            "{} WHERE tenant_id = $1 ORDER BY position, created_at",
            SELECT_DATASOURCE
        ))
        .bind(parse_id(&tenant.id, "tenant ID must be a valid UUID")?)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tenant.datasources = rows.iter().map(datasource_from_row).collect::<Result<_, _>>()?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(Some(tenant))
    }

    async fn list(&self) -> Result<Vec<Tenant>, TenantError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let tenant_rows = sqlx::query(&format!("{} ORDER BY name", SELECT_TENANT))
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let datasource_rows = sqlx::query(&format!(
            "{} ORDER BY tenant_id, position, created_at",
            SELECT_DATASOURCE
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let mut by_tenant: HashMap<String, Vec<Datasource>> = HashMap::new();
        for row in &datasource_rows {
            let ds = datasource_from_row(row)?;
            by_tenant.entry(ds.tenant_id.clone()).or_default().push(ds);
        }

        tenant_rows
            .iter()
            .map(|row| {
                let mut tenant = tenant_from_row(row)?;
                tenant.datasources = by_tenant.remove(&tenant.id).unwrap_or_default();
                Ok(tenant)
            })
            .collect()
    }

    async fn create(&self, tenant: &Tenant) -> Result<(), TenantError> {
        tenant.validate()?;
        let id = parse_id(&tenant.id, "tenant ID must be a valid UUID")?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO tenants (id, name, is_active, metadata, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(&tenant.name)
        .bind(tenant.is_active)
        .bind(metadata_param(&tenant.metadata))
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Self::insert_datasources(&mut tx, id, &tenant.datasources).await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(tenant = %tenant.name, "tenant row created");
        Ok(())
    }

    async fn update(&self, tenant: &Tenant) -> Result<(), TenantError> {
        tenant.validate()?;
        let id = parse_id(&tenant.id, "tenant ID must be a valid UUID")?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tenants WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if !exists {
            return Err(TenantError::NotFound(tenant.name.clone()));
        }

        sqlx::query("UPDATE tenants SET name = $2, is_active = $3, metadata = $4, updated_at = $5 WHERE id = $1")
            .bind(id)
            .bind(&tenant.name)
            .bind(tenant.is_active)
            .bind(metadata_param(&tenant.metadata))
            .bind(tenant.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM datasources WHERE tenant_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Self::insert_datasources(&mut tx, id, &tenant.datasources).await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(tenant = %tenant.name, "tenant row updated");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), TenantError> {
        let uuid = Uuid::parse_str(id).map_err(|_| TenantError::NotFound(id.to_string()))?;

        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(TenantError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn parse_id(id: &str, message: &str) -> Result<Uuid, TenantError> {
    Uuid::parse_str(id).map_err(|_| TenantError::Validation(message.to_string()))
}

fn metadata_param(metadata: &HashMap<String, serde_json::Value>) -> Option<Json<&HashMap<String, serde_json::Value>>> {
    if metadata.is_empty() {
        None
    } else {
        Some(Json(metadata))
    }
}

type Metadata = Option<Json<HashMap<String, serde_json::Value>>>;

fn tenant_from_row(row: &PgRow) -> Result<Tenant, TenantError> {
    let id: Uuid = row.try_get("id").map_err(map_sqlx_error)?;
    let metadata: Metadata = row.try_get("metadata").map_err(map_sqlx_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_sqlx_error)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(map_sqlx_error)?;

    Ok(Tenant {
        id: id.to_string(),
        name: row.try_get("name").map_err(map_sqlx_error)?,
        is_active: row.try_get("is_active").map_err(map_sqlx_error)?,
        metadata: metadata.map(|Json(m)| m).unwrap_or_default(),
        datasources: Vec::new(),
        created_at,
        updated_at,
    })
}

fn datasource_from_row(row: &PgRow) -> Result<Datasource, TenantError> {
    let id: Uuid = row.try_get("id").map_err(map_sqlx_error)?;
    let tenant_id: Uuid = row.try_get("tenant_id").map_err(map_sqlx_error)?;
    let role: String = row.try_get("role").map_err(map_sqlx_error)?;
    let pool_size: i32 = row.try_get("pool_size").map_err(map_sqlx_error)?;
    let metadata: Metadata = row.try_get("metadata").map_err(map_sqlx_error)?;

    Ok(Datasource {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        dsn: row.try_get("dsn").map_err(map_sqlx_error)?,
        role: role.parse::<DatasourceRole>()?,
        pool_size: u32::try_from(pool_size)
            .map_err(|_| TenantError::Storage(format!("invalid pool size {} in datasource {}", pool_size, id)))?,
        metadata: metadata.map(|Json(m)| m).unwrap_or_default(),
        created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx_error)?,
    })
}

/// Map a driver error onto the tenant error taxonomy.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> TenantError {
    match err {
        sqlx::Error::Database(db) => {
            let constraint = db.constraint().unwrap_or_default().to_string();
            map_constraint(db.code().as_deref(), &constraint, db.message())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            TenantError::Connection(err.to_string())
        }
        other => TenantError::Storage(other.to_string()),
    }
}

fn map_constraint(code: Option<&str>, constraint: &str, message: &str) -> TenantError {
    match code {
        Some(UNIQUE_VIOLATION) if constraint.contains("tenants_name") => {
            TenantError::Conflict("tenant name already exists".to_string())
        }
        Some(UNIQUE_VIOLATION) => TenantError::Conflict(format!("unique constraint violation: {}", message)),
        Some(FOREIGN_KEY_VIOLATION) if constraint.contains("tenant_id") => {
            TenantError::Validation("referenced tenant does not exist".to_string())
        }
        Some(FOREIGN_KEY_VIOLATION) => {
            TenantError::Validation(format!("foreign key constraint violation: {}", message))
        }
        Some(CHECK_VIOLATION) if constraint.contains("role") => TenantError::Validation(
            "invalid datasource role: must be one of 'read', 'write', 'rw'".to_string(),
        ),
        Some(CHECK_VIOLATION) => TenantError::Validation(format!("check constraint violation: {}", message)),
        Some(NOT_NULL_VIOLATION) => TenantError::Validation(format!("required field cannot be null: {}", message)),
        _ => TenantError::Storage(format!("database error: {}", message)),
    }
}
