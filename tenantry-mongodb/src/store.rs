//! MongoDB tenant store.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use serde::Serialize;
use tenantry_core::{Tenant, TenantError, TenantStore};
use tracing::{debug, info};

/// Default database holding the tenant collection.
pub const DEFAULT_DATABASE: &str = "tenantry";

/// Collection holding one document per tenant.
pub const COLLECTION: &str = "tenants";

const DUPLICATE_KEY: i32 = 11000;

/// Tenant store keeping each tenant, datasources included, as one document.
#[derive(Clone)]
pub struct MongoTenantStore {
    client: Client,
    collection: Collection<Tenant>,
}

impl MongoTenantStore {
    /// Connect to `uri` and use the default database.
    pub async fn connect(uri: &str) -> Result<Self, TenantError> {
        Self::connect_with_database(uri, DEFAULT_DATABASE).await
    }

    /// Connect, ping, and make sure the collection indexes exist.
    pub async fn connect_with_database(uri: &str, database: &str) -> Result<Self, TenantError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| TenantError::Connection(format!("failed to connect to tenant database: {}", e)))?;

        if let Err(e) = client.database("admin").run_command(doc! { "ping": 1 }).await {
            client.shutdown().await;
            return Err(TenantError::Connection(format!("tenant database ping failed: {}", e)));
        }

        let store = Self::from_client(client, database);
        store.ensure_indexes().await?;

        info!(database = %database, "MongoDB tenant store ready");
        Ok(store)
    }

    /// Wrap an existing client. Indexes are not touched.
    pub fn from_client(client: Client, database: &str) -> Self {
        let collection = client.database(database).collection::<Tenant>(COLLECTION);
        Self { client, collection }
    }

    /// Create the collection indexes if they are missing.
    pub async fn ensure_indexes(&self) -> Result<(), TenantError> {
        self.collection
            .create_indexes(index_models())
            .await
            .map_err(map_mongo_error)?;
        debug!("tenant indexes verified");
        Ok(())
    }

    pub fn collection(&self) -> &Collection<Tenant> {
        &self.collection
    }

    /// Shut the client down.
    pub async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}

#[async_trait]
impl TenantStore for MongoTenantStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Tenant>, TenantError> {
        self.collection
            .find_one(doc! { "name": name })
            .await
            .map_err(map_mongo_error)
    }

    async fn list(&self) -> Result<Vec<Tenant>, TenantError> {
        let cursor = self
            .collection
            .find(doc! {})
            .sort(doc! { "name": 1 })
            .await
            .map_err(map_mongo_error)?;

        cursor.try_collect().await.map_err(map_mongo_error)
    }

    async fn create(&self, tenant: &Tenant) -> Result<(), TenantError> {
        tenant.validate()?;
        self.collection.insert_one(tenant).await.map_err(map_mongo_error)?;
        debug!(tenant = %tenant.name, "tenant document created");
        Ok(())
    }

    async fn update(&self, tenant: &Tenant) -> Result<(), TenantError> {
        tenant.validate()?;

        let result = self
            .collection
            .update_one(doc! { "id": tenant.id.as_str() }, doc! { "$set": update_fields(tenant)? })
            .await
            .map_err(map_mongo_error)?;

        if result.matched_count == 0 {
            return Err(TenantError::NotFound(tenant.name.clone()));
        }
        debug!(tenant = %tenant.name, "tenant document updated");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), TenantError> {
        let result = self
            .collection
            .delete_one(doc! { "id": id })
            .await
            .map_err(map_mongo_error)?;

        if result.deleted_count == 0 {
            return Err(TenantError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn index_models() -> Vec<IndexModel> {
    let unique = || IndexOptions::builder().unique(true).build();
    vec![
        IndexModel::builder().keys(doc! { "name": 1 }).options(unique()).build(),
        IndexModel::builder().keys(doc! { "id": 1 }).options(unique()).build(),
        IndexModel::builder().keys(doc! { "is_active": 1 }).build(),
        IndexModel::builder().keys(doc! { "datasources.id": 1 }).build(),
    ]
}

/// Mutable fields replaced on update. `created_at` is left as stored.
fn update_fields(tenant: &Tenant) -> Result<Document, TenantError> {
    Ok(doc! {
        "name": tenant.name.as_str(),
        "is_active": tenant.is_active,
        "metadata": encode(&tenant.metadata)?,
        "datasources": encode(&tenant.datasources)?,
        "updated_at": encode(&tenant.updated_at)?,
    })
}

fn encode<T: Serialize>(value: &T) -> Result<Bson, TenantError> {
    bson::to_bson(value).map_err(|e| TenantError::Storage(format!("failed to encode tenant: {}", e)))
}

/// Map a driver error onto the tenant error taxonomy.
pub(crate) fn map_mongo_error(err: mongodb::error::Error) -> TenantError {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => {
            TenantError::Conflict(duplicate_key_message(&e.message))
        }
        ErrorKind::Command(e) if e.code == DUPLICATE_KEY => TenantError::Conflict(duplicate_key_message(&e.message)),
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
            TenantError::Connection(err.to_string())
        }
        _ => TenantError::Storage(err.to_string()),
    }
}

fn duplicate_key_message(message: &str) -> String {
    if message.contains("name_1") {
        "tenant name already exists".to_string()
    } else {
        format!("unique constraint violation: {}", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantry_core::DatasourceRole;

    #[test]
    fn test_name_and_id_indexes_are_unique() {
        let models = index_models();
        let unique: Vec<_> = models
            .iter()
            .filter(|m| m.options.as_ref().and_then(|o| o.unique) == Some(true))
            .map(|m| m.keys.keys().next().cloned().unwrap_or_default())
            .collect();
        assert_eq!(unique, ["name", "id"]);
        assert_eq!(models.len(), 4);
    }

    #[test]
    fn test_update_fields_leave_identity_alone() {
        let tenant = Tenant::new("acme")
            .with_datasource("mongodb://db/acme", DatasourceRole::Read, 3)
            .with_active(false);
        let fields = update_fields(&tenant).unwrap();

        assert_eq!(fields.get_str("name").unwrap(), "acme");
        assert!(!fields.get_bool("is_active").unwrap());
        assert_eq!(fields.get_array("datasources").unwrap().len(), 1);
        assert!(!fields.contains_key("id"));
        assert!(!fields.contains_key("created_at"));
    }

    #[test]
    fn test_duplicate_key_message() {
        assert_eq!(
            duplicate_key_message("E11000 duplicate key error collection: tenantry.tenants index: name_1"),
            "tenant name already exists"
        );
        assert!(duplicate_key_message("index: id_1").starts_with("unique constraint violation"));
    }
}
