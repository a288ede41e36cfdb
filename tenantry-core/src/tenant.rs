//! Tenant and Datasource records
//!
//! A tenant owns an ordered list of datasources. Each datasource is a
//! connection target with an access role and a pool size.

use crate::error::TenantError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Access mode of a datasource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatasourceRole {
    /// Read-only access
    #[serde(rename = "read")]
    Read,
    /// Write access
    #[serde(rename = "write")]
    Write,
    /// Read-write access, satisfies any requested role
    #[serde(rename = "rw")]
    ReadWrite,
}

impl DatasourceRole {
    /// Get the role as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "rw",
        }
    }

    /// Check if a datasource with this role can serve `requested`.
    pub fn satisfies(&self, requested: DatasourceRole) -> bool {
        *self == requested || *self == Self::ReadWrite
    }
}

impl fmt::Display for DatasourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasourceRole {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "rw" => Ok(Self::ReadWrite),
            _ => Err(TenantError::Validation(
                "datasource role must be one of: read, write, rw".to_string(),
            )),
        }
    }
}

/// Connection target belonging to one tenant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Datasource {
    /// Unique datasource identifier (UUID)
    pub id: String,

    /// Owning tenant's identifier
    pub tenant_id: String,

    /// Connection string, opaque to this crate
    pub dsn: String,

    /// Access mode
    pub role: DatasourceRole,

    /// Target pool size
    pub pool_size: u32,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Datasource {
    /// Create a new datasource with a generated id
    pub fn new(
        tenant_id: impl Into<String>,
        dsn: impl Into<String>,
        role: DatasourceRole,
        pool_size: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            dsn: dsn.into(),
            role,
            pool_size,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), TenantError> {
        if self.id.is_empty() {
            return invalid("datasource ID cannot be empty");
        }
        if self.tenant_id.is_empty() {
            return invalid("datasource tenant ID cannot be empty");
        }
        if self.dsn.trim().is_empty() {
            return invalid("datasource DSN cannot be empty");
        }
        if self.pool_size == 0 {
            return invalid("datasource pool size must be greater than 0");
        }
        if Uuid::parse_str(&self.id).is_err() {
            return invalid("datasource ID must be a valid UUID");
        }
        if Uuid::parse_str(&self.tenant_id).is_err() {
            return invalid("datasource tenant ID must be a valid UUID");
        }
        Ok(())
    }
}

/// Tenant record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    /// Unique tenant identifier (UUID)
    pub id: String,

    /// Unique lookup key
    pub name: String,

    /// Whether tenant may be resolved
    pub is_active: bool,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Datasources in scan order
    #[serde(default)]
    pub datasources: Vec<Datasource>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a new active tenant with a generated id
    ///
    /// # Examples
    ///
    /// ```
    /// use tenantry_core::{DatasourceRole, Tenant};
    ///
    /// let tenant = Tenant::new("acme")
    ///     .with_datasource("postgres://db/acme", DatasourceRole::ReadWrite, 5);
    /// assert!(tenant.validate().is_ok());
    /// ```
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into().trim().to_string(),
            is_active: true,
            metadata: HashMap::new(),
            datasources: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a datasource bound to this tenant
    pub fn with_datasource(mut self, dsn: impl Into<String>, role: DatasourceRole, pool_size: u32) -> Self {
        let datasource = Datasource::new(self.id.clone(), dsn, role, pool_size);
        self.datasources.push(datasource);
        self
    }

    /// Set active status
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check structural invariants, including every datasource.
    pub fn validate(&self) -> Result<(), TenantError> {
        if self.name.trim().is_empty() {
            return invalid("tenant name cannot be empty");
        }
        if self.name.trim() != self.name {
            return invalid("tenant name cannot have leading or trailing whitespace");
        }
        if self.id.is_empty() {
            return invalid("tenant ID cannot be empty");
        }
        if Uuid::parse_str(&self.id).is_err() {
            return invalid("tenant ID must be a valid UUID");
        }
        for datasource in &self.datasources {
            datasource.validate()?;
            if datasource.tenant_id != self.id {
                return invalid("datasource tenant ID must match tenant ID");
            }
        }
        Ok(())
    }

    /// First datasource that can serve `role`, in list order.
    ///
    /// A `rw` datasource serves any role, so `[read, rw]` asked for `write`
    /// yields the `rw` entry and `[rw, write]` also yields the `rw` entry.
    pub fn datasource_for(&self, role: DatasourceRole) -> Option<&Datasource> {
        self.datasources.iter().find(|ds| ds.role.satisfies(role))
    }
}

fn invalid(message: &str) -> Result<(), TenantError> {
    Err(TenantError::Validation(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> Tenant {
        Tenant::new("acme").with_datasource("postgres://db/acme", DatasourceRole::ReadWrite, 5)
    }

    fn validation_message(result: Result<(), TenantError>) -> String {
        match result {
            Err(TenantError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_new_tenant_is_valid() {
        let tenant = tenant();
        assert!(tenant.is_active);
        assert!(Uuid::parse_str(&tenant.id).is_ok());
        assert_eq!(tenant.datasources[0].tenant_id, tenant.id);
        assert!(tenant.validate().is_ok());
    }

    #[test]
    fn test_new_trims_name() {
        assert_eq!(Tenant::new("  acme ").name, "acme");
    }

    #[test]
    fn test_tenant_validation_table() {
        let cases: Vec<(Box<dyn Fn(&mut Tenant)>, &str)> = vec![
            (Box::new(|t| t.name = String::new()), "tenant name cannot be empty"),
            (Box::new(|t| t.name = "   ".into()), "tenant name cannot be empty"),
            (
                Box::new(|t| t.name = " acme".into()),
                "tenant name cannot have leading or trailing whitespace",
            ),
            (Box::new(|t| t.id = String::new()), "tenant ID cannot be empty"),
            (Box::new(|t| t.id = "tenant-123".into()), "tenant ID must be a valid UUID"),
        ];

        for (mutate, expected) in cases {
            let mut t = tenant();
            mutate(&mut t);
            assert_eq!(validation_message(t.validate()), expected);
        }
    }

    #[test]
    fn test_datasource_validation_table() {
        let cases: Vec<(Box<dyn Fn(&mut Datasource)>, &str)> = vec![
            (Box::new(|d| d.id = String::new()), "datasource ID cannot be empty"),
            (Box::new(|d| d.tenant_id = String::new()), "datasource tenant ID cannot be empty"),
            (Box::new(|d| d.dsn = String::new()), "datasource DSN cannot be empty"),
            (Box::new(|d| d.dsn = " \t ".into()), "datasource DSN cannot be empty"),
            (Box::new(|d| d.pool_size = 0), "datasource pool size must be greater than 0"),
            (Box::new(|d| d.id = "ds-1".into()), "datasource ID must be a valid UUID"),
            (
                Box::new(|d| d.tenant_id = "t-1".into()),
                "datasource tenant ID must be a valid UUID",
            ),
        ];

        for (mutate, expected) in cases {
            let mut ds = Datasource::new(Uuid::new_v4().to_string(), "store://x", DatasourceRole::Read, 1);
            mutate(&mut ds);
            assert_eq!(validation_message(ds.validate()), expected);
        }
    }

    #[test]
    fn test_datasource_must_belong_to_tenant() {
        let mut t = tenant();
        t.datasources[0].tenant_id = Uuid::new_v4().to_string();
        assert_eq!(
            validation_message(t.validate()),
            "datasource tenant ID must match tenant ID"
        );
    }

    #[test]
    fn test_invalid_datasource_fails_tenant() {
        let mut t = tenant();
        t.datasources[0].pool_size = 0;
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("read".parse::<DatasourceRole>().unwrap(), DatasourceRole::Read);
        assert_eq!("rw".parse::<DatasourceRole>().unwrap(), DatasourceRole::ReadWrite);

        let err = "admin".parse::<DatasourceRole>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "validation failed: datasource role must be one of: read, write, rw"
        );
    }

    #[test]
    fn test_role_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&DatasourceRole::ReadWrite).unwrap(), "\"rw\"");
        assert!(serde_json::from_str::<DatasourceRole>("\"admin\"").is_err());
    }

    #[test]
    fn test_datasource_for_prefers_first_match() {
        let t = Tenant::new("acme")
            .with_datasource("store://read", DatasourceRole::Read, 1)
            .with_datasource("store://rw", DatasourceRole::ReadWrite, 2);
        assert_eq!(t.datasource_for(DatasourceRole::Write).unwrap().dsn, "store://rw");
        assert_eq!(t.datasource_for(DatasourceRole::Read).unwrap().dsn, "store://read");

        let t = Tenant::new("acme")
            .with_datasource("store://rw", DatasourceRole::ReadWrite, 2)
            .with_datasource("store://write", DatasourceRole::Write, 3);
        assert_eq!(t.datasource_for(DatasourceRole::Write).unwrap().dsn, "store://rw");
    }

    #[test]
    fn test_datasource_for_no_match() {
        let t = Tenant::new("acme").with_datasource("store://read", DatasourceRole::Read, 1);
        assert!(t.datasource_for(DatasourceRole::Write).is_none());
    }

    #[test]
    fn test_serialization_keeps_all_fields() {
        let t = tenant()
            .with_metadata("plan", "pro")
            .with_metadata("seats", 12);
        let json = serde_json::to_vec(&t).unwrap();
        let decoded: Tenant = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, t);
    }
}
