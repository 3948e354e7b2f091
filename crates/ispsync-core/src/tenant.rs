//! Tenant and session identity types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Identifier of one ISP organization on the platform.
///
/// Tenants are owned by the external platform database, so the id is the
/// numeric primary key it hands us rather than something generated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(i64);

impl TenantId {
    /// Create a tenant ID from the platform's primary key
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw id
    pub fn get(&self) -> i64 {
        self.0
    }

    /// Parse a tenant ID from a string
    pub fn from_string(s: &str) -> Result<Self> {
        let id = s
            .trim()
            .parse::<i64>()
            .map_err(|e| Error::InvalidTenant(format!("Invalid tenant ID format: {}", e)))?;
        Ok(Self(id))
    }
}

impl From<i64> for TenantId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

/// Platform role of an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    IspAdmin,
    IspStaff,
    Customer,
}

impl Role {
    /// Whether this role may watch a tenant's live operational dashboard
    pub fn can_watch_dashboard(&self) -> bool {
        matches!(self, Role::IspAdmin | Role::IspStaff)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::IspAdmin => "isp_admin",
            Role::IspStaff => "isp_staff",
            Role::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            "isp_admin" | "admin" => Ok(Role::IspAdmin),
            "isp_staff" | "staff" => Ok(Role::IspStaff),
            "customer" => Ok(Role::Customer),
            other => Err(Error::AuthorizationDenied(format!("unknown role '{}'", other))),
        }
    }
}

/// Caller identity as resolved by the external identity/session provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub user_id: i64,

    /// Tenant the user belongs to (super admins have none)
    pub tenant_id: Option<TenantId>,

    pub role: Role,
}

impl SessionIdentity {
    pub fn new(user_id: i64, tenant_id: Option<TenantId>, role: Role) -> Self {
        Self {
            user_id,
            tenant_id,
            role,
        }
    }

    /// Check that this identity may subscribe to `tenant_id`'s live channel.
    ///
    /// # Errors
    /// - `Error::AuthorizationDenied` if the role is not admin/staff or the
    ///   user belongs to a different tenant
    pub fn authorize_dashboard(&self, tenant_id: TenantId) -> Result<()> {
        if !self.role.can_watch_dashboard() {
            return Err(Error::AuthorizationDenied(format!(
                "role '{}' cannot subscribe to live updates",
                self.role
            )));
        }

        match self.tenant_id {
            Some(own) if own == tenant_id => Ok(()),
            Some(own) => Err(Error::AuthorizationDenied(format!(
                "user {} of tenant {} cannot subscribe to tenant {}",
                self.user_id, own, tenant_id
            ))),
            None => Err(Error::AuthorizationDenied(format!(
                "user {} has no tenant",
                self.user_id
            ))),
        }
    }
}
