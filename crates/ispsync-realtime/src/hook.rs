//! Cache invalidation on monitored-entity mutations
//!
//! The platform reports every save of a router, device, subscription or
//! payment here. Mutations that change what the tenant's customer map shows
//! drop the tenant's cached map data and push one refresh event to its live
//! dashboards.

use crate::bus::TenantEventBus;
use crate::cache::CacheStore;
use chrono::Utc;
use ispsync_core::TenantId;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Cache key of a tenant's customer map pins
pub fn customer_locations_key(tenant: TenantId) -> String {
    format!("customer_locations_{}", tenant)
}

/// The platform user that owns an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub user_id: i64,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
}

/// Router a device hangs off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentRouter {
    pub router_id: i64,
    #[serde(default)]
    pub owner: Option<OwnerRef>,
}

/// A saved entity, as reported by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum MonitoredEntity {
    Router {
        router_id: i64,
        is_online: bool,
        #[serde(default)]
        owner: Option<OwnerRef>,
    },
    Device {
        device_id: i64,
        is_online: bool,
        #[serde(default)]
        router: Option<ParentRouter>,
    },
    Subscription {
        subscription_id: i64,
        is_active: bool,
        #[serde(default)]
        plan_name: Option<String>,
        #[serde(default)]
        owner: Option<OwnerRef>,
    },
    Payment {
        reference: String,
        status: String,
        #[serde(default)]
        owner: Option<OwnerRef>,
    },
}

impl MonitoredEntity {
    /// Tenant of the owning user; a device resolves through its router
    pub fn tenant(&self) -> Option<TenantId> {
        let owner = match self {
            MonitoredEntity::Router { owner, .. }
            | MonitoredEntity::Subscription { owner, .. }
            | MonitoredEntity::Payment { owner, .. } => owner.as_ref(),
            MonitoredEntity::Device { router, .. } => {
                router.as_ref().and_then(|r| r.owner.as_ref())
            }
        };
        owner.and_then(|o| o.tenant_id)
    }

    /// `update_type` of the refresh event, or `None` when this mutation
    /// does not affect the map
    pub fn update_type(&self) -> Option<&'static str> {
        match self {
            MonitoredEntity::Router { .. } => Some("router_status"),
            MonitoredEntity::Device { .. } => Some("device_status"),
            MonitoredEntity::Subscription { .. } => Some("subscription_activated"),
            MonitoredEntity::Payment { status, .. } if status.eq_ignore_ascii_case("completed") => {
                Some("payment_completed")
            }
            MonitoredEntity::Payment { .. } => None,
        }
    }

    /// `data` of the refresh event
    pub fn describe(&self) -> Value {
        match self {
            MonitoredEntity::Router {
                router_id,
                is_online,
                owner,
            } => json!({
                "router_id": router_id,
                "is_online": is_online,
                "user_id": owner.as_ref().map(|o| o.user_id),
            }),
            MonitoredEntity::Device {
                device_id,
                is_online,
                router,
            } => json!({
                "device_id": device_id,
                "is_online": is_online,
                "router_id": router.as_ref().map(|r| r.router_id),
            }),
            MonitoredEntity::Subscription {
                subscription_id,
                is_active,
                plan_name,
                owner,
            } => json!({
                "user_id": owner.as_ref().map(|o| o.user_id),
                "subscription_id": subscription_id,
                "plan_name": plan_name,
                "is_active": is_active,
            }),
            MonitoredEntity::Payment {
                reference, owner, ..
            } => json!({
                "user_id": owner.as_ref().map(|o| o.user_id),
                "reference": reference,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationOutcome {
    /// No tenant, or a mutation the map does not show
    Ignored,
    Applied {
        tenant: TenantId,
        cache_cleared: bool,
        delivered: usize,
    },
}

/// Runs on every monitored-entity mutation. Never fails.
#[derive(Clone)]
pub struct CacheInvalidationHook {
    cache: Arc<dyn CacheStore>,
    bus: Arc<TenantEventBus>,
}

impl CacheInvalidationHook {
    pub fn new(cache: Arc<dyn CacheStore>, bus: Arc<TenantEventBus>) -> Self {
        Self { cache, bus }
    }

    #[instrument(skip(self, entity), fields(update_type = entity.update_type()))]
    pub async fn on_mutation(&self, entity: &MonitoredEntity) -> InvalidationOutcome {
        let Some(update_type) = entity.update_type() else {
            debug!("mutation does not affect the customer map");
            return InvalidationOutcome::Ignored;
        };
        let Some(tenant) = entity.tenant() else {
            debug!("entity has no tenant; nothing to invalidate");
            return InvalidationOutcome::Ignored;
        };

        let key = customer_locations_key(tenant);
        let cache_cleared = match self.cache.delete(&key).await {
            Ok(removed) => {
                info!(tenant_id = %tenant, removed, "Cleared {} after {}", key, update_type);
                true
            }
            Err(e) => {
                error!(tenant_id = %tenant, "Failed to clear {}: {}", key, e);
                false
            }
        };

        let event = json!({
            "update_type": update_type,
            "data": entity.describe(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        let delivered = self.bus.publish(tenant, event);

        InvalidationOutcome::Applied {
            tenant,
            cache_cleared,
            delivered,
        }
    }
}
