//! ispsync Real-time Layer
//!
//! Pushes live operational state to dashboard sessions, scoped by tenant:
//! - [`TenantEventBus`]: one broadcast channel per tenant, delivering into
//!   each subscriber's own mailbox
//! - [`CacheStore`] and [`InMemoryCache`]: the shared cache whose
//!   tenant-scoped entries back the customer map
//! - [`CacheInvalidationHook`]: drops a tenant's cached map data and
//!   publishes a refresh event when a monitored entity changes
//! - [`ws::routes`]: the `/ws/map-updates` WebSocket endpoint
//!
//! # Example
//!
//! ```no_run
//! use ispsync_core::{Role, SessionIdentity, TenantId};
//! use ispsync_realtime::TenantEventBus;
//! use serde_json::json;
//!
//! let bus = TenantEventBus::new();
//! let tenant = TenantId::new(1);
//! let (conn, mut mailbox) = bus.connect();
//! let staff = SessionIdentity::new(7, Some(tenant), Role::IspStaff);
//!
//! bus.join(tenant, &staff, &conn)?;
//! assert_eq!(bus.publish(tenant, json!({"update_type": "router_status"})), 1);
//! assert!(mailbox.try_recv().is_ok());
//! # Ok::<(), ispsync_core::Error>(())
//! ```

pub mod bus;
pub mod cache;
pub mod hook;
pub mod ws;

pub use bus::{
    ConnectionHandle, ConnectionId, Delivery, FrameKind, Mailbox, POLICY_VIOLATION, RefreshFrame,
    TenantEventBus,
};
pub use cache::{CacheError, CacheResult, CacheStore, InMemoryCache};
pub use hook::{
    CacheInvalidationHook, InvalidationOutcome, MonitoredEntity, OwnerRef, ParentRouter,
    customer_locations_key,
};
