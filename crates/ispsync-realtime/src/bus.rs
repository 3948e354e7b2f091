//! Tenant-scoped broadcast channels
//!
//! Every tenant with at least one live dashboard has a channel holding the
//! mailboxes of its subscribers. Publishing hands the event to each mailbox;
//! the subscriber's own task drains it and writes to its socket. The bus
//! never touches a subscriber's socket or state directly.
//!
//! Uses DashMap so publishes to different tenants never contend. Publishing
//! to one tenant holds that channel's entry for the duration of the fan-out,
//! which serializes publishes per tenant and gives every subscriber the
//! events in publish order.

use dashmap::DashMap;
use ispsync_core::{Error, Result, SessionIdentity, TenantId};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// WebSocket close code for policy violations (RFC 6455)
pub const POLICY_VIOLATION: u16 = 1008;

static GLOBAL: Lazy<Arc<TenantEventBus>> = Lazy::new(|| Arc::new(TenantEventBus::new()));

/// Identifier of one subscriber connection, unique per bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Refresh,
}

/// Outbound wire frame: `{"message": any, "type": "refresh"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshFrame {
    pub message: Value,
    #[serde(rename = "type")]
    pub kind: FrameKind,
}

impl RefreshFrame {
    pub fn new(message: Value) -> Self {
        Self {
            message,
            kind: FrameKind::Refresh,
        }
    }
}

/// Inbound wire frame: `{"message": any}`
#[derive(Debug, Deserialize)]
struct InboundFrame {
    message: Value,
}

/// What a subscriber's mailbox can receive
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Frame(Arc<RefreshFrame>),
    /// The connection must be closed with this code and reason
    Close { code: u16, reason: String },
}

pub type Mailbox = mpsc::UnboundedReceiver<Delivery>;

/// Sending half of one subscriber connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Ask the subscriber's task to close its socket
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        // A dropped mailbox means the socket is already gone
        let _ = self.tx.send(Delivery::Close {
            code,
            reason: reason.into(),
        });
    }
}

/// Process-wide registry of tenant channels
#[derive(Debug, Default)]
pub struct TenantEventBus {
    channels: DashMap<TenantId, HashMap<ConnectionId, mpsc::UnboundedSender<Delivery>>>,
    next_id: AtomicU64,
}

impl TenantEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bus shared by the whole process
    pub fn global() -> Arc<TenantEventBus> {
        Arc::clone(&GLOBAL)
    }

    /// Create a subscriber connection. The mailbox belongs to the task that
    /// serves the subscriber.
    pub fn connect(&self) -> (ConnectionHandle, Mailbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        (ConnectionHandle { id, tx }, rx)
    }

    /// Subscribe `conn` to `tenant`'s channel.
    ///
    /// # Errors
    /// - `Error::AuthorizationDenied` if `identity` may not watch `tenant`;
    ///   the connection is told to close and does not join
    pub fn join(
        &self,
        tenant: TenantId,
        identity: &SessionIdentity,
        conn: &ConnectionHandle,
    ) -> Result<()> {
        if let Err(e) = identity.authorize_dashboard(tenant) {
            warn!(
                tenant_id = %tenant,
                user_id = identity.user_id,
                role = %identity.role,
                "Rejected live-update subscription: {}",
                e
            );
            conn.close(POLICY_VIOLATION, "not allowed to watch this tenant");
            return Err(e);
        }

        self.channels
            .entry(tenant)
            .or_default()
            .insert(conn.id, conn.tx.clone());
        info!(tenant_id = %tenant, connection = %conn.id, "subscriber joined");
        Ok(())
    }

    /// Unsubscribe `conn`. A no-op if it never joined. The channel goes
    /// away with its last subscriber.
    pub fn leave(&self, tenant: TenantId, conn: &ConnectionHandle) {
        let removed = self
            .channels
            .get_mut(&tenant)
            .and_then(|mut members| members.remove(&conn.id))
            .is_some();
        self.channels.remove_if(&tenant, |_, members| members.is_empty());

        if removed {
            debug!(tenant_id = %tenant, connection = %conn.id, "subscriber left");
        }
    }

    /// Deliver `message` to every subscriber of `tenant` joined right now.
    ///
    /// Returns the number of deliveries. Callable from synchronous code;
    /// mailboxes whose task has exited are dropped from the channel.
    pub fn publish(&self, tenant: TenantId, message: Value) -> usize {
        let frame = Arc::new(RefreshFrame::new(message));

        let delivered = match self.channels.get_mut(&tenant) {
            Some(mut members) => {
                members.retain(|id, tx| {
                    let alive = tx.send(Delivery::Frame(Arc::clone(&frame))).is_ok();
                    if !alive {
                        debug!(tenant_id = %tenant, connection = %id, "pruned closed mailbox");
                    }
                    alive
                });
                members.len()
            }
            None => 0,
        };
        self.channels.remove_if(&tenant, |_, members| members.is_empty());

        debug!(tenant_id = %tenant, delivered, "published refresh event");
        delivered
    }

    /// Handle a frame sent by `conn`: re-broadcast its `message` to the
    /// whole tenant, sender included.
    ///
    /// # Errors
    /// - `Error::Serialization` if `raw` is not `{"message": ...}`
    /// - `Error::AuthorizationDenied` if `conn` has not joined `tenant`
    pub fn receive(&self, tenant: TenantId, conn: &ConnectionHandle, raw: &str) -> Result<usize> {
        let inbound: InboundFrame = serde_json::from_str(raw)?;
        if !self.is_member(tenant, conn.id) {
            return Err(Error::AuthorizationDenied(format!(
                "{} is not subscribed to tenant {}",
                conn.id, tenant
            )));
        }
        Ok(self.publish(tenant, inbound.message))
    }

    /// Number of subscribers currently joined to `tenant`
    pub fn subscriber_count(&self, tenant: TenantId) -> usize {
        self.channels.get(&tenant).map_or(0, |members| members.len())
    }

    /// Number of tenants with at least one subscriber
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn is_member(&self, tenant: TenantId, id: ConnectionId) -> bool {
        self.channels
            .get(&tenant)
            .is_some_and(|members| members.contains_key(&id))
    }
}
