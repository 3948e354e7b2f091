//! `/ws/map-updates`: live customer-map updates over WebSocket
//!
//! The upstream identity provider authenticates the caller and forwards
//! the resolved identity as `x-user-id`, `x-tenant-id` and `x-user-role`
//! headers. Requests without a readable identity are refused before the
//! upgrade; identities that may not watch their tenant are upgraded and then
//! closed with a policy-violation frame.

use crate::bus::{ConnectionHandle, Delivery, Mailbox, POLICY_VIOLATION, TenantEventBus};
use axum::{
    Router,
    extract::{
        FromRequestParts, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, request::Parts},
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use ispsync_core::{Role, SessionIdentity, TenantId};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const MAP_UPDATES_PATH: &str = "/ws/map-updates";

/// Caller identity read from the identity provider's headers
#[derive(Debug, Clone)]
pub struct HeaderIdentity(pub SessionIdentity);

impl<S: Send + Sync> FromRequestParts<S> for HeaderIdentity {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        const UNAUTHORIZED: (StatusCode, &str) = (StatusCode::UNAUTHORIZED, "missing or invalid identity");

        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());

        let user_id = header("x-user-id")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or(UNAUTHORIZED)?;
        let role = header("x-user-role")
            .and_then(|v| v.parse::<Role>().ok())
            .ok_or(UNAUTHORIZED)?;
        let tenant_id = match header("x-tenant-id") {
            Some(raw) => Some(TenantId::from_string(raw).map_err(|_| UNAUTHORIZED)?),
            None => None,
        };

        Ok(HeaderIdentity(SessionIdentity::new(user_id, tenant_id, role)))
    }
}

/// Router serving [`MAP_UPDATES_PATH`] from `bus`
pub fn routes(bus: Arc<TenantEventBus>) -> Router {
    Router::new()
        .route(MAP_UPDATES_PATH, get(map_updates))
        .with_state(bus)
}

async fn map_updates(
    State(bus): State<Arc<TenantEventBus>>,
    HeaderIdentity(identity): HeaderIdentity,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| serve_socket(socket, bus, identity))
}

/// One task per socket: forwards mailbox deliveries out and inbound frames
/// to the bus until either side closes.
async fn serve_socket(mut socket: WebSocket, bus: Arc<TenantEventBus>, identity: SessionIdentity) {
    let (conn, mut mailbox) = bus.connect();

    let Some(tenant) = identity.tenant_id else {
        warn!(user_id = identity.user_id, "Rejected live-update subscription: no tenant");
        let _ = socket
            .send(close_message(POLICY_VIOLATION, "no tenant"))
            .await;
        return;
    };

    if bus.join(tenant, &identity, &conn).is_err() {
        let notice = match mailbox.recv().await {
            Some(Delivery::Close { code, reason }) => close_message(code, &reason),
            _ => close_message(POLICY_VIOLATION, "not allowed"),
        };
        let _ = socket.send(notice).await;
        return;
    }

    info!(tenant_id = %tenant, connection = %conn.id(), "map-updates socket opened");
    pump(socket, &bus, tenant, &conn, &mut mailbox).await;
    bus.leave(tenant, &conn);
    info!(tenant_id = %tenant, connection = %conn.id(), "map-updates socket closed");
}

async fn pump(
    socket: WebSocket,
    bus: &TenantEventBus,
    tenant: TenantId,
    conn: &ConnectionHandle,
    mailbox: &mut Mailbox,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            delivery = mailbox.recv() => match delivery {
                Some(Delivery::Frame(frame)) => {
                    let text = match serde_json::to_string(frame.as_ref()) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(tenant_id = %tenant, "Dropping unserializable frame: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Delivery::Close { code, reason }) => {
                    let _ = sink.send(close_message(code, &reason)).await;
                    break;
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = bus.receive(tenant, conn, text.as_str()) {
                        warn!(tenant_id = %tenant, connection = %conn.id(), "Ignoring inbound frame: {}", e);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection = %conn.id(), error = %e, "socket read error");
                    break;
                }
            },
        }
    }
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}
