//! End-to-end tests of the map-updates WebSocket over a real listener

use futures::{SinkExt, StreamExt};
use ispsync_core::TenantId;
use ispsync_realtime::{
    CacheInvalidationHook, CacheStore, InMemoryCache, MonitoredEntity, OwnerRef, TenantEventBus,
    customer_locations_key, ws,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{
    self, Message,
    client::IntoClientRequest,
    http::HeaderValue,
    protocol::frame::coding::CloseCode,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(bus: Arc<TenantEventBus>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, ws::routes(bus)).await.unwrap();
    });
    addr
}

async fn dial(
    addr: SocketAddr,
    headers: &[(&'static str, &'static str)],
) -> Result<Client, tungstenite::Error> {
    let mut request = format!("ws://{}{}", addr, ws::MAP_UPDATES_PATH)
        .into_client_request()
        .unwrap();
    for (name, value) in headers {
        request
            .headers_mut()
            .insert(*name, HeaderValue::from_static(*value));
    }
    tokio_tungstenite::connect_async(request)
        .await
        .map(|(stream, _)| stream)
}

async fn wait_for_subscribers(bus: &TenantEventBus, tenant: TenantId, count: usize) {
    for _ in 0..100 {
        if bus.subscriber_count(tenant) == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "tenant {} never reached {} subscribers (has {})",
        tenant,
        count,
        bus.subscriber_count(tenant)
    );
}

async fn next_json(client: &mut Client) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("socket closed")
        .expect("socket error");
    serde_json::from_str(message.to_text().unwrap()).unwrap()
}

const STAFF_T1: [(&str, &str); 3] = [
    ("x-user-id", "10"),
    ("x-tenant-id", "1"),
    ("x-user-role", "isp_staff"),
];

#[tokio::test]
async fn test_publish_reaches_only_own_tenant() {
    let bus = Arc::new(TenantEventBus::new());
    let addr = start_server(bus.clone()).await;

    let mut a = dial(addr, &STAFF_T1).await.unwrap();
    let mut b = dial(
        addr,
        &[("x-user-id", "11"), ("x-tenant-id", "1"), ("x-user-role", "isp_admin")],
    )
    .await
    .unwrap();
    let mut c = dial(
        addr,
        &[("x-user-id", "20"), ("x-tenant-id", "2"), ("x-user-role", "isp_admin")],
    )
    .await
    .unwrap();
    wait_for_subscribers(&bus, TenantId::new(1), 2).await;
    wait_for_subscribers(&bus, TenantId::new(2), 1).await;

    assert_eq!(bus.publish(TenantId::new(1), json!({"update_type": "router_status"})), 2);

    let expected = json!({"message": {"update_type": "router_status"}, "type": "refresh"});
    assert_eq!(next_json(&mut a).await, expected);
    assert_eq!(next_json(&mut b).await, expected);

    let silent = tokio::time::timeout(Duration::from_millis(200), c.next()).await;
    assert!(silent.is_err(), "tenant 2 must not see tenant 1 events");
}

#[tokio::test]
async fn test_inbound_message_is_rebroadcast() {
    let bus = Arc::new(TenantEventBus::new());
    let addr = start_server(bus.clone()).await;

    let mut a = dial(addr, &STAFF_T1).await.unwrap();
    let mut b = dial(addr, &STAFF_T1).await.unwrap();
    wait_for_subscribers(&bus, TenantId::new(1), 2).await;

    a.send(Message::text(r#"{"message": "reload"}"#)).await.unwrap();

    let expected = json!({"message": "reload", "type": "refresh"});
    assert_eq!(next_json(&mut a).await, expected);
    assert_eq!(next_json(&mut b).await, expected);
}

#[tokio::test]
async fn test_invalid_inbound_frame_is_ignored() {
    let bus = Arc::new(TenantEventBus::new());
    let addr = start_server(bus.clone()).await;

    let mut a = dial(addr, &STAFF_T1).await.unwrap();
    wait_for_subscribers(&bus, TenantId::new(1), 1).await;

    a.send(Message::text("garbage")).await.unwrap();
    a.send(Message::text(r#"{"message": 1}"#)).await.unwrap();

    assert_eq!(next_json(&mut a).await, json!({"message": 1, "type": "refresh"}));
}

#[tokio::test]
async fn test_missing_identity_is_refused_before_upgrade() {
    let bus = Arc::new(TenantEventBus::new());
    let addr = start_server(bus).await;

    let err = dial(addr, &[("x-user-id", "10")]).await.unwrap_err();
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("expected HTTP 401, got {:?}", other),
    }
}

#[tokio::test]
async fn test_customer_role_is_closed_with_policy_violation() {
    let bus = Arc::new(TenantEventBus::new());
    let addr = start_server(bus.clone()).await;

    let mut client = dial(
        addr,
        &[("x-user-id", "30"), ("x-tenant-id", "1"), ("x-user-role", "customer")],
    )
    .await
    .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match message {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => panic!("expected a close frame, got {:?}", other),
    }
    assert_eq!(bus.subscriber_count(TenantId::new(1)), 0);
}

#[tokio::test]
async fn test_closing_socket_leaves_channel() {
    let bus = Arc::new(TenantEventBus::new());
    let addr = start_server(bus.clone()).await;

    let mut a = dial(addr, &STAFF_T1).await.unwrap();
    wait_for_subscribers(&bus, TenantId::new(1), 1).await;

    a.close(None).await.unwrap();
    wait_for_subscribers(&bus, TenantId::new(1), 0).await;
    assert_eq!(bus.channel_count(), 0);
}

#[tokio::test]
async fn test_mutation_hook_pushes_to_dashboard() {
    let bus = Arc::new(TenantEventBus::new());
    let cache = Arc::new(InMemoryCache::new());
    let addr = start_server(bus.clone()).await;
    let tenant = TenantId::new(1);

    cache
        .set(&customer_locations_key(tenant), json!([]), None)
        .await
        .unwrap();
    let mut a = dial(addr, &STAFF_T1).await.unwrap();
    wait_for_subscribers(&bus, tenant, 1).await;

    let hook = CacheInvalidationHook::new(cache.clone(), bus.clone());
    hook.on_mutation(&MonitoredEntity::Router {
        router_id: 5,
        is_online: false,
        owner: Some(OwnerRef {
            user_id: 99,
            tenant_id: Some(tenant),
        }),
    })
    .await;

    let frame = next_json(&mut a).await;
    assert_eq!(frame["type"], "refresh");
    assert_eq!(frame["message"]["update_type"], "router_status");
    assert_eq!(frame["message"]["data"]["is_online"], false);
    assert_eq!(cache.get("customer_locations_1").await.unwrap(), None);
}
