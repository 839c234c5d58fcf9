//! End-to-end scenarios from spec.md §8, driven through a real [`Server`]
//! against an in-memory [`sio_test_support::MockEngine`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use sio_protocol::{Packet, Value};
use sio_server::{AckReply, ConnectError, NamespaceHandlerBuilder, ServerConfig};
use sio_test_support::{connected_pair, Harness};

fn value_string(s: &str) -> Value {
    Value::String(s.to_string())
}

/// §8 scenario 5: with `always_connect`, a rejecting connect handler still
/// sends `CONNECT` before `DISCONNECT`, and never records `environ`.
#[tokio::test]
async fn always_connect_sends_connect_then_disconnect_on_rejection() {
    let config = ServerConfig::builder().always_connect(true).build();
    let harness = Harness::new(config);
    harness
        .server
        .register_namespace(
            NamespaceHandlerBuilder::new("/")
                .on_connect(Arc::new(|_sid, _env| async { Err(ConnectError::Rejected) }.boxed()))
                .build(),
        )
        .unwrap();

    let mut rx = harness.engine.register("sid1");
    harness.server.handle_engine_connect("sid1", serde_json::Value::Null).await;

    let first = rx.recv().await.expect("CONNECT frame");
    let second = rx.recv().await.expect("DISCONNECT frame");

    let sio_server::Frame::Text(first_text) = first else { panic!("expected text frame") };
    let sio_server::Frame::Text(second_text) = second else { panic!("expected text frame") };
    assert_eq!(Packet::decode(&first_text).unwrap().r#type, sio_server::PacketType::Connect);
    assert_eq!(Packet::decode(&second_text).unwrap().r#type, sio_server::PacketType::Disconnect);

    assert!(harness.server.environ("sid1").is_none());
}

/// A plain (non-`always_connect`) rejection sends neither packet.
#[tokio::test]
async fn plain_rejection_sends_nothing() {
    let harness = Harness::new(ServerConfig::default());
    harness
        .server
        .register_namespace(
            NamespaceHandlerBuilder::new("/")
                .on_connect(Arc::new(|_sid, _env| async { Err(ConnectError::Rejected) }.boxed()))
                .build(),
        )
        .unwrap();

    let mut rx = harness.engine.register("sid1");
    harness.server.handle_engine_connect("sid1", serde_json::Value::Null).await;

    assert!(rx.try_recv().is_err());
    assert!(harness.server.environ("sid1").is_none());
}

/// A connect handler that raises the refusal sentinel gets an `ERROR`
/// packet carrying its payload (§7.2).
#[tokio::test]
async fn connect_refused_with_payload_sends_error_packet() {
    let harness = Harness::new(ServerConfig::default());
    harness
        .server
        .register_namespace(
            NamespaceHandlerBuilder::new("/")
                .on_connect(Arc::new(|_sid, _env| {
                    async { Err(ConnectError::Refused(Some(serde_json::json!("not authorized")))) }.boxed()
                }))
                .build(),
        )
        .unwrap();

    let mut rx = harness.engine.register("sid1");
    harness.server.handle_engine_connect("sid1", serde_json::Value::Null).await;

    let frame = rx.recv().await.expect("ERROR frame");
    let sio_server::Frame::Text(text) = frame else { panic!("expected text frame") };
    let packet = Packet::decode(&text).unwrap();
    assert_eq!(packet.r#type, sio_server::PacketType::ConnectError);
    assert_eq!(packet.data, value_string("not authorized"));
}

/// §8 scenario 6: on `eio_disconnect`, the `disconnect` event fires in
/// connection order with the default namespace last; `environ` is cleared
/// and the sid is gone from every namespace's rooms.
#[tokio::test]
async fn eio_disconnect_fires_events_in_connect_order_default_last() {
    let harness = Harness::new(ServerConfig::default());
    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    for ns in ["/", "/foo", "/bar"] {
        let order = Arc::clone(&order);
        let ns_owned = ns.to_string();
        harness
            .server
            .register_namespace(
                NamespaceHandlerBuilder::new(ns)
                    .on_disconnect(Arc::new(move |_sid| {
                        let order = Arc::clone(&order);
                        let ns_owned = ns_owned.clone();
                        async move { order.lock().unwrap().push(ns_owned) }.boxed()
                    }))
                    .build(),
            )
            .unwrap();
    }

    let mut rx = harness.engine.register("sid1");
    harness.server.handle_engine_connect("sid1", serde_json::Value::Null).await;
    let _connect_root = rx.recv().await.unwrap();

    for ns in ["/foo", "/bar"] {
        let packet = Packet::connect(ns, Value::Null).unwrap();
        harness
            .server
            .handle_engine_message("sid1", sio_server::Frame::Text(packet.encode().text))
            .await;
        let _connect_ns = rx.recv().await.unwrap();
    }

    harness.server.handle_engine_disconnect("sid1").await;

    assert_eq!(*order.lock().unwrap(), vec!["/foo".to_string(), "/bar".to_string(), "/".to_string()]);
    assert!(harness.server.environ("sid1").is_none());
    for ns in ["/", "/foo", "/bar"] {
        assert!(!harness.server.manager().is_connected("sid1", ns));
        assert!(harness.server.manager().get_participants(ns, None).is_empty());
    }
}

/// §8 scenario 1: three sids connect to `/foo`, two enter room `bar`;
/// emitting to `bar` reaches exactly those two.
#[tokio::test]
async fn emit_to_room_reaches_exactly_its_members() {
    let harness = Harness::new(ServerConfig::default());
    for sid in ["1", "2", "3"] {
        harness.server.handle_engine_connect(sid, serde_json::Value::Null).await;
        harness.engine.register(sid);
        harness
            .server
            .handle_engine_message(sid, sio_server::Frame::Text(Packet::connect("/foo", Value::Null).unwrap().encode().text))
            .await;
    }
    harness.server.manager().enter_room("1", "/foo", "bar");
    harness.server.manager().enter_room("2", "/foo", "bar");

    harness.server.emit("e", vec![value_string("hi")], "/foo", Some("bar"), &[]).await.unwrap();

    let mut reached: Vec<String> = harness.server.manager().get_participants("/foo", Some("bar"));
    reached.sort();
    assert_eq!(reached, vec!["1".to_string(), "2".to_string()]);
}

/// §8 scenario 2: the server's ack-id allocation is scoped per (sid, ns)
/// and starts at 1; the ack round-trips through a real `Server::call`.
#[tokio::test]
async fn call_allocates_ack_id_one_and_resolves_on_ack() {
    let (server, client) = connected_pair().await;
    client.on_event(
        "/",
        "x",
        Arc::new(|args: Vec<Value>| async move { sio_client::AckReply::Multi(args) }.boxed()),
    );

    let result = server.call("x", vec![value_string("x"), Value::Number(2.into())], Some("1"), "/", Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(result, vec![value_string("x"), Value::Number(2.into())]);
}

/// `Server::call` without a target sid is a structural error, not a
/// broadcast (§4.3 "Synchronous call").
#[tokio::test]
async fn call_without_sid_is_rejected() {
    let harness = Harness::new(ServerConfig::default());
    let err = harness.server.call("x", vec![], None, "/", None).await.unwrap_err();
    assert!(matches!(err, sio_server::Error::BroadcastCallNotSupported));
}

/// `Server::call` requires `async_handlers`.
#[tokio::test]
async fn call_requires_async_handlers() {
    let config = ServerConfig::builder().async_handlers(false).build();
    let harness = Harness::new(config);
    let err = harness.server.call("x", vec![], Some("1"), "/", None).await.unwrap_err();
    assert!(matches!(err, sio_server::Error::CallRequiresAsyncHandlers));
}

/// `Server::call` surfaces a timeout when the ack never arrives (§7.4).
#[tokio::test]
async fn call_times_out_without_an_ack() {
    let (server, _client) = connected_pair().await;
    let err = server
        .call("never-acked", vec![], Some("1"), "/", Some(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(matches!(err, sio_server::Error::Timeout));
}

/// `Server::emit`/`call` surface the underlying engine's rejection instead
/// of only logging it: a sid the manager still considers connected but
/// whose transport session the engine has already forgotten.
#[tokio::test]
async fn emit_surfaces_an_engine_rejection() {
    let harness = Harness::new(ServerConfig::default());
    // joins the manager's room table without ever registering with the
    // mock engine, so `engine.send` rejects every frame for this sid.
    harness.server.handle_engine_connect("sid1", serde_json::Value::Null).await;

    let err = harness.server.emit("e", vec![], "/", Some("sid1"), &[]).await.unwrap_err();
    assert!(matches!(err, sio_server::Error::Engine(_)));
}

/// Registering a blocking handler while `async_handlers` is on fails at
/// registration time (§4.5).
#[test]
fn mismatched_concurrency_model_fails_registration() {
    let harness_rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    harness_rt.block_on(async {
        let harness = Harness::new(ServerConfig::default()); // async_handlers: true by default
        let result = harness.server.register_namespace(
            NamespaceHandlerBuilder::new("/")
                .on_blocking("e", Arc::new(|_sid, _args| async { AckReply::None }.boxed()))
                .build(),
        );
        assert!(matches!(result, Err(sio_server::Error::RegistrationError(_))));
    });
}

/// Application-initiated disconnect tears down the transport for `"/"`.
#[tokio::test]
async fn application_disconnect_of_root_closes_the_transport() {
    let harness = Harness::new(ServerConfig::default());
    harness.server.handle_engine_connect("sid1", serde_json::Value::Null).await;
    let mut rx = harness.engine.register("sid1");

    harness.server.disconnect("sid1", "/").await;

    let frame = rx.recv().await.expect("DISCONNECT frame");
    let sio_server::Frame::Text(text) = frame else { panic!("expected text frame") };
    assert_eq!(Packet::decode(&text).unwrap().r#type, sio_server::PacketType::Disconnect);
    assert!(!harness.engine.is_registered("sid1"));
}

/// Handlers that are never registered for an event are silently ignored,
/// not dispatched (§4.3 "EVENT").
#[tokio::test]
async fn event_with_no_registered_handler_is_ignored() {
    let (server, client) = connected_pair().await;
    client.emit("/", "nobody-home", vec![value_string("x")]).await.unwrap();
    // give the server a moment to process; nothing should panic or hang.
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(server);
}

/// Sanity check for the harness the rest of this file leans on: a fresh
/// pair is already past the `/` `CONNECT` round trip.
#[tokio::test]
async fn connected_pair_harness_reaches_the_default_namespace() {
    let (_server, client) = connected_pair().await;
    assert!(client.is_namespace_active("/"));
}
