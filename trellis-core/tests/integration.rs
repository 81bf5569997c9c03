//! Integration Tests
//!
//! These tests drive the public API end to end: reactive propagation, route
//! scanning, and a counter page served over a real live connection.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use trellis_core::http::HttpRequest;
use trellis_core::protocol::{ClientEvent, ClientMessage, Frame, ServerMessage};
use trellis_core::reactive::Runtime;
use trellis_core::routing::{
    build_route_table, match_route, RouteEntry, RouteKind, RoutePattern, RouteTable,
};
use trellis_core::session::ChannelTransport;
use trellis_core::view::{el, fragment, text};
use trellis_core::{App, AppConfig, ArtifactRegistry, Server};

/// Test that setting a signal to an equal value notifies nobody.
#[test]
fn equal_set_does_not_notify() {
    let rt = Runtime::new();
    let value = rt.signal(7);
    let runs = Arc::new(AtomicI32::new(0));

    let _effect = rt.effect({
        let (value, runs) = (value.clone(), runs.clone());
        move || {
            value.get();
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });

    value.set(7);
    assert_eq!(value.get(), 7);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    value.set(8);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test that a clean computed returns its cache without re-running.
#[test]
fn computed_reads_are_cached_until_a_source_changes() {
    let rt = Runtime::new();
    let base = rt.signal(2);
    let evaluations = Arc::new(AtomicI32::new(0));

    let squared = rt.computed({
        let (base, evaluations) = (base.clone(), evaluations.clone());
        move || {
            evaluations.fetch_add(1, Ordering::SeqCst);
            base.get() * base.get()
        }
    });

    assert_eq!(squared.get(), Some(4));
    assert_eq!(squared.get(), Some(4));
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);

    base.set(3);
    assert!(squared.is_dirty());
    assert_eq!(squared.get(), Some(9));
    assert_eq!(evaluations.load(Ordering::SeqCst), 2);
}

/// Test that an effect depending on a computed follows the signal below it.
#[test]
fn effect_observes_through_computed() {
    let rt = Runtime::new();
    let first = rt.signal(String::from("Ada"));
    let greeting = rt.computed({
        let first = first.clone();
        move || format!("Hello, {}", first.get())
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _effect = rt.effect({
        let (greeting, seen) = (greeting.clone(), seen.clone());
        move || seen.lock().push(greeting.get().unwrap_or_default())
    });

    first.set("Grace".into());
    assert_eq!(*seen.lock(), vec!["Hello, Ada", "Hello, Grace"]);
}

/// Test that a batch coalesces effect runs into one, with the final value.
#[test]
fn batch_coalesces_effect_runs() {
    let rt = Runtime::new();
    let x = rt.signal(0);
    let log = Arc::new(Mutex::new(Vec::new()));

    let _effect = rt.effect({
        let (x, log) = (x.clone(), log.clone());
        move || log.lock().push(x.get())
    });

    rt.batch(|| {
        x.set(1);
        x.set(2);
        x.set(3);
    });

    assert_eq!(*log.lock(), vec![0, 3]);
}

/// Test that two runtimes never see each other's reads.
#[test]
fn runtimes_are_isolated() {
    let a = Runtime::new();
    let b = Runtime::new();
    let in_a = a.signal(1);
    let runs = Arc::new(AtomicI32::new(0));

    let _effect = b.effect({
        let (in_a, runs) = (in_a.clone(), runs.clone());
        move || {
            in_a.get();
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });

    in_a.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(in_a.subscriber_count(), 0);
}

fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

/// Test scanning a real app directory and matching against the result.
#[test]
fn scanned_routes_match_paths() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(root, "page.rs");
    touch(root, "about/page.rs");
    touch(root, "users/[id]/page.rs");
    touch(root, "_drafts/page.rs");

    let table = build_route_table(root, &["rs".to_string()]).unwrap();
    assert_eq!(table.len(), 3);

    let user = match_route("/users/42", &table).unwrap();
    assert_eq!(user.entry.pattern().as_str(), "/users/[id]");
    assert_eq!(user.params.get("id").map(String::as_str), Some("42"));

    assert!(match_route("/users/", &table).is_none());
    assert!(match_route("/users/42/extra", &table).is_none());
    assert_eq!(
        match_route("/about/", &table).unwrap().entry.pattern().as_str(),
        "/about"
    );
    assert!(match_route("/_drafts", &table).is_none());
}

fn counter_app(config: AppConfig) -> Arc<App> {
    let registry = ArtifactRegistry::new()
        .layout("layout", |_, inner| Ok(el("main").child(inner).into()))
        .page("page", |cx| {
            let session = cx.session;
            let count = session.runtime().signal(0);

            session.register_island("counter", {
                let count = count.clone();
                move || text(count.get())
            });
            session.register_island("title", || text("Counter"));
            session.on("inc", "click", {
                let count = count.clone();
                move |_, _| {
                    count.update(|n| *n += 1);
                    Ok(())
                }
            });

            Ok(fragment([
                session.island("counter", text(count.get())),
                session.island("title", text("Counter")),
                el("button").id("inc").child(text("+")).into(),
            ]))
        });

    let routes = RouteTable::from_entries([RouteEntry::new(
        RoutePattern::parse("/").unwrap(),
        RouteKind::Page,
        "page",
    )
    .with_layouts(vec!["layout".into()])]);

    Arc::new(App::new(config, registry, routes))
}

fn json_frame(message: &ClientMessage) -> Frame {
    Frame::Text(serde_json::to_string(message).unwrap())
}

/// Test the initial render of the counter page.
#[test]
fn initial_render_contains_island_markup() {
    let app = counter_app(AppConfig::default());
    let response = app.handle_http(&HttpRequest::get("/"));

    assert_eq!(response.status, 200);
    let body = response.body_text();
    assert!(body.contains(
        r#"<main><div data-island="counter">0</div><div data-island="title">Counter</div><button id="inc">+</button></main>"#
    ));
    // The ephemeral session is gone with the response.
    assert!(app.sessions().is_empty());
}

/// Test that one click produces exactly one patch containing the new count,
/// and none for the island that does not read the counter.
#[test]
fn click_produces_one_patch() {
    let app = counter_app(AppConfig::default());
    let (transport, mut rx) = ChannelTransport::pair();
    let session = app.sessions().open(Arc::new(transport));

    app.handle_frame(&session, &json_frame(&ClientMessage::Init { path: "/".into() }))
        .unwrap();
    assert!(rx.try_recv().is_err());

    let click = ClientMessage::Event(ClientEvent::new("inc", "click"));
    app.handle_frame(&session, &json_frame(&click)).unwrap();

    let Frame::Text(json) = rx.try_recv().unwrap() else {
        panic!("expected a text frame");
    };
    let patch: ServerMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(
        patch,
        ServerMessage::Patch {
            island: "counter".into(),
            html: "1".into(),
        }
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(session.baseline("title").as_deref(), Some("Counter"));
}

/// Test that events without a handler change nothing.
#[test]
fn unknown_events_are_ignored() {
    let app = counter_app(AppConfig::default());
    let (transport, mut rx) = ChannelTransport::pair();
    let session = app.sessions().open(Arc::new(transport));

    app.hydrate(&session, "/").unwrap();
    let stray = ClientMessage::Event(ClientEvent::new("missing", "click"));
    app.handle_frame(&session, &json_frame(&stray)).unwrap();

    assert!(rx.try_recv().is_err());
}

/// Test that re-initializing resets the page state.
#[test]
fn init_again_starts_from_scratch() {
    let app = counter_app(AppConfig::default());
    let (transport, mut rx) = ChannelTransport::pair();
    let session = app.sessions().open(Arc::new(transport));
    let click = json_frame(&ClientMessage::Event(ClientEvent::new("inc", "click")));

    app.hydrate(&session, "/").unwrap();
    app.handle_frame(&session, &click).unwrap();
    app.handle_frame(&session, &click).unwrap();
    assert_eq!(session.baseline("counter").as_deref(), Some("2"));

    app.hydrate(&session, "/").unwrap();
    assert_eq!(session.baseline("counter").as_deref(), Some("0"));
    assert_eq!(session.handler_count(), 1);

    while rx.try_recv().is_ok() {}
    app.handle_frame(&session, &click).unwrap();
    assert_eq!(session.baseline("counter").as_deref(), Some("1"));
}

async fn spawn_server(app: Arc<App>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = Server::new(app).serve(listener).await;
    });
    format!("ws://{addr}")
}

/// Test the full live loop over a websocket.
#[tokio::test]
async fn live_connection_round_trip() {
    let app = counter_app(AppConfig::default());
    let url = spawn_server(app.clone()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    ws.send(Message::Text(r#"{"type":"init","path":"/"}"#.into()))
        .await
        .unwrap();
    ws.send(Message::Text(r#"{"type":"event","id":"inc","event":"click"}"#.into()))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let json = match reply {
        Message::Text(json) => json,
        other => panic!("expected a text message, got {other:?}"),
    };
    let patch: ServerMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(
        patch,
        ServerMessage::Patch {
            island: "counter".into(),
            html: "1".into(),
        }
    );
    assert_eq!(app.sessions().len(), 1);

    ws.close(None).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !app.sessions().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

/// Test that binary frames get binary replies.
#[tokio::test]
async fn message_pack_clients_get_message_pack_replies() {
    let app = counter_app(AppConfig::default());
    let url = spawn_server(app).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    for message in [
        ClientMessage::Init { path: "/".into() },
        ClientMessage::Event(ClientEvent::new("inc", "click")),
    ] {
        let bytes = rmp_serde::to_vec_named(&message).unwrap();
        ws.send(Message::Binary(bytes)).await.unwrap();
    }

    let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let bytes = match reply {
        Message::Binary(bytes) => bytes,
        other => panic!("expected a binary message, got {other:?}"),
    };
    let patch: ServerMessage = rmp_serde::from_slice(&bytes).unwrap();
    assert!(matches!(patch, ServerMessage::Patch { ref html, .. } if html == "1"));
}

/// Test that a route rebuild reloads live clients.
#[test]
fn rebuild_reloads_live_clients() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "page.rs");

    let config = AppConfig {
        app_root: dir.path().to_path_buf(),
        dev_mode: true,
        ..AppConfig::default()
    };
    let app = counter_app(config);
    let (transport, mut rx) = ChannelTransport::pair();
    let _session = app.sessions().open(Arc::new(transport));

    touch(dir.path(), "about/page.rs");
    assert_eq!(app.rebuild_routes().unwrap(), 2);
    assert_eq!(app.reload_clients(), 1);
    assert_eq!(rx.try_recv().unwrap(), Frame::Text(r#"{"type":"reload"}"#.into()));
}
