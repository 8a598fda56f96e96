//! End-to-end tests: a real listener, real HTTP, real WebSockets.

use futures_util::{SinkExt, StreamExt};
use ripple_core::widget::{Shared, Widget};
use ripple_server::{serve, AppState, Config};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const LOCALHOST: &str = "127.0.0.1";

async fn start() -> (Arc<AppState>, SocketAddr) {
    let mut config = Config::default();
    config.host = LOCALHOST.into();
    config.heartbeat.interval_ms = 0;
    config.metrics.enabled = false;

    let state = Arc::new(AppState::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, state.clone()));
    (state, addr)
}

fn localhost() -> IpAddr {
    LOCALHOST.parse().unwrap()
}

async fn next_text(ws: &mut Client) -> String {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let WsMessage::Text(text) = msg {
            return text;
        }
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut body = String::new();
    stream.read_to_string(&mut body).await.unwrap();
    body
}

fn status_of(err: WsError) -> u16 {
    match err {
        WsError::Http(resp) => resp.status().as_u16(),
        other => panic!("expected an HTTP error, got {other}"),
    }
}

#[tokio::test]
async fn test_input_then_dirty_over_websocket() {
    let (state, addr) = start().await;

    let session = state.engine.new_session(Some(localhost())).unwrap();
    let name = Shared::new(String::from("foo"));
    let html = session.render(Widget::text(name.clone()), &[]).unwrap();
    assert_eq!(html, r#"<input id="Jid.1" type="text" value="foo">"#);

    let url = format!("ws://{addr}/ripple/{}?v=1.0", session.key());
    let (mut ws, _) = connect_async(url).await.unwrap();

    ws.send(WsMessage::Text("Input\t1\tbar\n".into())).await.unwrap();
    wait_until(|| name.get() == "bar").await;

    name.set("quux".into());
    state.engine.dirty(vec![name.tag()]);
    assert_eq!(next_text(&mut ws).await, "Value\t1\t\"quux\"\n");

    state.engine.shutdown();
}

#[tokio::test]
async fn test_demo_page_session() {
    let (state, addr) = start().await;

    let page = http_get(addr, "/").await;
    assert!(page.starts_with("HTTP/1.1 200"));
    assert_eq!(state.engine.pending_count(), 1);

    let key = page
        .split("data-key=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .expect("page carries the session key")
        .to_string();

    let url = format!("ws://{addr}/ripple/{key}?v=1.0");
    let (mut ws, _) = connect_async(url).await.unwrap();
    assert_eq!(state.engine.pending_count(), 0);

    // jid 1 is the greeting, jid 2 the name field
    ws.send(WsMessage::Text("Input\tJid.2\t\"Bob\"\n".into()))
        .await
        .unwrap();
    wait_until(|| state.demo.name() == "Bob").await;

    state.engine.dirty(vec![state.demo.name_tag()]);
    let mut got = vec![next_text(&mut ws).await, next_text(&mut ws).await];
    got.sort();
    assert_eq!(
        got,
        vec![
            "Inner\t1\t\"Hello, Bob!\"\n".to_string(),
            "Value\t2\t\"Bob\"\n".to_string(),
        ]
    );

    state.engine.shutdown();
}

#[tokio::test]
async fn test_bad_value_is_reported_as_alert() {
    let (state, addr) = start().await;

    let session = state.engine.new_session(Some(localhost())).unwrap();
    let level = Shared::new(1.0_f64);
    session.render(Widget::number(level.clone()), &[]).unwrap();

    let url = format!("ws://{addr}/ripple/{}", session.key());
    let (mut ws, _) = connect_async(url).await.unwrap();

    ws.send(WsMessage::Text("Input\t1\tabc\n".into())).await.unwrap();
    let alert = next_text(&mut ws).await;
    assert!(alert.starts_with("Alert\t\t\"danger\\n"), "{alert}");
    assert_eq!(level.get(), 1.0);

    state.engine.shutdown();
}

#[tokio::test]
async fn test_rejected_connects() {
    let (state, addr) = start().await;

    // never issued
    let err = connect_async(format!("ws://{addr}/ripple/zzz?v=1.0"))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), 404);

    // incompatible protocol
    let session = state.engine.new_session(Some(localhost())).unwrap();
    let err = connect_async(format!("ws://{addr}/ripple/{}?v=2.0", session.key()))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), 400);
    // the session was not consumed by the refused attempt
    assert_eq!(state.engine.pending_count(), 1);

    // page was served to someone else
    let other = state
        .engine
        .new_session(Some("10.1.2.3".parse().unwrap()))
        .unwrap();
    let err = connect_async(format!("ws://{addr}/ripple/{}", other.key()))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), 403);
    assert!(other.is_closed());

    state.engine.shutdown();
}

#[tokio::test]
async fn test_health_and_script() {
    let (state, addr) = start().await;

    let health = http_get(addr, "/health").await;
    assert!(health.contains("\"status\":\"ok\""), "{health}");
    assert!(health.contains("\"protocol\":\"1.0\""), "{health}");

    let script = http_get(addr, "/ripple.js").await;
    assert!(script.contains("text/javascript"));
    assert!(script.contains("new WebSocket"));

    state.engine.shutdown();
}

#[tokio::test]
async fn test_shutdown_closes_sockets() {
    let (state, addr) = start().await;

    let session = state.engine.new_session(Some(localhost())).unwrap();
    let url = format!("ws://{addr}/ripple/{}", session.key());
    let (mut ws, _) = connect_async(url).await.unwrap();

    state.engine.shutdown();

    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert!(session.is_closed());
}
