use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, Redirect, Response};
use axum::routing::get;
use axum::Router;
use devloop::events::{EventBus, EventBusConfig};
use devloop::server::{self, AppState, ProxyConfig, RewritingProxy};
use devloop_test_utils::{free_port, init_tracing, spawn_app, with_timeout, TestServer};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

const PAGE: &str = "<html><head><title>t</title></head><body>hi</body></html>";
const TAG: &str =
    r#"<script type="text/javascript" src="/__dev-server/ws-live-reload.js"></script>"#;

async fn upstream() -> TestServer {
    let app = Router::new()
        .route("/", get(|| async { Html(PAGE) }))
        .route(
            "/twice",
            get(|| async { Html("<head></head><pre></head></pre>") }),
        )
        .route("/api", get(|| async { ([(header::CONTENT_TYPE, "application/json")], "{}") }))
        .route(
            "/gzip",
            get(|| async {
                (
                    [
                        (header::CONTENT_TYPE, "text/html"),
                        (header::CONTENT_ENCODING, "gzip"),
                    ],
                    PAGE,
                )
            }),
        )
        .route(
            "/chunked",
            get(|| async {
                let chunks = tokio_stream::iter(vec![
                    Ok::<_, Infallible>("<html><head>"),
                    Ok("</head><body></body></html>"),
                ]);
                ([(header::CONTENT_TYPE, "text/html")], Body::from_stream(chunks))
            }),
        )
        .route(
            "/headers",
            get(|headers: HeaderMap| async move {
                let value = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string()
                };
                format!(
                    "{}|{}|{}",
                    value("host"),
                    value("x-forwarded-host"),
                    value("x-forwarded-proto")
                )
            }),
        )
        .route("/moved", get(|| async { Redirect::temporary("/") }))
        .route("/echo", axum::routing::post(|body: String| async move { body }))
        .route(
            "/socket",
            get(|ws: WebSocketUpgrade| async move {
                ws.on_upgrade(|mut socket: WebSocket| async move {
                    let _ = socket.send(Message::Text("hello".into())).await;
                    while let Some(Ok(msg)) = socket.recv().await {
                        if let Message::Text(text) = msg {
                            let _ = socket.send(Message::Text(text)).await;
                        }
                    }
                })
            }),
        );
    spawn_app(app).await
}

async fn proxy_to(port: u16) -> TestServer {
    let state = AppState {
        bus: Arc::new(EventBus::new(EventBusConfig::default())),
        proxy: Arc::new(RewritingProxy::new(ProxyConfig::for_port(port)).unwrap()),
        shutdown: CancellationToken::new(),
    };
    spawn_app(server::router(state)).await
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

async fn fetch(proxy: &TestServer, path: &str) -> Response<String> {
    let resp = client().get(proxy.url(path)).send().await.unwrap();
    let mut builder = Response::builder().status(resp.status());
    for (name, value) in resp.headers() {
        builder = builder.header(name, value);
    }
    builder.body(resp.text().await.unwrap()).unwrap()
}

#[tokio::test]
async fn html_gets_the_script_before_head_close() {
    init_tracing();
    let up = upstream().await;
    let proxy = proxy_to(up.port()).await;

    let resp = with_timeout(fetch(&proxy, "/")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let expected = PAGE.replacen("</head>", &format!("{TAG}</head>"), 1);
    assert_eq!(resp.body(), &expected);
    assert_eq!(
        resp.headers()[header::CONTENT_LENGTH],
        expected.len().to_string().as_str()
    );
    assert_eq!(
        resp.headers()[header::CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(resp.headers()[header::PRAGMA], "no-cache");
    assert_eq!(resp.headers()[header::EXPIRES], "0");
}

#[tokio::test]
async fn only_the_first_head_close_is_rewritten() {
    init_tracing();
    let up = upstream().await;
    let proxy = proxy_to(up.port()).await;

    let resp = with_timeout(fetch(&proxy, "/twice")).await;
    assert_eq!(resp.body(), &format!("<head>{TAG}</head><pre></head></pre>"));
}

#[tokio::test]
async fn excluded_responses_pass_through_untouched() {
    init_tracing();
    let up = upstream().await;
    let proxy = proxy_to(up.port()).await;

    let json = with_timeout(fetch(&proxy, "/api")).await;
    assert_eq!(json.body(), "{}");

    let gzip = with_timeout(fetch(&proxy, "/gzip")).await;
    assert_eq!(gzip.body(), PAGE);
    assert_eq!(gzip.headers()[header::CONTENT_ENCODING], "gzip");
    assert!(gzip.headers().get(header::PRAGMA).is_none());

    let chunked = with_timeout(fetch(&proxy, "/chunked")).await;
    assert_eq!(chunked.body(), "<html><head></head><body></body></html>");
}

#[tokio::test]
async fn upgrade_requests_are_never_rewritten() {
    init_tracing();
    let up = upstream().await;
    let proxy = proxy_to(up.port()).await;

    let resp = with_timeout(
        client()
            .get(proxy.url("/"))
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "example")
            .send(),
    )
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), PAGE);
}

#[tokio::test]
async fn websocket_traffic_is_tunnelled() {
    init_tracing();
    let up = upstream().await;
    let proxy = proxy_to(up.port()).await;

    let (mut ws, resp) = with_timeout(tokio_tungstenite::connect_async(format!(
        "ws://{}/socket",
        proxy.addr
    )))
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::SWITCHING_PROTOCOLS);

    let first = with_timeout(ws.next()).await.unwrap().unwrap();
    assert_eq!(first.to_text().unwrap(), "hello");
}

#[tokio::test]
async fn forwarding_headers_and_bodies_reach_upstream() {
    init_tracing();
    let up = upstream().await;
    let proxy = proxy_to(up.port()).await;

    let resp = with_timeout(fetch(&proxy, "/headers")).await;
    assert_eq!(
        resp.body(),
        &format!("{addr}|{addr}|http", addr = proxy.addr)
    );

    let echoed = with_timeout(client().post(proxy.url("/echo")).body("payload").send())
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(echoed, "payload");
}

#[tokio::test]
async fn head_requests_keep_the_upstream_length() {
    init_tracing();
    let up = upstream().await;
    let proxy = proxy_to(up.port()).await;

    let resp = with_timeout(client().head(proxy.url("/")).send())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_LENGTH],
        PAGE.len().to_string().as_str()
    );
    assert!(resp.headers().get(header::PRAGMA).is_none());
}

#[tokio::test]
async fn redirects_are_returned_not_followed() {
    init_tracing();
    let up = upstream().await;
    let proxy = proxy_to(up.port()).await;

    let resp = with_timeout(fetch(&proxy, "/moved")).await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(resp.headers()[header::LOCATION], "/");
}

#[tokio::test]
async fn unreachable_target_is_a_bad_gateway() {
    init_tracing();
    let proxy = proxy_to(free_port()).await;

    let resp = with_timeout(fetch(&proxy, "/")).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}
