// src/server/proxy.rs

//! Reverse proxy to the target process.
//!
//! Responses pass through untouched unless they are plain, fully-sized HTML;
//! those get the live-reload script spliced in before the first `</head>`
//! and are marked uncacheable.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper_util::rt::TokioIo;
use memchr::memmem;
use reqwest::redirect::Policy;
use reqwest::Url;
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::{DevloopError, Result};
use crate::server::{AppState, SCRIPT_PATH};

const HEAD_CLOSE: &[u8] = b"</head>";

const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Failures scoped to a single proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("failed to read body: {0}")]
    BodyRead(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match self {
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::BodyRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(error = %self, %status, "proxy request failed");
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Base URL of the target, e.g. `http://127.0.0.1:8080`.
    pub target: String,
    /// `src` of the injected script tag.
    pub script_src: String,
}

impl ProxyConfig {
    pub fn for_port(port: u16) -> Self {
        Self {
            target: format!("http://127.0.0.1:{port}"),
            script_src: SCRIPT_PATH.to_string(),
        }
    }
}

/// Why a response is forwarded without rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    UpgradeRequest,
    SwitchingProtocols,
    /// HEAD request, or a status that never carries a body.
    NoBody,
    NotHtml,
    Chunked,
    Encoded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Rewrite,
    Passthrough(BypassReason),
}

/// Decide whether a response may be rewritten. The first matching rule wins.
pub fn disposition(
    method: &Method,
    request_upgrade: bool,
    status: StatusCode,
    headers: &HeaderMap,
) -> Disposition {
    if request_upgrade {
        return Disposition::Passthrough(BypassReason::UpgradeRequest);
    }
    if status == StatusCode::SWITCHING_PROTOCOLS {
        return Disposition::Passthrough(BypassReason::SwitchingProtocols);
    }
    if *method == Method::HEAD || !status_has_body(status) {
        return Disposition::Passthrough(BypassReason::NoBody);
    }
    if !header_contains(headers, &header::CONTENT_TYPE, "text/html") {
        return Disposition::Passthrough(BypassReason::NotHtml);
    }
    if header_contains(headers, &header::TRANSFER_ENCODING, "chunked") {
        return Disposition::Passthrough(BypassReason::Chunked);
    }
    if headers.contains_key(header::CONTENT_ENCODING) {
        return Disposition::Passthrough(BypassReason::Encoded);
    }
    Disposition::Rewrite
}

fn status_has_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn header_contains(headers: &HeaderMap, name: &HeaderName, needle: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains(needle))
}

/// Insert `script_tag` right before the first `</head>`.
///
/// Bodies without `</head>` are returned unchanged.
pub fn inject_script(body: &[u8], script_tag: &str) -> Vec<u8> {
    match memmem::find(body, HEAD_CLOSE) {
        Some(at) => {
            let mut out = Vec::with_capacity(body.len() + script_tag.len());
            out.extend_from_slice(&body[..at]);
            out.extend_from_slice(script_tag.as_bytes());
            out.extend_from_slice(&body[at..]);
            out
        }
        None => body.to_vec(),
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn set_no_cache(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
}

pub struct RewritingProxy {
    target: Url,
    client: reqwest::Client,
    script_tag: String,
}

impl RewritingProxy {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let invalid = |reason: String| DevloopError::InvalidTarget {
            target: config.target.clone(),
            reason,
        };

        let target = Url::parse(&config.target).map_err(|e| invalid(e.to_string()))?;
        if target.scheme() != "http" {
            return Err(invalid("only http targets are supported".to_string()));
        }
        if target.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }

        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .no_proxy()
            .build()
            .map_err(anyhow::Error::from)?;

        Ok(Self {
            target,
            client,
            script_tag: format!(
                r#"<script type="text/javascript" src="{}"></script>"#,
                config.script_src
            ),
        })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn script_tag(&self) -> &str {
        &self.script_tag
    }

    fn upstream_url(&self, uri: &Uri) -> Url {
        let mut url = self.target.clone();
        url.set_path(uri.path());
        url.set_query(uri.query());
        url
    }

    /// Forward one request and produce the (possibly rewritten) response.
    pub async fn forward(&self, mut req: Request) -> std::result::Result<Response, ProxyError> {
        let request_upgrade = req.headers().contains_key(header::UPGRADE);
        let client_upgrade = request_upgrade.then(|| hyper::upgrade::on(&mut req));

        let url = self.upstream_url(req.uri());
        let (parts, body) = req.into_parts();

        // Host is forwarded unchanged; the target sees the public address.
        let mut headers = parts.headers;
        if !request_upgrade {
            strip_hop_by_hop(&mut headers);
        }
        if let Some(host) = headers.get(header::HOST).cloned() {
            headers.insert(X_FORWARDED_HOST, host);
        }
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

        let body = to_bytes(body, usize::MAX)
            .await
            .map_err(|e| ProxyError::BodyRead(e.to_string()))?;

        debug!(method = %parts.method, %url, "proxying request");
        let method = parts.method;
        let mut upstream = self.client.request(method.clone(), url).headers(headers);
        if !body.is_empty() {
            upstream = upstream.body(body);
        }
        let upstream = upstream
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;

        let status = upstream.status();
        match disposition(&method, request_upgrade, status, upstream.headers()) {
            Disposition::Passthrough(reason) => {
                debug!(%status, ?reason, "passing response through");
                match client_upgrade {
                    Some(client) if status == StatusCode::SWITCHING_PROTOCOLS => {
                        Ok(tunnel(upstream, client))
                    }
                    _ => Ok(passthrough(upstream)),
                }
            }
            Disposition::Rewrite => self.rewrite(upstream).await,
        }
    }

    async fn rewrite(&self, upstream: reqwest::Response) -> std::result::Result<Response, ProxyError> {
        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        let body = upstream
            .bytes()
            .await
            .map_err(|e| ProxyError::BodyRead(e.to_string()))?;

        let rewritten = inject_script(&body, &self.script_tag);
        debug!(before = body.len(), after = rewritten.len(), "injected live-reload script");

        strip_hop_by_hop(&mut headers);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
        set_no_cache(&mut headers);

        let mut response = Response::new(Body::from(rewritten));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn passthrough(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Answer the client with the upstream's 101 and splice the two upgraded
/// connections together once both sides have switched.
fn tunnel(upstream: reqwest::Response, client: hyper::upgrade::OnUpgrade) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = upstream.status();
    *response.headers_mut() = upstream.headers().clone();

    tokio::spawn(async move {
        let mut upstream_io = match upstream.upgrade().await {
            Ok(io) => io,
            Err(e) => {
                warn!(error = %e, "upstream upgrade failed");
                return;
            }
        };
        let mut client_io = match client.await {
            Ok(io) => TokioIo::new(io),
            Err(e) => {
                warn!(error = %e, "client upgrade failed");
                return;
            }
        };

        match tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await {
            Ok((up, down)) => debug!(up, down, "upgraded connection closed"),
            Err(e) => debug!(error = %e, "upgraded connection ended with error"),
        }
    });

    response
}

/// Fallback route: everything that is not a dev-server endpoint.
pub async fn proxy_handler(State(state): State<AppState>, req: Request) -> Response {
    match state.proxy.forward(req).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
