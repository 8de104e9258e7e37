//! Request forwarding to a vhost's backend.
//!
//! # Responsibilities
//! - Rewrite the request URI to the backend (`http://127.0.0.1:<port>`)
//! - Keep the original `Host`, add `X-Forwarded-*` headers
//! - Strip hop-by-hop headers in both directions
//! - Stream request and response bodies
//! - Log one line per request
//!
//! # Design Decisions
//! - One pooled hyper client shared by all vhosts
//! - Upstream failure is a plain 502, no retries

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, Response, StatusCode, Uri, Version};
use axum::response::IntoResponse;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::http::request::X_REQUEST_ID;
use crate::routing::registry::request_host;

/// HTTP client used to reach backends.
pub type HttpClient = Client<HttpConnector, Body>;

/// Body served when a backend cannot be reached.
pub const BAD_GATEWAY_PAGE: &str = "<html>
<body>
<h1>502 Bad Gateway</h1>
<p>Can't connect to upstream server, please try again later.</p>
</body>
</html>";

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
];

/// Build the shared backend client.
pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Base URL of a backend on the loopback interface.
pub fn target_url(port: u16) -> Result<Url, url::ParseError> {
    Url::parse(&format!("http://127.0.0.1:{port}"))
}

/// Forwards requests to one backend.
#[derive(Clone)]
pub struct ForwardingHandler {
    target: Url,
    authority: String,
    client: HttpClient,
}

impl fmt::Debug for ForwardingHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingHandler")
            .field("target", &self.target.as_str())
            .finish_non_exhaustive()
    }
}

impl ForwardingHandler {
    pub fn new(target: Url, client: HttpClient) -> Self {
        let host = target.host_str().unwrap_or("127.0.0.1");
        let authority = match target.port_or_known_default() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Self {
            target,
            authority,
            client,
        }
    }

    /// Handler for a loopback backend with its own client.
    pub fn for_port(port: u16) -> Result<Self, url::ParseError> {
        Ok(Self::new(target_url(port)?, http_client()))
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Forward a request and return the backend's response, or a 502.
    pub async fn forward(&self, request: Request<Body>, peer: SocketAddr, scheme: &'static str) -> Response<Body> {
        let original_host = request_host(&request).map(str::to_string);
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = format!("{}://{}{}", self.target.scheme(), self.authority, path_and_query);
        parts.uri = match Uri::try_from(uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid upstream URI");
                return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response();
            }
        };
        parts.version = Version::HTTP_11;

        strip_hop_by_hop(&mut parts.headers);
        if let Some(host) = original_host {
            if let Ok(value) = HeaderValue::from_str(&host) {
                parts.headers.entry(header::HOST).or_insert(value.clone());
                parts.headers.insert(X_FORWARDED_HOST, value);
            }
        }
        append_forwarded_for(&mut parts.headers, peer);
        parts
            .headers
            .insert(X_FORWARDED_PROTO, HeaderValue::from_static(scheme));

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => into_response(response),
            Err(e) => {
                tracing::error!(target_url = %self.target, error = %e, "Upstream error");
                bad_gateway()
            }
        }
    }
}

/// Forward through `handler` and log the exchange.
pub async fn log_and_dispatch(
    handler: &ForwardingHandler,
    request: Request<Body>,
    peer: SocketAddr,
    scheme: &'static str,
) -> Response<Body> {
    let started = Instant::now();
    let summary = RequestSummary::new(&request);
    let response = handler.forward(request, peer, scheme).await;
    summary.log(peer, response.status(), started);
    response
}

/// Request fields captured before the request is consumed.
pub(crate) struct RequestSummary {
    request_id: String,
    host: String,
    method: String,
    path: String,
}

impl RequestSummary {
    pub(crate) fn new<B>(request: &Request<B>) -> Self {
        Self {
            request_id: request
                .headers()
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string(),
            host: request_host(request).unwrap_or("-").to_string(),
            method: request.method().to_string(),
            path: request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
        }
    }

    pub(crate) fn log(&self, peer: SocketAddr, status: StatusCode, started: Instant) {
        tracing::info!(
            request_id = %self.request_id,
            peer = %peer,
            host = %self.host,
            method = %self.method,
            path = %self.path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request"
        );
    }
}

fn into_response(response: Response<Incoming>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

fn bad_gateway() -> Response<Body> {
    (
        StatusCode::BAD_GATEWAY,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        BAD_GATEWAY_PAGE,
    )
        .into_response()
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are connection-scoped too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, peer: SocketAddr) {
    let ip = peer.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
