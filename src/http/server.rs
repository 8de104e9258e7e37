//! HTTP and HTTPS listeners.
//!
//! # Responsibilities
//! - Build the Axum router that dispatches by `Host` to vhosts
//! - Wire up middleware (request ID, tracing)
//! - Bind the plain HTTP and TLS listeners and serve them concurrently
//! - Print the vhost table before binding
//!
//! # Design Decisions
//! - Port 0 disables a listener; HTTPS is also skipped without certificates
//! - Listener life cycle is Idle → Starting → Serving; a failure in either
//!   listener terminates the whole server (no half-working proxy)
//! - No graceful shutdown: the process runs until killed

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, Response, StatusCode},
    response::IntoResponse,
    Router,
};
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::http::forward::{log_and_dispatch, RequestSummary};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::net::tls::{self, SniCertResolver, TlsError};
use crate::routing::VhostRegistry;

/// Port value that disables a listener.
pub const DISABLED_PORT: u16 = 0;

/// Error type for the listeners.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid listen address {addr}: {source}")]
    Address {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no listeners enabled (both --http and --https are 0)")]
    NoListeners,

    #[error("failed to bind {scheme} listener on {addr}: {source}")]
    Bind {
        scheme: ListenerScheme,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{scheme} listener on {addr} failed: {source}")]
    Serve {
        scheme: ListenerScheme,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerScheme {
    Http,
    Https,
}

impl ListenerScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerScheme::Http => "http",
            ListenerScheme::Https => "https",
        }
    }
}

impl fmt::Display for ListenerScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listener life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Starting,
    Serving,
    Terminated,
}

fn transition(scheme: ListenerScheme, addr: SocketAddr, state: ListenerState) {
    tracing::debug!(listener = %scheme, address = %addr, state = ?state, "Listener state");
}

/// A listener the server will start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerPlan {
    pub scheme: ListenerScheme,
    pub addr: SocketAddr,
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub listen: String,
    pub http_port: u16,
    pub https_port: u16,
}

#[derive(Clone)]
struct DispatchState {
    registry: Arc<VhostRegistry>,
    scheme: ListenerScheme,
}

/// The vhost proxy: an immutable registry served over HTTP and HTTPS.
pub struct ProxyServer {
    registry: Arc<VhostRegistry>,
    tls: Option<Arc<ServerConfig>>,
    options: ServerOptions,
}

impl ProxyServer {
    /// Create the server. An empty resolver means no HTTPS listener.
    pub fn new(registry: VhostRegistry, resolver: SniCertResolver, options: ServerOptions) -> Result<Self, TlsError> {
        let tls = if resolver.is_empty() {
            None
        } else {
            Some(tls::server_config(resolver)?)
        };
        Ok(Self {
            registry: Arc::new(registry),
            tls,
            options,
        })
    }

    pub fn registry(&self) -> &VhostRegistry {
        &self.registry
    }

    /// Listeners `run` will start, in start order.
    pub fn listeners(&self) -> Result<Vec<ListenerPlan>, ServerError> {
        let mut plans = Vec::with_capacity(2);
        if self.options.http_port != DISABLED_PORT {
            plans.push(ListenerPlan {
                scheme: ListenerScheme::Http,
                addr: self.resolve_addr(self.options.http_port)?,
            });
        }
        if self.options.https_port != DISABLED_PORT && self.tls.is_some() {
            plans.push(ListenerPlan {
                scheme: ListenerScheme::Https,
                addr: self.resolve_addr(self.options.https_port)?,
            });
        }
        for plan in &plans {
            transition(plan.scheme, plan.addr, ListenerState::Idle);
        }
        Ok(plans)
    }

    fn resolve_addr(&self, port: u16) -> Result<SocketAddr, ServerError> {
        let listen = self.options.listen.as_str();
        let to_err = |source: std::io::Error| ServerError::Address {
            addr: listen.to_string(),
            source,
        };
        (listen, port)
            .to_socket_addrs()
            .map_err(to_err)?
            .next()
            .ok_or_else(|| to_err(std::io::Error::new(std::io::ErrorKind::NotFound, "no address found")))
    }

    /// Build the Axum router for one listener.
    pub fn router(&self, scheme: ListenerScheme) -> Router {
        let state = DispatchState {
            registry: self.registry.clone(),
            scheme,
        };
        Router::new().fallback(dispatch).with_state(state).layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(propagate_request_id_layer()),
        )
    }

    /// Start every enabled listener and serve until one of them fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let plans = self.listeners()?;
        if plans.is_empty() {
            return Err(ServerError::NoListeners);
        }
        if self.options.https_port != DISABLED_PORT && self.tls.is_none() {
            tracing::warn!("No vhost certificates loaded, HTTPS listener not started");
        }

        self.print_vhosts(&plans);

        let http = plans.iter().find(|p| p.scheme == ListenerScheme::Http).copied();
        let https = plans.iter().find(|p| p.scheme == ListenerScheme::Https).copied();

        let http_task = async {
            match http {
                Some(plan) => {
                    transition(plan.scheme, plan.addr, ListenerState::Starting);
                    let listener = TcpListener::bind(plan.addr)
                        .await
                        .map_err(|source| ServerError::Bind {
                            scheme: plan.scheme,
                            addr: plan.addr,
                            source,
                        })?;
                    self.serve_http(listener).await
                }
                None => Ok(()),
            }
        };
        let https_task = async {
            match https {
                Some(plan) => self.serve_https(plan.addr).await,
                None => Ok(()),
            }
        };

        tokio::try_join!(http_task, https_task)?;
        Ok(())
    }

    /// Serve plain HTTP on an already bound listener.
    pub async fn serve_http(&self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            scheme: ListenerScheme::Http,
            addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            source,
        })?;
        let app = self
            .router(ListenerScheme::Http)
            .into_make_service_with_connect_info::<SocketAddr>();

        transition(ListenerScheme::Http, addr, ListenerState::Serving);
        tracing::info!(address = %addr, "HTTP listener serving");
        axum::serve(listener, app).await.map_err(|source| {
            transition(ListenerScheme::Http, addr, ListenerState::Terminated);
            ServerError::Serve {
                scheme: ListenerScheme::Http,
                addr,
                source,
            }
        })
    }

    /// Bind and serve TLS on `addr`.
    pub async fn serve_https(&self, addr: SocketAddr) -> Result<(), ServerError> {
        let Some(config) = self.tls.clone() else {
            return Ok(());
        };
        transition(ListenerScheme::Https, addr, ListenerState::Starting);
        let listener = bind_std(addr).map_err(|source| ServerError::Bind {
            scheme: ListenerScheme::Https,
            addr,
            source,
        })?;
        let app = self
            .router(ListenerScheme::Https)
            .into_make_service_with_connect_info::<SocketAddr>();

        transition(ListenerScheme::Https, addr, ListenerState::Serving);
        tracing::info!(address = %addr, "HTTPS listener serving");
        axum_server::from_tcp_rustls(listener, tls::rustls_config(config))
            .serve(app)
            .await
            .map_err(|source| {
                transition(ListenerScheme::Https, addr, ListenerState::Terminated);
                ServerError::Serve {
                    scheme: ListenerScheme::Https,
                    addr,
                    source,
                }
            })
    }

    fn print_vhosts(&self, plans: &[ListenerPlan]) {
        println!("[*] vhosts:");
        for vhost in self.registry.entries() {
            println!("    - {} -> {}", vhost.host, vhost.target_port);
        }
        for plan in plans {
            println!("[*] starting proxy: {}://{}", plan.scheme, plan.addr);
        }
    }
}

/// Bound, non-blocking std listener for axum-server.
fn bind_std(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
    let listener = std::net::TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Route a request to its vhost by `Host`.
async fn dispatch(
    State(state): State<DispatchState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    match state.registry.match_request(&request) {
        Some(vhost) => log_and_dispatch(&vhost.handler, request, peer, state.scheme.as_str()).await,
        None => {
            let started = Instant::now();
            let summary = RequestSummary::new(&request);
            let response = (StatusCode::NOT_FOUND, "No vhost configured for this host").into_response();
            summary.log(peer, response.status(), started);
            response
        }
    }
}
