//! Listener and per-connection HTTP/1.1 serving
//!
//! One listener carries both the CONNECT tunnel endpoint and any ordinary
//! HTTP routes mounted with [`ProxyServer::with_routes`]. Requests that match
//! neither get a 405.

use axum::body::Body;
use axum::Router;
use http::{Method, Request, Response};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use crate::fault::contain;
use crate::handler::ConnectHandler;
use crate::ProxyError;

/// Proxy server errors
#[derive(Debug, Error)]
pub enum ProxyServerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to bind to {address}: {reason}\n\nTroubleshooting:\n  - Check if another process is using this port: lsof -i :{port}\n  - Try using a different address or port")]
    BindError {
        address: String,
        port: u16,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ProxyServerConfig {
    /// Address to bind the listener
    pub bind_addr: SocketAddr,
}

impl Default for ProxyServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct ProxyServer {
    config: ProxyServerConfig,
    handler: Arc<ConnectHandler>,
    routes: Router,
}

impl ProxyServer {
    pub fn new(config: ProxyServerConfig, handler: Arc<ConnectHandler>) -> Self {
        Self {
            config,
            handler,
            routes: Router::new(),
        }
    }

    /// Serve `routes` for every non-CONNECT request
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = routes;
        self
    }

    /// Bind the configured address, retrying while it is still in TIME_WAIT
    pub async fn bind(&self) -> Result<TcpListener, ProxyServerError> {
        for attempt in 1..=3 {
            match TcpListener::bind(&self.config.bind_addr).await {
                Ok(listener) => {
                    if attempt > 1 {
                        info!(
                            "Successfully bound to {} on attempt {}/3",
                            self.config.bind_addr, attempt
                        );
                    }
                    return Ok(listener);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && attempt < 3 => {
                    warn!(
                        "Port {} is in use (attempt {}/3), retrying in 1 second...",
                        self.config.bind_addr.port(),
                        attempt
                    );
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => return Err(self.bind_error(e.to_string())),
            }
        }

        Err(self.bind_error("Address in use after 3 retry attempts".to_string()))
    }

    fn bind_error(&self, reason: String) -> ProxyServerError {
        ProxyServerError::BindError {
            address: self.config.bind_addr.ip().to_string(),
            port: self.config.bind_addr.port(),
            reason,
        }
    }

    pub async fn start(self) -> Result<(), ProxyServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` forever
    ///
    /// A failed accept is logged and skipped. When the process is out of file
    /// descriptors the loop pauses briefly so the failure does not spin.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ProxyServerError> {
        let addr = listener.local_addr()?;
        info!("CONNECT proxy listening on {}", addr);

        let routes = self
            .routes
            .fallback(method_not_allowed)
            .method_not_allowed_fallback(method_not_allowed);

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("New connection from {}", peer_addr);
                    let handler = self.handler.clone();
                    let routes = routes.clone();
                    tokio::spawn(serve_connection(stream, peer_addr, handler, routes));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    if let Some(pause) = accept_backoff(&e) {
                        tokio::time::sleep(pause).await;
                    }
                }
            }
        }
    }
}

/// Pause after an accept error that will repeat until descriptors free up
fn accept_backoff(error: &std::io::Error) -> Option<Duration> {
    // EMFILE and ENFILE
    match error.raw_os_error() {
        Some(23) | Some(24) => Some(ACCEPT_BACKOFF),
        _ => None,
    }
}

async fn method_not_allowed() -> Response<Body> {
    ProxyError::MethodNotAllowed.into_response()
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<ConnectHandler>,
    routes: Router,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |request: Request<Incoming>| {
        let handler = handler.clone();
        let routes = routes.clone();
        async move { Ok::<_, Infallible>(dispatch(request, peer_addr, handler, routes).await) }
    });

    if let Err(e) = http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(io, service)
        .with_upgrades()
        .await
    {
        debug!("Connection from {} ended: {:?}", peer_addr, e);
    }
}

async fn dispatch(
    request: Request<Incoming>,
    peer_addr: SocketAddr,
    handler: Arc<ConnectHandler>,
    routes: Router,
) -> Response<Body> {
    if request.method() == Method::CONNECT {
        return handler.handle(request, peer_addr).await;
    }

    let routed = contain(routes.oneshot(request.map(Body::new))).await;
    match routed {
        Ok(Ok(response)) => response,
        Ok(Err(infallible)) => match infallible {},
        Err(fault) => fault.into_response(),
    }
}
