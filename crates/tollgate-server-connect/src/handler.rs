//! The CONNECT request pipeline
//!
//! ```text
//! credential -> token -> quota -> destination -> dial -> claim client -> 200
//! ```
//!
//! The first failing stage decides the response. On success the tunnel runs
//! in its own task after the 200 has been written.

use axum::body::Body;
use chrono::Utc;
use http::{header, Method, Request, Response, StatusCode};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tollgate_auth::{JwtVerifier, ProxyCredential};
use tracing::{debug, error, info, warn};

use crate::access_log::{AccessRecord, FanoutAccessSink};
use crate::establish::TunnelEstablisher;
use crate::fault::contain;
use crate::quota::QuotaGate;
use crate::relay::relay;
use crate::ProxyError;

/// Everything a granted tunnel needs once the HTTP exchange is over
struct Tunnel {
    attribution: String,
    account_id: String,
    destination: String,
    client_addr: SocketAddr,
    client: OnUpgrade,
    upstream: TcpStream,
}

pub struct ConnectHandler {
    verifier: Arc<JwtVerifier>,
    quota: QuotaGate,
    establisher: TunnelEstablisher,
    access_log: FanoutAccessSink,
}

impl ConnectHandler {
    pub fn new(
        verifier: Arc<JwtVerifier>,
        quota: QuotaGate,
        establisher: TunnelEstablisher,
        access_log: FanoutAccessSink,
    ) -> Self {
        Self {
            verifier,
            quota,
            establisher,
            access_log,
        }
    }

    /// Answer one CONNECT request.
    ///
    /// Never fails: every error, a panic in any stage included, is rendered
    /// as its terminal response.
    pub async fn handle<B: Send>(
        self: &Arc<Self>,
        mut request: Request<B>,
        client_addr: SocketAddr,
    ) -> Response<Body> {
        let target = request.uri().to_string();

        let outcome = contain(self.admit(&mut request, client_addr))
            .await
            .and_then(|admitted| admitted);

        match outcome {
            Ok(tunnel) => {
                info!(
                    "Tunnel granted for {} ({}) to {}",
                    tunnel.attribution, tunnel.account_id, tunnel.destination
                );
                let handler = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = contain(handler.run(tunnel)).await.and_then(|ran| ran) {
                        error!("Tunnel from {} failed: {}", client_addr, e);
                    }
                });
                Response::new(Body::empty())
            }
            Err(e) => {
                let status = e.status_code();
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!("CONNECT {} from {} failed: {:?}", target, client_addr, e);
                } else {
                    warn!(
                        "CONNECT {} from {} rejected ({}): {}",
                        target,
                        client_addr,
                        status.as_u16(),
                        e
                    );
                }
                e.into_response()
            }
        }
    }

    async fn admit<B>(
        &self,
        request: &mut Request<B>,
        client_addr: SocketAddr,
    ) -> Result<Tunnel, ProxyError> {
        if request.method() != Method::CONNECT {
            return Err(ProxyError::MethodNotAllowed);
        }

        let header = request
            .headers()
            .get(header::PROXY_AUTHORIZATION)
            .map(|value| value.to_str().map_err(|_| ProxyError::MalformedCredential))
            .transpose()?;
        let credential = ProxyCredential::parse(header)?;

        let account_id = self.verifier.verify(&credential.token)?;
        debug!("Token verified for account {}", account_id);

        let account = self.quota.admit(&account_id).await?;

        let destination = TunnelEstablisher::destination(request.uri())?;
        let upstream = self.establisher.dial(&destination).await?;
        let client = TunnelEstablisher::claim_client(request)?;

        Ok(Tunnel {
            attribution: credential.attribution,
            account_id: account.id,
            destination,
            client_addr,
            client,
            upstream,
        })
    }

    async fn run(&self, tunnel: Tunnel) -> Result<(), ProxyError> {
        let started_at = Utc::now();

        // The 200 is already on the wire; a failure here only closes the
        // destination
        let upgraded = tunnel
            .client
            .await
            .map_err(|e| ProxyError::HijackUnsupported(e.to_string()))?;

        let stats = relay(TokioIo::new(upgraded), tunnel.upstream).await?;

        let record = AccessRecord::new(
            tunnel.attribution,
            tunnel.account_id,
            tunnel.destination,
            tunnel.client_addr,
            started_at,
            &stats,
        );
        self.access_log.emit(&record).await;

        Ok(())
    }
}
