//! Destination dialing and client socket takeover

use http::{Request, Uri};
use hyper::upgrade::OnUpgrade;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::ProxyError;

/// How long a destination dial may take before the tunnel is refused
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TunnelEstablisher {
    dial_timeout: Duration,
}

impl Default for TunnelEstablisher {
    fn default() -> Self {
        Self::new(DEFAULT_DIAL_TIMEOUT)
    }
}

impl TunnelEstablisher {
    pub fn new(dial_timeout: Duration) -> Self {
        Self { dial_timeout }
    }

    /// `host:port` from a CONNECT request target
    pub fn destination(uri: &Uri) -> Result<String, ProxyError> {
        let authority = uri
            .authority()
            .ok_or_else(|| ProxyError::InvalidDestination(uri.to_string()))?;

        if authority.port_u16().is_none() {
            return Err(ProxyError::InvalidDestination(authority.to_string()));
        }

        Ok(authority.to_string())
    }

    /// Open the TCP connection to the destination
    pub async fn dial(&self, destination: &str) -> Result<TcpStream, ProxyError> {
        let stream = match tokio::time::timeout(self.dial_timeout, TcpStream::connect(destination))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ProxyError::DestinationUnreachable(format!(
                    "dial tcp {}: {}",
                    destination, e
                )))
            }
            Err(_) => {
                return Err(ProxyError::DestinationUnreachable(format!(
                    "dial tcp {}: i/o timeout after {:?}",
                    destination, self.dial_timeout
                )))
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", destination, e);
        }

        Ok(stream)
    }

    /// Take the handle that yields the raw client connection once the
    /// success response has been written.
    ///
    /// The HTTP layer only provides it for connections served with upgrades
    /// enabled; without it the socket cannot be taken over.
    pub fn claim_client<B>(request: &mut Request<B>) -> Result<OnUpgrade, ProxyError> {
        request
            .extensions_mut()
            .remove::<OnUpgrade>()
            .ok_or_else(|| {
                ProxyError::HijackUnsupported("connection cannot be upgraded".to_string())
            })
    }
}
