//! Bidirectional byte relay between a claimed client socket and its destination

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::fault::panic_message;
use crate::ProxyError;

const RELAY_BUFFER_SIZE: usize = 8192;

/// Byte counts and lifetime of one finished tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_destination: u64,
    pub destination_to_client: u64,
    pub duration: Duration,
}

impl RelayStats {
    pub fn total(&self) -> u64 {
        self.client_to_destination + self.destination_to_client
    }
}

/// Copy bytes both ways until either side finishes.
///
/// Each direction runs in its own task. When one direction sees EOF or an
/// error it shuts down its write side and cancels the other. Both tasks are
/// joined before the stats are read, so bytes moved by a cancelled task are
/// still counted.
pub async fn relay<C, D>(client: C, destination: D) -> Result<RelayStats, ProxyError>
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    D: AsyncRead + AsyncWrite + Send + 'static,
{
    let started = Instant::now();

    let (client_read, client_write) = tokio::io::split(client);
    let (destination_read, destination_write) = tokio::io::split(destination);

    let upstream_bytes = Arc::new(AtomicU64::new(0));
    let downstream_bytes = Arc::new(AtomicU64::new(0));
    let cancel = CancellationToken::new();

    let client_to_destination = tokio::spawn(pump(
        client_read,
        destination_write,
        upstream_bytes.clone(),
        cancel.clone(),
        "client->destination",
    ));
    let destination_to_client = tokio::spawn(pump(
        destination_read,
        client_write,
        downstream_bytes.clone(),
        cancel.clone(),
        "destination->client",
    ));

    let (upstream, downstream) = tokio::join!(client_to_destination, destination_to_client);

    for joined in [upstream, downstream] {
        if let Err(e) = joined {
            let message = if e.is_panic() {
                panic_message(e.into_panic().as_ref())
            } else {
                e.to_string()
            };
            return Err(ProxyError::InternalFault(message));
        }
    }

    Ok(RelayStats {
        client_to_destination: upstream_bytes.load(Ordering::Relaxed),
        destination_to_client: downstream_bytes.load(Ordering::Relaxed),
        duration: started.elapsed(),
    })
}

async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    counter: Arc<AtomicU64>,
    cancel: CancellationToken,
    direction: &'static str,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Cancels the opposite direction on every exit path, panics included
    let _guard = cancel.clone().drop_guard();
    let mut buffer = vec![0u8; RELAY_BUFFER_SIZE];

    'relay: loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("{} cancelled", direction);
                break;
            }
            read = reader.read(&mut buffer) => match read {
                Ok(0) => {
                    debug!("{} reached EOF", direction);
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!("{} read error: {}", direction, e);
                    break;
                }
            },
        };

        // Counted per write: a cancelled tunnel reports exactly what reached the peer
        let mut written = 0;
        while written < n {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("{} cancelled mid-write", direction);
                    break 'relay;
                }
                write = writer.write(&buffer[written..n]) => match write {
                    Ok(0) => {
                        debug!("{} writer closed", direction);
                        break 'relay;
                    }
                    Ok(k) => {
                        written += k;
                        counter.fetch_add(k as u64, Ordering::Relaxed);
                    }
                    Err(e) => {
                        debug!("{} write error: {}", direction, e);
                        break 'relay;
                    }
                },
            }
        }
    }

    let _ = writer.shutdown().await;
}
