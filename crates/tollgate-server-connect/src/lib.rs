//! Authenticated, quota-metered HTTP CONNECT tunnel server
//!
//! A client sends `CONNECT host:port` with a `Proxy-Authorization: Basic`
//! credential whose password half is a signed account token. Each granted
//! tunnel spends one call from the account's quota; afterwards bytes are
//! relayed verbatim until either side closes, and one access record is
//! emitted per tunnel.

pub mod access_log;
pub mod error;
pub mod establish;
pub mod fault;
pub mod handler;
pub mod quota;
pub mod relay;
pub mod server;

pub use access_log::{
    AccessRecord, AccessSink, DbAccessSink, FanoutAccessSink, RecordingAccessSink, SinkError,
    TracingAccessSink,
};
pub use error::ProxyError;
pub use establish::{TunnelEstablisher, DEFAULT_DIAL_TIMEOUT};
pub use fault::{contain, install_panic_hook};
pub use handler::ConnectHandler;
pub use quota::QuotaGate;
pub use relay::{relay, RelayStats};
pub use server::{ProxyServer, ProxyServerConfig, ProxyServerError};
pub use tollgate_auth::PROXY_ERROR_HEADER;
