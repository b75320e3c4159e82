//! Panic containment for request pipelines and tunnel tasks

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

use crate::ProxyError;

/// Log every panic with a captured backtrace, then defer to the previous hook.
///
/// Call once at startup, after logging is initialised.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        error!(panic = %info, "Panic recovered\n{}", backtrace);
        previous(info);
    }));
}

/// Run `fut`, turning a panic inside it into [`ProxyError::InternalFault`].
///
/// Only the panicking future is torn down; the task driving it keeps going.
pub async fn contain<F, T>(fut: F) -> Result<T, ProxyError>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(value) => Ok(value),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(panic_message = %message, "Request pipeline panicked");
            Err(ProxyError::InternalFault(message))
        }
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
