// Panic isolation for handler execution
use std::any::Any;
use std::future::Future;
use tracing::error;

/// Outcome of a panic-guarded execution
#[derive(Debug)]
pub enum Guarded<T> {
    /// The future ran to completion
    Completed(T),
    /// The future panicked (message extracted from the payload)
    Panicked(String),
    /// The task was aborted before finishing
    Cancelled,
}

/// Run `future` on its own task so a panic cannot unwind into the caller
///
/// A panicking handler must not take the worker (or the process) down with it.
pub async fn execute_guarded<F, T>(future: F) -> Guarded<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(future).await {
        Ok(value) => Guarded::Completed(value),
        Err(join_err) if join_err.is_panic() => {
            let panic_msg = panic_message(join_err.into_panic());
            error!(panic_msg = %panic_msg, "Worker task panicked");
            Guarded::Panicked(panic_msg)
        }
        Err(_) => Guarded::Cancelled,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
