//! Asynchronous utilities for use with Tokio.

use crate::prelude::*;

pub mod io;

/// Run CPU-heavy work like PDF splitting on Tokio's blocking thread pool, so
/// progress bars and timers keep running. Panics in `f` are re-raised here.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Ok(value),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => Err(anyhow!("blocking task was cancelled: {}", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value_from_blocking_task() {
        let value = spawn_blocking_propagating_panics(|| 6 * 7).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    #[should_panic(expected = "kaboom")]
    async fn propagates_panics() {
        spawn_blocking_propagating_panics(|| -> u32 { panic!("kaboom") })
            .await
            .unwrap();
    }
}
