//! Bridging from synchronous storage traits onto the ambient tokio runtime.
//!
//! The event store, number allocator, and cursor store traits are
//! synchronous while sqlx is async. Their Postgres impls run each query to
//! completion through [`block_on_ambient`], which is safe to call both from
//! plain threads that entered the runtime (the job executor, subscriber
//! threads spawned via `spawn_blocking`) and from async worker threads
//! (axum handlers), where blocking directly would panic.

use std::future::Future;

/// No tokio runtime was entered on the calling thread.
#[derive(Debug, thiserror::Error)]
#[error("no tokio runtime on this thread")]
pub struct NoRuntime;

/// Runs `fut` to completion on the current runtime.
///
/// `block_in_place` hands the worker's scheduling duties to another thread
/// before blocking, so this cannot stall the runtime when invoked from an
/// async task. Requires the multi-thread runtime flavor.
pub fn block_on_ambient<F, T>(fut: F) -> Result<T, NoRuntime>
where
    F: Future<Output = T>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| NoRuntime)?;
    Ok(tokio::task::block_in_place(move || handle.block_on(fut)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fails_without_a_runtime() {
        assert!(block_on_ambient(async { 1 }).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn bridges_from_an_async_worker_thread() {
        // Synchronous store impls end up called from inside spawned tasks;
        // the bridge must not panic there.
        let value = tokio::spawn(async { block_on_ambient(async { 41 + 1 }).unwrap() })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn bridges_from_a_blocking_pool_thread() {
        let value = tokio::task::spawn_blocking(|| block_on_ambient(async { 7 }).unwrap())
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
