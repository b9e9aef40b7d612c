//! Cross-thread invocation bridge.
//!
//! The engine's event loop owns the live chat connection and all session
//! state. Code running elsewhere (controller threads, other tasks) cannot touch
//! that state directly; instead it hands a unit of work to the [`Bridge`],
//! which queues it onto the loop and waits for the result.
//!
//! - Jobs run strictly on the loop, one at a time, in submission order.
//! - A job that was queued always runs, even if its caller stopped waiting.
//! - The loop attaches itself with [`Bridge::attach`]; dropping the returned
//!   [`BridgeReceiver`] detaches it again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, mpsc as std_mpsc};
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Default time a caller waits for the loop (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A queued unit of work, run with exclusive access to the loop's context.
pub type Job<C> = Box<dyn for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, ()> + Send>;

// ============================================================================
// Errors
// ============================================================================

/// Errors returned to a bridge caller.
#[derive(Debug, Error)]
pub enum BridgeError<E> {
    /// No loop is attached.
    #[error("event loop is not running")]
    NotRunning,

    /// A loop is attached but no longer accepts work.
    #[error("event loop is closed")]
    Closed,

    /// The caller stopped waiting. The job may still complete on the loop.
    #[error("timed out after {0:?} waiting for the event loop")]
    Timeout(Duration),

    /// The loop went away before running the job.
    #[error("event loop stopped before the job completed")]
    Dropped,

    /// The job ran and returned an error.
    #[error("{0}")]
    Failed(E),
}

impl<E> BridgeError<E> {
    /// True for the "loop missing or closed" family of errors.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NotRunning | Self::Closed | Self::Dropped)
    }
}

// ============================================================================
// Bridge
// ============================================================================

struct Attached<C> {
    generation: u64,
    tx: mpsc::UnboundedSender<Job<C>>,
}

struct Shared<C> {
    slot: RwLock<Option<Attached<C>>>,
    next_generation: AtomicU64,
}

/// Thread-safe handle for submitting work to the owning loop.
///
/// Cheap to clone; every clone talks to the same loop.
pub struct Bridge<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for Bridge<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Send + 'static> Default for Bridge<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + 'static> Bridge<C> {
    /// Create a bridge with no loop attached.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: RwLock::new(None),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Attach a loop, replacing any previous one.
    ///
    /// The loop receives jobs from the returned receiver.
    pub fn attach(&self) -> BridgeReceiver<C> {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        *self
            .shared
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Attached { generation, tx });
        debug!(generation, "Event loop attached to bridge");
        BridgeReceiver {
            rx,
            generation,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Detach the current loop. Queued jobs still reach it; new submissions fail.
    pub fn detach(&self) {
        self.shared
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// True if a loop is attached and accepting work.
    pub fn is_available(&self) -> bool {
        self.shared
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|a| !a.tx.is_closed())
    }

    /// Submit work and block the calling thread until it completes, fails,
    /// or `timeout` elapses.
    ///
    /// Meant for threads outside the async runtime. Calling it from a task
    /// running on the loop's own runtime thread would stall that thread.
    pub fn submit_and_wait<T, E, F>(&self, work: F, timeout: Duration) -> Result<T, BridgeError<E>>
    where
        F: for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = std_mpsc::sync_channel(1);
        self.enqueue(work, move |result| {
            let _ = tx.send(result);
        })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(BridgeError::Failed),
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(?timeout, "Bridge caller timed out; job keeps running on the loop");
                Err(BridgeError::Timeout(timeout))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(BridgeError::Dropped),
        }
    }

    /// Async counterpart of [`Bridge::submit_and_wait`] for callers that are
    /// themselves tasks.
    pub async fn submit<T, E, F>(&self, work: F, timeout: Duration) -> Result<T, BridgeError<E>>
    where
        F: for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(work, move |result| {
            let _ = tx.send(result);
        })?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result.map_err(BridgeError::Failed),
            Ok(Err(_)) => Err(BridgeError::Dropped),
            Err(_) => {
                warn!(?timeout, "Bridge caller timed out; job keeps running on the loop");
                Err(BridgeError::Timeout(timeout))
            }
        }
    }

    fn enqueue<T, E, F, R>(&self, work: F, reply: R) -> Result<(), BridgeError<E>>
    where
        F: for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, Result<T, E>> + Send + 'static,
        R: FnOnce(Result<T, E>) + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let slot = self
            .shared
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(attached) = slot.as_ref() else {
            return Err(BridgeError::NotRunning);
        };

        let job: Job<C> = Box::new(move |ctx: &mut C| {
            let fut = work(ctx);
            Box::pin(async move {
                reply(fut.await);
            })
        });

        attached.tx.send(job).map_err(|_| BridgeError::Closed)
    }
}

// ============================================================================
// Receiver (loop side)
// ============================================================================

/// Loop-side end of the bridge.
pub struct BridgeReceiver<C> {
    rx: mpsc::UnboundedReceiver<Job<C>>,
    generation: u64,
    shared: Arc<Shared<C>>,
}

impl<C> BridgeReceiver<C> {
    /// Wait for the next job. `None` once detached and drained.
    pub async fn recv(&mut self) -> Option<Job<C>> {
        self.rx.recv().await
    }

    /// Take a queued job without waiting.
    pub fn try_recv(&mut self) -> Option<Job<C>> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new jobs. Already queued jobs can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl<C> Drop for BridgeReceiver<C> {
    fn drop(&mut self) {
        let mut slot = self
            .shared
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|a| a.generation == self.generation)
        {
            slot.take();
            debug!(generation = self.generation, "Event loop detached from bridge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::JoinHandle;

    #[derive(Default)]
    struct Counter {
        value: u32,
        order: Vec<u32>,
    }

    fn spawn_loop(bridge: &Bridge<Counter>) -> JoinHandle<Counter> {
        let mut jobs = bridge.attach();
        tokio::spawn(async move {
            let mut ctx = Counter::default();
            while let Some(job) = jobs.recv().await {
                job(&mut ctx).await;
            }
            ctx
        })
    }

    fn add(
        n: u32,
    ) -> impl for<'a> FnOnce(&'a mut Counter) -> BoxFuture<'a, Result<u32, String>> + Send + 'static
    {
        move |ctx| {
            Box::pin(async move {
                ctx.value += n;
                ctx.order.push(n);
                Ok(ctx.value)
            })
        }
    }

    #[tokio::test]
    async fn submit_returns_job_result() {
        let bridge = Bridge::new();
        let handle = spawn_loop(&bridge);

        let value = bridge.submit(add(3), DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(value, 3);

        bridge.detach();
        assert_eq!(handle.await.unwrap().value, 3);
    }

    #[tokio::test]
    async fn submit_reraises_job_error() {
        let bridge: Bridge<Counter> = Bridge::new();
        let _handle = spawn_loop(&bridge);

        let err = bridge
            .submit(
                |_ctx| Box::pin(async { Err::<(), _>("unknown group".to_string()) }),
                DEFAULT_TIMEOUT,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Failed(ref msg) if msg == "unknown group"));
        assert!(!err.is_unavailable());
    }

    #[tokio::test]
    async fn submit_without_loop_is_not_running() {
        let bridge: Bridge<Counter> = Bridge::new();
        assert!(!bridge.is_available());

        let err = bridge.submit(add(1), DEFAULT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotRunning));
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn closed_loop_rejects_work() {
        let bridge: Bridge<Counter> = Bridge::new();
        let mut jobs = bridge.attach();
        jobs.close();

        assert!(!bridge.is_available());
        let err = bridge.submit(add(1), DEFAULT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, BridgeError::Closed));
    }

    #[tokio::test]
    async fn dropping_receiver_detaches() {
        let bridge: Bridge<Counter> = Bridge::new();
        let jobs = bridge.attach();
        assert!(bridge.is_available());

        drop(jobs);

        assert!(!bridge.is_available());
        assert!(matches!(
            bridge.submit(add(1), DEFAULT_TIMEOUT).await,
            Err(BridgeError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn stale_receiver_does_not_detach_newer_loop() {
        let bridge: Bridge<Counter> = Bridge::new();
        let old = bridge.attach();
        let _handle = spawn_loop(&bridge);

        drop(old);

        assert!(bridge.is_available());
        assert_eq!(bridge.submit(add(2), DEFAULT_TIMEOUT).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn queued_job_dropped_with_loop_reports_dropped() {
        let bridge: Bridge<Counter> = Bridge::new();
        let jobs = bridge.attach();

        let caller = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.submit(add(1), DEFAULT_TIMEOUT).await })
        };
        let mut jobs = jobs;
        while jobs.rx.is_empty() {
            tokio::task::yield_now().await;
        }
        drop(jobs);

        assert!(matches!(caller.await.unwrap(), Err(BridgeError::Dropped)));
    }

    #[tokio::test]
    async fn timed_out_job_still_completes() {
        let bridge: Bridge<Counter> = Bridge::new();
        let _handle = spawn_loop(&bridge);

        let err = bridge
            .submit(
                |ctx| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(150)).await;
                        ctx.value = 42;
                        Ok::<_, String>(())
                    })
                },
                Duration::from_millis(10),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(_)));

        let value = bridge.submit(add(0), DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submit_and_wait_from_foreign_threads_runs_in_order() {
        let bridge: Bridge<Counter> = Bridge::new();
        let handle = spawn_loop(&bridge);

        for n in 1..=5 {
            let bridge = bridge.clone();
            let value =
                tokio::task::spawn_blocking(move || bridge.submit_and_wait(add(n), DEFAULT_TIMEOUT))
                    .await
                    .unwrap()
                    .unwrap();
            assert_eq!(value, (1..=n).sum::<u32>());
        }

        bridge.detach();
        let ctx = handle.await.unwrap();
        assert_eq!(ctx.order, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn submit_and_wait_without_loop_fails_fast() {
        let bridge: Bridge<Counter> = Bridge::new();
        let err = bridge.submit_and_wait(add(1), DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, BridgeError::NotRunning));
    }
}
