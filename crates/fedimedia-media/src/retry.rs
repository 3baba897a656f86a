//! Background retry pool for processing runs whose caller was cancelled.
//!
//! Jobs are boxed futures fed through an mpsc channel to a dispatcher that
//! bounds concurrency with a semaphore. [`RetryQueue::shutdown`] stops
//! intake, runs whatever is still queued and waits for in-flight jobs.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

type Job = BoxFuture<'static, ()>;

#[derive(Clone)]
pub struct RetryQueue {
    inner: Arc<Inner>,
}

struct Inner {
    job_tx: mpsc::UnboundedSender<Job>,
    shutdown_tx: mpsc::Sender<()>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl RetryQueue {
    /// Spawn the dispatcher. Must be called from within a tokio runtime.
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let dispatcher = tokio::spawn(Self::dispatch_loop(max_workers, job_rx, shutdown_rx));

        Self {
            inner: Arc::new(Inner {
                job_tx,
                shutdown_tx,
                dispatcher: Mutex::new(Some(dispatcher)),
            }),
        }
    }

    /// Queue a job. Returns false once the queue has shut down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.job_tx.send(Box::pin(job)).is_ok()
    }

    /// Stop accepting work, finish everything already queued, then return.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(()).await;
        let handle = self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Retry queue dispatcher panicked");
            }
        }
    }

    async fn dispatch_loop(
        max_workers: usize,
        mut job_rx: mpsc::UnboundedReceiver<Job>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(max_workers, "Retry queue worker pool started");
        let semaphore = Arc::new(Semaphore::new(max_workers));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Retry queue worker pool shutting down");
                    job_rx.close();
                    while let Some(job) = job_rx.recv().await {
                        Self::spawn_job(&semaphore, job).await;
                    }
                    break;
                }
                job = job_rx.recv() => match job {
                    Some(job) => Self::spawn_job(&semaphore, job).await,
                    None => break,
                },
            }
        }

        // Every permit back means every spawned job has finished.
        let _ = semaphore.acquire_many(max_workers as u32).await;
        tracing::info!("Retry queue worker pool stopped");
    }

    async fn spawn_job(semaphore: &Arc<Semaphore>, job: Job) {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!("Retry queue semaphore closed, dropping job");
                return;
            }
        };
        tokio::spawn(async move {
            let _permit = permit;
            job.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_drains_queued_jobs() {
        let queue = RetryQueue::new(2);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let done = done.clone();
            assert!(queue.submit(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        queue.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert!(!queue.submit(async {}));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let queue = RetryQueue::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            let (running, peak) = (running.clone(), peak.clone());
            queue.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }

        queue.shutdown().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
