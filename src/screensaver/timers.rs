use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tasks spawned by a mode, cancelled together
#[derive(Debug, Default)]
pub struct TimerRegistry {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task that receives the registry's cancellation token
    pub fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handles.retain(|handle| !handle.is_finished());
        self.handles.push(tokio::spawn(task(self.token.child_token())));
    }

    pub fn len(&self) -> usize {
        self.handles.iter().filter(|handle| !handle.is_finished()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every task and wait until all of them terminated
    ///
    /// The registry can be reused afterwards.
    pub async fn cancel_all(&mut self) {
        let token = std::mem::take(&mut self.token);
        token.cancel();

        for handle in self.handles.drain(..) {
            handle.abort();

            if let Err(error) = handle.await {
                if !error.is_cancelled() {
                    warn!(error = %error, "mode task failed");
                }
            }
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.token.cancel();

        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cancel_all_stops_every_task() {
        let ticks = Arc::new(AtomicU32::new(0));
        let mut timers = TimerRegistry::new();

        for _ in 0..3 {
            let ticks = ticks.clone();
            timers.spawn(move |token| async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(10)) => {
                            ticks.fetch_add(1, Ordering::SeqCst);
                        }
                        _ = token.cancelled() => break,
                    }
                }
            });
        }

        tokio::time::sleep(Duration::from_millis(55)).await;
        assert_eq!(timers.len(), 3);

        timers.cancel_all().await;
        let after = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(timers.is_empty());
        assert_eq!(ticks.load(Ordering::SeqCst), after);

        // Idempotent
        timers.cancel_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn registry_is_reusable_after_cancel() {
        let mut timers = TimerRegistry::new();
        timers.cancel_all().await;

        let ran = Arc::new(AtomicU32::new(0));
        timers.spawn({
            let ran = ran.clone();
            move |token| async move {
                if !token.is_cancelled() {
                    ran.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
