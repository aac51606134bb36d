use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Clonable stop signal shared between the tasks of a session.
///
/// Once cancelled it stays cancelled; tasks spawned through [`SignalOfStop::spawn`]
/// are raced against the signal and dropped as soon as it fires.
#[derive(Debug)]
pub struct SignalOfStop {
    // Shared state between clones
    shared: Arc<SharedState>,
}

#[derive(Debug)]
struct SharedState {
    closing: AtomicBool,
    notify: Notify,
}

impl SignalOfStop {
    pub fn new() -> SignalOfStop {
        SignalOfStop {
            shared: Arc::new(SharedState {
                closing: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        self.shared.closing.store(true, Ordering::Relaxed);
        self.shared.notify.notify_waiters();
    }

    pub fn cancelled(&self) -> bool {
        self.shared.closing.load(Ordering::Relaxed)
    }

    pub async fn wait_cancellation(&self) {
        while !self.cancelled() {
            let notified = self.shared.notify.notified();

            // re-check after registering: notify_waiters only wakes registered waiters
            if self.cancelled() {
                break;
            }
            notified.await;
        }
    }

    /// Spawn a task that is abandoned when the signal fires.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sos = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sos.wait_cancellation() => {}
                _ = future => {}
            }
        })
    }
}

impl Clone for SignalOfStop {
    fn clone(&self) -> SignalOfStop {
        SignalOfStop {
            shared: Arc::clone(&self.shared),
        }
    }
}
