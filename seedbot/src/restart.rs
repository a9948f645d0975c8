use std::sync::Arc;

use tokio::sync::watch;

/// Process-wide restart request.
///
/// Every polling loop holds a clone and selects on [`RestartSignal::fired`];
/// once fired, all of them stop at their next select point and `main`
/// relaunches the process.
#[derive(Clone)]
pub struct RestartSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl RestartSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request a restart. Firing more than once is harmless.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal has been fired.
    pub async fn fired(&mut self) {
        // The sender lives as long as any clone of self, so this can't fail
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

impl Default for RestartSignal {
    fn default() -> Self {
        Self::new()
    }
}
