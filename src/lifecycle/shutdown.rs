//! Shutdown fan-out for the polling loop and the file watcher.

use tokio::sync::broadcast;

/// One trigger, many listeners. Each background task holds a receiver
/// and exits when it fires.
#[derive(Clone)]
pub struct Shutdown(broadcast::Sender<()>);

impl Shutdown {
    pub fn new() -> Self {
        Self(broadcast::channel(1).0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.0.subscribe()
    }

    /// Fire once; a trigger with no listeners is a no-op.
    pub fn trigger(&self) {
        let _ = self.0.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
