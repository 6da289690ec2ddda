// src/core/optimizer.rs

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core::registry::Registry;

/// Releases commands that have not been used within a sliding window.
///
/// Internal commands are never released. A released command is loaded back by the
/// registry the next time it is invoked.
#[derive(Debug, Clone)]
pub struct Optimizer {
    registry: Arc<Registry>,
    window: Duration,
}

impl Optimizer {
    pub fn new(registry: Arc<Registry>, window: Duration) -> Self {
        Self { registry, window }
    }

    /// Releases every idle command once. Returns the names released.
    pub fn sweep(&self) -> Vec<String> {
        let now = self.registry.now_ms();
        let cutoff = now.saturating_sub(self.window.as_millis() as u64);
        let released: Vec<String> = self
            .registry
            .idle_since(cutoff)
            .into_iter()
            .filter(|name| self.registry.release(name))
            .collect();
        if !released.is_empty() {
            log::info!("Optimizer released {} idle command(s): {:?}", released.len(), released);
        }
        released
    }

    /// Sweeps every `every` on the current tokio runtime until the handle is aborted.
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}
