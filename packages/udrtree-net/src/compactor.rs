use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::replica::SharedEngine;

pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(10);

/// Periodically trims the causally stable prefix of the operation log.
pub struct Compactor {
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Compactor {
    pub fn spawn(engine: SharedEngine, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let (removed, stable, remaining) = {
                            let mut engine = engine.lock();
                            let removed = engine.compact();
                            (removed, engine.stable_timestamp(), engine.log().len())
                        };
                        if removed > 0 {
                            debug!(removed, ?stable, remaining, "compacted operation log");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("compactor stopped");
        });

        Self {
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    /// Stop the timer and wait for an in-flight pass to finish.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}
