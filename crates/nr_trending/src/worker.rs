use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::engine::TrendingEngine;

/// Handle to the background recompute loop.
pub struct TrendingHandle {
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TrendingHandle {
    pub(crate) fn spawn(engine: Arc<TrendingEngine>) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(run(engine, rx));
        Self {
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    pub async fn is_running(&self) -> bool {
        match self.task.lock().await.as_ref() {
            Some(task) => !task.is_finished(),
            None => false,
        }
    }

    /// Signal the loop and wait for it to exit. Safe to call more than once.
    pub async fn stop(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = self.shutdown.send(true);
            if let Err(e) = task.await {
                error!(error = %e, "Trending worker task failed");
            }
            info!("Trending worker stopped");
        }
    }
}

async fn run(engine: Arc<TrendingEngine>, mut shutdown: watch::Receiver<bool>) {
    let period = engine.config().interval;
    info!(interval = ?period, "Starting trending worker");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; the first cycle runs one period in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = engine.run_cycle().await {
                    error!(error = %e, "Trending computation failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
