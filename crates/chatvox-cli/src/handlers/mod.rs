//! Command handlers.

pub mod run;
pub mod simulate;
pub mod stats;
pub mod user;

use std::time::Duration;

use anyhow::Result;
use chatvox_engine::{Subscription, TtsService};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::presentation::format_event;

const IDLE_POLL: Duration = Duration::from_millis(100);

/// Print events until the service's broadcaster closes.
pub fn spawn_event_printer(mut subscription: Subscription, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match subscription.events.recv().await {
                Ok(event) => {
                    if json {
                        match serde_json::to_string(&event) {
                            Ok(line) => println!("{line}"),
                            Err(e) => warn!(error = %e, "Failed to serialize event"),
                        }
                    } else if let Some(line) = format_event(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Wait until nothing is pending or playing.
///
/// Returns `false` without waiting further if the processor is paused with
/// work still queued.
pub async fn wait_idle(service: &TtsService) -> Result<bool> {
    loop {
        let status = service.status().await?;
        if status.current.is_none() && status.queue.depth == 0 {
            return Ok(true);
        }
        if status.queue.paused && status.current.is_none() {
            return Ok(false);
        }
        tokio::time::sleep(IDLE_POLL).await;
    }
}
