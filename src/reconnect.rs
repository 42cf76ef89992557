//! Follow the server's push stream, reconnecting with exponential backoff.

use std::ops::ControlFlow;
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use log::{info, warn};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::model::TaskEvent;

pub const MAX_ATTEMPTS: u32 = 5;
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Retry schedule: `base * 2^(n-1)` before the n-th attempt, up to
/// `max_attempts` attempts. A successful connection resets the count.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempts: u32,
    max_attempts: u32,
    base: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BASE_DELAY, MAX_ATTEMPTS)
    }
}

impl Backoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            base,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.base * 2u32.pow(self.attempts - 1))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Stream events from `url` into `on_event` until it returns
/// `ControlFlow::Break`, or until reconnect attempts run out.
///
/// Frames that do not parse as a task event are logged and skipped.
pub async fn follow<F>(url: &str, mut backoff: Backoff, mut on_event: F) -> Result<()>
where
    F: FnMut(TaskEvent) -> ControlFlow<()>,
{
    loop {
        match connect_async(url).await {
            Ok((mut stream, _)) => {
                info!("Connected to {url}");
                backoff.reset();
                while let Some(frame) = stream.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            match serde_json::from_str::<TaskEvent>(text.as_str()) {
                                Ok(event) => {
                                    if on_event(event).is_break() {
                                        return Ok(());
                                    }
                                }
                                Err(e) => warn!("Ignoring malformed message: {e}"),
                            }
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Connection error: {e}");
                            break;
                        }
                    }
                }
                info!("Disconnected from {url}");
            }
            Err(e) => warn!("Failed to connect to {url}: {e}"),
        }

        match backoff.next_delay() {
            Some(delay) => {
                info!(
                    "Reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    backoff.attempts(),
                    backoff.max_attempts()
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                warn!("Giving up after {} reconnect attempts", backoff.max_attempts());
                return Ok(());
            }
        }
    }
}
