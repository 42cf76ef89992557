use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use log::{debug, error, info};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::model::{Action, Task};
use crate::ops;
use crate::registry::Registry;

/// Current UTC calendar date. Due dates carry no time of day.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Focus every overdue task and push one `update` event per promoted row.
pub fn run_once(conn: &Connection, registry: &Registry, today: NaiveDate) -> Result<Vec<Task>> {
    let promoted = ops::sweep_overdue(conn, today)?;
    for task in &promoted {
        registry.broadcast(Action::Update, task);
    }
    if !promoted.is_empty() {
        debug!("Marked {} overdue tasks as focused", promoted.len());
    }
    Ok(promoted)
}

/// Sweep immediately and then once per `period` until the task is aborted.
pub fn spawn(
    db: Arc<Mutex<Connection>>,
    registry: Arc<Registry>,
    period: Duration,
) -> JoinHandle<()> {
    info!("Overdue sweep every {}s", period.as_secs());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let conn = db.lock().await;
            if let Err(e) = run_once(&conn, &registry, today()) {
                error!("Error checking overdue tasks: {e:#}");
            }
        }
    })
}
