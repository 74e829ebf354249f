//! Background expiry of abandoned upload sessions.
//!
//! A periodic task scans the upload directory and deletes sessions whose
//! `startedat` stamp is older than the configured timeout. Sessions with a
//! missing or unparseable stamp are expired too. The task is owned by the
//! server and joined on shutdown.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::storage::Storage;

pub struct Reaper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Reaper {
    pub fn spawn(storage: Arc<dyn Storage>, interval: Duration, timeout: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match sweep_expired(storage.as_ref(), timeout).await {
                            Ok(0) => {}
                            Ok(reaped) => tracing::info!("reaped {reaped} expired upload sessions"),
                            Err(e) => tracing::warn!("upload reaper sweep failed: {e}"),
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
            tracing::debug!("upload reaper stopped");
        });
        Reaper { shutdown, handle }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Deletes every session older than `timeout`. Returns the number reaped.
pub async fn sweep_expired(storage: &dyn Storage, timeout: Duration) -> io::Result<usize> {
    let now = chrono::Utc::now();
    let mut reaped = 0;
    for session in storage.list_uploads().await? {
        let expired = match session.started_at {
            Some(started) => {
                let age = now.signed_duration_since(started);
                age.num_seconds() >= 0 && age.num_seconds() as u64 > timeout.as_secs()
            }
            // No readable stamp: nothing will ever finalize this session.
            None => true,
        };
        if expired && storage.delete_upload(&session.id).await? {
            tracing::debug!("reaped expired upload session {}", session.id);
            reaped += 1;
        }
    }
    Ok(reaped)
}
