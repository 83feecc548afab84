//! Background TTL sweeper.
//!
//! A spawned task calls [`SecureVault::sweep_expired`] on the vault's
//! configured cadence until told to stop through a watch channel. The loop
//! waits on the channel with the interval as a timeout, so a shutdown signal
//! interrupts the wait instead of finishing it out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::vault::SecureVault;

/// Controls a running sweeper task.
///
/// Dropping the handle closes the channel and the task stops at its next
/// wakeup; [`shutdown`](Self::shutdown) stops it promptly and waits for it.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task to stop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Whether the task has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the sweep loop for `vault`.
///
/// Sweeping is idempotent, so cancellation at any point between passes is
/// safe. Must be called from within a tokio runtime.
pub fn spawn_sweeper(vault: Arc<SecureVault>) -> SweeperHandle {
    let interval = Duration::from_millis(vault.sweep_interval_ms().max(1) as u64);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        tracing::info!(interval_ms = interval.as_millis() as u64, "sweeper started");
        loop {
            match tokio::time::timeout(interval, shutdown_rx.changed()).await {
                Ok(Ok(())) => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("sweeper stopped");
                        return;
                    }
                }
                Ok(Err(_)) => {
                    // Sender dropped: nobody can stop the loop later, so
                    // stop it now.
                    tracing::info!("sweeper handle dropped, stopping");
                    return;
                }
                Err(_elapsed) => {
                    vault.sweep_expired();
                }
            }
        }
    });

    SweeperHandle { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::VaultConfig;
    use serde_json::json;

    fn fast_sweep_vault() -> Arc<SecureVault> {
        let config = VaultConfig {
            sweep_interval_ms: 20,
            ..VaultConfig::default()
        };
        Arc::new(SecureVault::open("correct horse battery", config).unwrap())
    }

    #[tokio::test]
    async fn sweeps_expired_entries_in_the_background() {
        let vault = fast_sweep_vault();
        let record = json!({ "name": "Jane Doe" }).as_object().unwrap().clone();
        vault.store_with_ttl("p1", &record, 1, "dr-jones").unwrap();

        let handle = spawn_sweeper(Arc::clone(&vault));
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.shutdown().await;

        let stats = vault.stats();
        assert_eq!(stats.item_count, 0);
        assert!(stats.total_sweeps >= 1);
        assert_eq!(stats.total_expired, 1);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let vault = fast_sweep_vault();
        let handle = spawn_sweeper(Arc::clone(&vault));
        handle.shutdown().await;

        let sweeps = vault.stats().total_sweeps;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(vault.stats().total_sweeps, sweeps);
    }
}
