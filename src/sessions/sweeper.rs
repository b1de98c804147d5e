use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::sessions::manager::SessionManager;

/// Runs [`SessionManager::cleanup_expired_sessions`] every `interval` until
/// `shutdown` is cancelled. The first run happens one interval after start.
pub fn spawn_session_sweeper(
    manager: Arc<SessionManager>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("🛑 Session sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    tracing::info!("🧹 Running scheduled cleanup of expired sessions...");
                    let removed = manager.cleanup_expired_sessions().await;
                    tracing::debug!("Session sweep finished ({} removed)", removed);
                }
            }
        }
    })
}
