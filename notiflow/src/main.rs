use std::path::PathBuf;

use notiflow::NotificationCenter;
use notiflow::channel::SessionIdentity;
use notiflow::config::NotiflowConfig;
use notiflow::logging;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_dir = std::env::var("NOTIFLOW_LOG_DIR").ok().map(PathBuf::from);
    let (logging_config, _guard) = logging::init_logging(log_dir.as_deref())?;
    let cancel = CancellationToken::new();
    logging_config.start_retention_cleanup(cancel.clone());

    let config = NotiflowConfig::from_env()?;
    let user_id = std::env::var("NOTIFLOW_USER_ID").unwrap_or_else(|_| "anonymous".to_string());
    let session = SessionIdentity::new(user_id, config.backend.token.clone());

    let center = NotificationCenter::from_config(config)?;
    center.start(session)?;
    info!("notiflow started; press Ctrl+C to stop");

    let mut toasts = center.subscribe_toasts();
    let mut unread = center.subscribe_unread();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = toasts.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = toasts.borrow_and_update().clone();
                for toast in &snapshot.visible {
                    info!(
                        display_id = %toast.display_id,
                        kind = %toast.notification.kind,
                        priority = %toast.notification.priority,
                        title = %toast.notification.title,
                        "Toast"
                    );
                }
                if snapshot.overflow > 0 {
                    info!(overflow = snapshot.overflow, "More toasts hidden");
                }
            }
            changed = unread.changed() => {
                if changed.is_err() {
                    warn!("Unread counter closed");
                    break;
                }
                info!(unread = *unread.borrow_and_update(), "Unread count");
            }
        }
    }

    center.shutdown().await;
    cancel.cancel();
    info!(stats = ?center.stats(), "notiflow stopped");
    Ok(())
}
