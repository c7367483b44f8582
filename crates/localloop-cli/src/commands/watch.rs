use chrono::Utc;
use localloop_core::events::ConnectionState;
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::{format_notification_line, open_context};
use crate::error::CliError;

pub fn describe_state(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Disconnected => "disconnected".to_string(),
        ConnectionState::Connecting => "connecting...".to_string(),
        ConnectionState::Connected => "connected".to_string(),
        ConnectionState::Error(message) => format!("connection error: {message}"),
    }
}

/// Run the push router until Ctrl-C, printing feed entries as they land.
pub async fn run_watch(global_profile: Option<&str>) -> Result<(), CliError> {
    let profile = open_context(global_profile)?;
    let me = profile.require_user()?;
    let context = &profile.context;

    let mut feed = context.notifications.subscribe();
    let mut states = context.router.subscribe_state();
    println!("Watching as {me}. Press Ctrl-C to stop.");

    let runner = context.router.run(async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", error);
        }
    });
    tokio::pin!(runner);

    loop {
        tokio::select! {
            result = &mut runner => {
                result?;
                break;
            }
            received = feed.recv() => match received {
                Ok(notification) => {
                    println!("{}", format_notification_line(&notification, Utc::now()));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification printer fell behind");
                }
                Err(RecvError::Closed) => {
                    (&mut runner).await?;
                    break;
                }
            },
            changed = states.changed() => {
                if changed.is_err() {
                    (&mut runner).await?;
                    break;
                }
                let state = states.borrow_and_update().clone();
                eprintln!("[{}]", describe_state(&state));
            }
        }
    }

    println!("Stopped watching.");
    Ok(())
}
