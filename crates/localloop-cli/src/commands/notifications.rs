use chrono::Utc;

use crate::cli::NotificationCommands;
use crate::commands::common::{format_notification_line, open_context, print_json};
use crate::error::CliError;

pub fn run_notifications(
    command: NotificationCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let profile = open_context(global_profile)?;
    let feed = &profile.context.notifications;

    match command {
        NotificationCommands::List { json } => {
            let notifications = feed.notifications();
            if json {
                print_json(&notifications)?;
            } else if notifications.is_empty() {
                println!("No notifications.");
            } else {
                let now = Utc::now();
                println!("{} unread", feed.unread_count());
                for notification in &notifications {
                    println!("{}", format_notification_line(notification, now));
                }
            }
        }
        NotificationCommands::Read { id: Some(id), .. } => {
            if !feed.mark_read(id.trim()) {
                println!("Nothing to mark: {} is unknown or already read", id.trim());
            }
        }
        NotificationCommands::Read { id: None, all } => {
            if !all {
                return Err(CliError::InvalidArgument(
                    "Pass a notification id or --all".to_string(),
                ));
            }
            feed.mark_all_read();
        }
        NotificationCommands::Clear { id: Some(id) } => {
            if !feed.dismiss(id.trim()) {
                println!("No notification {}", id.trim());
            }
        }
        NotificationCommands::Clear { id: None } => feed.clear(),
    }
    Ok(())
}
