use chrono::Utc;
use localloop_core::models::{ItemId, UserId};
use localloop_core::pending::SyncStatus;

use crate::cli::MessageCommands;
use crate::commands::common::{
    format_conversation_lines, format_message_lines, normalize_content, normalize_identifier,
    open_context, print_lines,
};
use crate::error::CliError;

pub async fn run_messages(
    command: MessageCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let profile = open_context(global_profile)?;
    let me = profile.require_user()?;
    let messages = &profile.context.messages;

    match command {
        MessageCommands::Send { to, item, content } => {
            let to = UserId::new(normalize_identifier(&to, "Recipient")?);
            let item = ItemId::new(normalize_identifier(&item, "Item ID")?);
            let content = normalize_content(&content.join(" "))
                .ok_or_else(|| CliError::InvalidArgument("Message cannot be empty".to_string()))?;

            let sent = messages.send_message(&me, &to, &item, &content).await;
            if sent.status() == SyncStatus::Failed {
                let reason = messages
                    .last_error()
                    .unwrap_or_else(|| "delivery failed".to_string());
                return Err(CliError::InvalidArgument(format!(
                    "Message kept locally but not delivered: {reason}"
                )));
            }
            println!("{}", sent.id);
        }
        MessageCommands::Show { other, item } => {
            let other = UserId::new(normalize_identifier(&other, "User ID")?);
            let item = ItemId::new(normalize_identifier(&item, "Item ID")?);
            let thread = messages.fetch_messages(&me, &other, &item).await;
            if let Some(error) = messages.last_error() {
                eprintln!("Warning: {error}");
            }
            print_lines(&format_message_lines(&me, &thread, Utc::now()));
        }
        MessageCommands::Read { other, item } => {
            let other = UserId::new(normalize_identifier(&other, "User ID")?);
            let item = ItemId::new(normalize_identifier(&item, "Item ID")?);
            let unread = messages.conversation_unread_count(&me, &other, &item);
            messages.mark_as_read(&me, &other, &item).await?;
            println!("Marked {unread} message(s) as read");
        }
        MessageCommands::Unread => {
            let conversations = messages.user_conversations(&me);
            println!("{} unread", messages.unread_count(&me));
            print_lines(&format_conversation_lines(&me, &conversations, Utc::now()));
        }
    }
    Ok(())
}
