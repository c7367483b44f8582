use std::sync::Arc;

use chrono::{DateTime, Utc};
use localloop_core::models::{
    Conversation, Item, Listing, Message, Notification, RequestWithItem, TransactionWithItem,
    UserId,
};
use localloop_core::pending::{SyncStatus, Tracked};
use localloop_core::storage::JsonFileStore;
use localloop_core::AppContext;
use serde::Serialize;

use crate::auth::KeyringStore;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

const PREVIEW_LENGTH: usize = 60;

/// An application context bound to one CLI profile.
pub struct ProfileContext {
    pub name: String,
    pub context: AppContext,
}

/// Load the profile, wire the client and restore any stored session.
pub fn open_context(global_profile: Option<&str>) -> Result<ProfileContext, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let name = config.resolve_profile_name(global_profile);
    let profile = config.profile(&name).cloned().unwrap_or_default();
    let client_config = profile.client_config(&name).map_err(CliError::Config)?;
    let data_dir = client_config.data_dir.clone().ok_or_else(|| {
        CliError::Config(format!("Profile '{name}' has no data directory"))
    })?;

    let cache_store = Arc::new(JsonFileStore::open_in(&data_dir)?);
    let session_store = Arc::new(KeyringStore::new(&name));
    let context = AppContext::new(client_config, session_store, cache_store)?;
    context.initialize()?;
    Ok(ProfileContext { name, context })
}

impl ProfileContext {
    /// The signed-in user, or an error telling how to sign in.
    pub fn require_user(&self) -> Result<UserId, CliError> {
        self.context.session.current_user_id().ok_or_else(|| {
            CliError::Auth(format!(
                "Profile '{}' is not signed in. Run `localloop auth login` first.",
                self.name
            ))
        })
    }
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_identifier(raw: &str, label: &str) -> Result<String, CliError> {
    normalize_content(raw)
        .ok_or_else(|| CliError::InvalidArgument(format!("{label} cannot be empty")))
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - timestamp).num_seconds().max(0);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3_600 {
        format!("{}m ago", diff / 60)
    } else if diff < 86_400 {
        format!("{}h ago", diff / 3_600)
    } else if diff < 604_800 {
        format!("{}d ago", diff / 86_400)
    } else {
        timestamp.format("%Y-%m-%d").to_string()
    }
}

pub fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.chars().count() > PREVIEW_LENGTH {
        let truncated: String = first_line.chars().take(PREVIEW_LENGTH - 3).collect();
        format!("{truncated}...")
    } else {
        first_line.to_string()
    }
}

/// Suffix shown after entries the backend has not confirmed.
pub const fn sync_marker(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Confirmed => "",
        SyncStatus::Optimistic => " (sending)",
        SyncStatus::Failed => " (failed)",
    }
}

/// Uppercase wire label of a serde-renamed enum.
pub fn wire_label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn item_title(item: Option<&Item>) -> &str {
    item.map_or("(unknown item)", Item::display_title)
}

pub fn format_item_lines(items: &[Item]) -> Vec<String> {
    if items.is_empty() {
        return vec!["No items.".to_string()];
    }
    items
        .iter()
        .map(|item| {
            let category = if item.category.is_empty() {
                String::new()
            } else {
                format!(" [{}]", item.category)
            };
            format!("{}  {}{}", item.id, item.display_title(), category)
        })
        .collect()
}

pub fn format_listing_lines(listings: &[Listing]) -> Vec<String> {
    if listings.is_empty() {
        return vec!["No listings.".to_string()];
    }
    listings
        .iter()
        .map(|listing| {
            let item = listing
                .item
                .as_ref()
                .map_or_else(|| "(no item)".to_string(), ToString::to_string);
            format!(
                "{item}  {} {}  dorm={}",
                wire_label(&listing.listing_type),
                wire_label(&listing.status),
                listing.dorm_visibility
            )
        })
        .collect()
}

pub fn format_request_lines(
    heading: &str,
    requests: &[Tracked<RequestWithItem>],
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut lines = vec![format!("{heading} ({})", requests.len())];
    for entry in requests {
        lines.push(format!(
            "  {}  {} {}  {}  {}{}",
            entry.request.id,
            wire_label(&entry.request.request_type),
            wire_label(&entry.request.status),
            item_title(entry.item_details.as_ref()),
            format_relative_time(entry.request.created_at, now),
            sync_marker(entry.status())
        ));
    }
    lines
}

pub fn format_transaction_lines(transactions: &[Tracked<TransactionWithItem>]) -> Vec<String> {
    if transactions.is_empty() {
        return vec!["No transactions.".to_string()];
    }
    transactions
        .iter()
        .map(|entry| {
            let role = if entry.is_lending { "lending" } else { "borrowing" };
            format!(
                "{}  {}  {}  {}{}",
                entry.transaction.id,
                wire_label(&entry.transaction.status),
                role,
                item_title(entry.item_details.as_ref()),
                sync_marker(entry.status())
            )
        })
        .collect()
}

pub fn format_message_lines(
    viewer: &UserId,
    messages: &[Tracked<Message>],
    now: DateTime<Utc>,
) -> Vec<String> {
    if messages.is_empty() {
        return vec!["No messages yet.".to_string()];
    }
    messages
        .iter()
        .map(|entry| {
            let author = if &entry.from_user_id == viewer {
                "you".to_string()
            } else {
                entry.from_user_id.to_string()
            };
            format!(
                "[{}] {author}: {}{}",
                format_relative_time(entry.timestamp, now),
                entry.content,
                sync_marker(entry.status())
            )
        })
        .collect()
}

pub fn format_conversation_lines(
    viewer: &UserId,
    conversations: &[Conversation],
    now: DateTime<Utc>,
) -> Vec<String> {
    if conversations.is_empty() {
        return vec!["No conversations.".to_string()];
    }
    conversations
        .iter()
        .map(|conversation| {
            let last = conversation
                .messages
                .last()
                .map(|message| preview(&message.content))
                .unwrap_or_default();
            format!(
                "{} about {}  unread={}  {}  {last}",
                conversation.other_user_id,
                conversation.item_id,
                conversation.unread_count(viewer),
                format_relative_time(conversation.last_message_time, now)
            )
        })
        .collect()
}

pub fn format_notification_line(notification: &Notification, now: DateTime<Utc>) -> String {
    let marker = if notification.read { " " } else { "*" };
    format!(
        "{marker} {}  {}: {}  ({})",
        notification.id,
        notification.title,
        preview(&notification.message),
        format_relative_time(notification.timestamp, now)
    )
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
