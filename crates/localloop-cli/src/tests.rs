use chrono::{Duration, TimeZone, Utc};
use clap::Parser;
use localloop_core::events::ConnectionState;
use localloop_core::models::{
    Item, ItemId, ListingStatus, ListingType, Notification, NotificationKind, UserId,
    UserProfile,
};
use localloop_core::pending::SyncStatus;
use pretty_assertions::assert_eq;

use crate::cli::{
    Cli, Commands, CompletionShell, ListingCommands, ListingFilterArgs, ListingStatusArg,
    ListingTypeArg, MessageCommands, NotificationCommands, RequestCommands, RequestTypeArg,
};
use crate::commands::common::{
    format_item_lines, format_notification_line, format_relative_time, normalize_content,
    normalize_identifier, preview, sync_marker, wire_label,
};
use crate::commands::completions::render_completions;
use crate::commands::config::normalize_api_base_url;
use crate::commands::items::merge_details;
use crate::commands::listings::listing_filter;
use crate::commands::profile::{format_profile_lines, merge_profile};
use crate::commands::watch::describe_state;

fn item(id: &str, title: &str) -> Item {
    Item {
        id: ItemId::new(id),
        owner: None,
        title: title.to_string(),
        description: "Warm light".to_string(),
        category: "Electronics".to_string(),
        condition: "Good".to_string(),
        created_at: None,
    }
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn empty_identifiers_are_rejected() {
    assert_eq!(normalize_identifier(" r1 ", "Request ID").unwrap(), "r1");
    assert!(normalize_identifier("   ", "Request ID").is_err());
}

#[test]
fn format_relative_time_units() {
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
    assert_eq!(format_relative_time(now - Duration::minutes(2), now), "2m ago");
    assert_eq!(format_relative_time(now - Duration::hours(2), now), "2h ago");
    assert_eq!(format_relative_time(now - Duration::days(3), now), "3d ago");
    assert_eq!(format_relative_time(now - Duration::days(30), now), "2024-02-09");
}

#[test]
fn future_timestamps_read_as_just_now() {
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    assert_eq!(format_relative_time(now + Duration::minutes(5), now), "just now");
}

#[test]
fn preview_truncates_first_line() {
    assert_eq!(preview("short\nsecond line"), "short");
    let long = "x".repeat(100);
    let shown = preview(&long);
    assert_eq!(shown.chars().count(), 60);
    assert!(shown.ends_with("..."));
}

#[test]
fn sync_marker_flags_unconfirmed_entries() {
    assert_eq!(sync_marker(SyncStatus::Confirmed), "");
    assert_eq!(sync_marker(SyncStatus::Optimistic), " (sending)");
    assert_eq!(sync_marker(SyncStatus::Failed), " (failed)");
}

#[test]
fn wire_labels_match_backend_names() {
    assert_eq!(wire_label(&ListingStatus::Available), "AVAILABLE");
    assert_eq!(wire_label(&ListingType::Transfer), "TRANSFER");
}

#[test]
fn item_lines_show_id_title_and_category() {
    assert_eq!(
        format_item_lines(&[item("i1", "Desk lamp")]),
        vec!["i1  Desk lamp [Electronics]".to_string()]
    );
    assert_eq!(format_item_lines(&[]), vec!["No items.".to_string()]);
}

#[test]
fn unread_notifications_are_starred() {
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    let mut notification = Notification::new(
        NotificationKind::Message,
        "m1",
        "New message",
        "Is the lamp still free?",
        now - Duration::minutes(5),
    );
    assert_eq!(
        format_notification_line(&notification, now),
        "* message_m1  New message: Is the lamp still free?  (5m ago)"
    );
    notification.read = true;
    assert!(format_notification_line(&notification, now).starts_with("  message_m1"));
}

#[test]
fn api_base_url_requires_http_scheme() {
    assert_eq!(
        normalize_api_base_url(Some(" https://localloop.example.edu/ ".to_string())).unwrap(),
        Some("https://localloop.example.edu".to_string())
    );
    assert_eq!(normalize_api_base_url(Some("  ".to_string())).unwrap(), None);
    assert!(normalize_api_base_url(Some("localloop.example.edu".to_string())).is_err());
}

#[test]
fn item_update_keeps_omitted_fields() {
    let current = item("i1", "Desk lamp");
    let details = merge_details(&current, Some("Floor lamp".to_string()), None, None, None);
    assert_eq!(details.title, "Floor lamp");
    assert_eq!(details.description, "Warm light");
    assert_eq!(details.condition, "Good");
}

#[test]
fn listing_filter_maps_arguments() {
    let filter = listing_filter(ListingFilterArgs {
        status: Some(ListingStatusArg::Available),
        listing_type: Some(ListingTypeArg::Borrow),
        dorm: Some("  ".to_string()),
        json: false,
    });
    assert_eq!(filter.status, Some(ListingStatus::Available));
    assert_eq!(filter.listing_type, Some(ListingType::Borrow));
    assert_eq!(filter.dorm_visibility, None);
}

#[test]
fn listings_without_subcommand_browse_with_filters() {
    let cli = Cli::try_parse_from([
        "localloop",
        "listings",
        "--status",
        "available",
        "--dorm",
        "North",
    ])
    .unwrap();
    let Commands::Listings { command, filter } = cli.command else {
        panic!("expected listings");
    };
    assert!(command.is_none());
    assert_eq!(filter.status, Some(ListingStatusArg::Available));
    assert_eq!(filter.dorm.as_deref(), Some("North"));
}

#[test]
fn add_window_parses_rfc3339_times() {
    let cli = Cli::try_parse_from([
        "localloop",
        "listings",
        "add-window",
        "i1",
        "--start",
        "2024-03-10T09:00:00Z",
        "--end",
        "2024-03-10T11:00:00Z",
    ])
    .unwrap();
    let Commands::Listings {
        command: Some(ListingCommands::AddWindow { item, start, end }),
        ..
    } = cli.command
    else {
        panic!("expected add-window");
    };
    assert_eq!(item, "i1");
    assert_eq!(end - start, Duration::hours(2));
}

#[test]
fn global_profile_is_accepted_after_subcommand() {
    let cli = Cli::try_parse_from([
        "localloop",
        "requests",
        "create",
        "i1",
        "--type",
        "transfer",
        "--profile",
        "campus",
    ])
    .unwrap();
    assert_eq!(cli.profile.as_deref(), Some("campus"));
    let Commands::Requests {
        command: RequestCommands::Create { request_type, .. },
    } = cli.command
    else {
        panic!("expected requests create");
    };
    assert_eq!(request_type, RequestTypeArg::Transfer);
}

#[test]
fn message_content_collects_trailing_words() {
    let cli = Cli::try_parse_from(["localloop", "messages", "send", "u2", "i1", "see", "you"])
        .unwrap();
    let Commands::Messages {
        command: MessageCommands::Send { to, item, content },
    } = cli.command
    else {
        panic!("expected messages send");
    };
    assert_eq!((to.as_str(), item.as_str()), ("u2", "i1"));
    assert_eq!(content.join(" "), "see you");
}

#[test]
fn notification_read_all_conflicts_with_id() {
    assert!(Cli::try_parse_from(["localloop", "notifications", "read", "n1", "--all"]).is_err());
    let cli = Cli::try_parse_from(["localloop", "notifications", "read", "--all"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Notifications {
            command: NotificationCommands::Read { id: None, all: true }
        }
    ));
}

#[test]
fn connection_states_are_described() {
    assert_eq!(describe_state(&ConnectionState::Connecting), "connecting...");
    assert_eq!(
        describe_state(&ConnectionState::Error("closed by server".to_string())),
        "connection error: closed by server"
    );
}

#[test]
fn completions_name_the_binary() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("localloop"));
}

fn profile() -> UserProfile {
    UserProfile {
        user: UserId::new("u1"),
        display_name: "Alex".to_string(),
        dorm: "North".to_string(),
        bio: String::new(),
        created_at: None,
        lender_score: 5.0,
        borrower_score: 4.0,
        points: 12,
        avatar_url: None,
    }
}

#[test]
fn profile_update_keeps_omitted_fields() {
    let update = merge_profile(&profile(), None, Some(" South ".to_string()), None);
    assert_eq!(update.display_name, "Alex");
    assert_eq!(update.dorm, "South");
    assert_eq!(update.bio, "");
}

#[test]
fn profile_lines_show_reputation() {
    let lines = format_profile_lines(&profile());
    assert_eq!(lines[0], "Alex  (u1)");
    assert_eq!(lines[2], "reputation: 4.5 (lender 5.0, borrower 4.0)");
}
