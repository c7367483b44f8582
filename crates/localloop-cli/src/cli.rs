use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use localloop_core::models::{ListingStatus, ListingType, RequestType};

#[derive(Parser)]
#[command(name = "localloop")]
#[command(about = "Borrow and lend items around campus from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name (backend URL and keychain session)
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage authentication for a CLI profile
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Manage CLI profile configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Browse and manage listings (browses when no subcommand is given)
    Listings {
        #[command(subcommand)]
        command: Option<ListingCommands>,
        #[command(flatten)]
        filter: ListingFilterArgs,
    },
    /// Show or edit user profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Manage your items
    Items {
        #[command(subcommand)]
        command: ItemCommands,
    },
    /// Borrow requests you sent or received
    Requests {
        #[command(subcommand)]
        command: RequestCommands,
    },
    /// Lending transactions you take part in
    Transactions {
        #[command(subcommand)]
        command: TransactionCommands,
    },
    /// Conversations about a transaction's item
    Messages {
        #[command(subcommand)]
        command: MessageCommands,
    },
    /// The local notification feed
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },
    /// Stay connected to the server push stream and print notifications
    Watch,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in with username and password
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        email: String,
    },
    /// Show the signed-in account
    Status,
    /// Sign out and clear the stored session
    Logout,
    /// Change the account password
    Password {
        #[arg(long)]
        old: String,
        #[arg(long)]
        new: String,
    },
    /// Delete the account and sign out
    DeleteAccount {
        #[arg(long)]
        password: String,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Show a profile (yours when no user is given)
    Show { user: Option<String> },
    /// Create your profile
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        dorm: String,
    },
    /// Update your profile; omitted fields keep their value
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        dorm: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the CLI profile named by --profile, LOCALLOOP_PROFILE,
    /// the active profile, or "default"
    Init {
        /// Backend base URL, with or without a trailing /api
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Request timeout in seconds
        #[arg(long, value_name = "SECS")]
        request_timeout_secs: Option<u64>,
        /// Directory for cached conversations and notifications
        #[arg(long, value_name = "PATH")]
        data_dir: Option<PathBuf>,
        /// Keep the current active profile unchanged
        #[arg(long)]
        no_activate: bool,
    },
    /// Show the resolved configuration
    Show,
    /// Check that the backend answers
    Check,
}

#[derive(Args, Default)]
pub struct ListingFilterArgs {
    /// Only listings with this status
    #[arg(long, value_enum)]
    pub status: Option<ListingStatusArg>,
    /// Only listings of this type
    #[arg(long = "type", value_enum)]
    pub listing_type: Option<ListingTypeArg>,
    /// Only listings visible to this dorm
    #[arg(long)]
    pub dorm: Option<String>,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum ListingCommands {
    /// Show one item's listing, availability and photos
    Show { item: String },
    /// Publish an item
    Publish {
        item: String,
        #[arg(long = "type", value_enum, default_value_t = ListingTypeArg::Borrow)]
        listing_type: ListingTypeArg,
        /// Dorm the listing is visible to
        #[arg(long)]
        dorm: String,
    },
    /// Withdraw an item's listing
    Unlist { item: String },
    /// Change a listing's status
    Status {
        item: String,
        #[arg(value_enum)]
        status: ListingStatusArg,
    },
    /// Add an availability window (RFC 3339 times)
    AddWindow {
        item: String,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
    },
    /// Reserve an availability window
    Reserve { window: String },
    /// Remove an availability window
    RemoveWindow { window: String },
    /// Count currently available items
    Count,
}

#[derive(Subcommand)]
pub enum ItemCommands {
    /// List items you own
    Mine {
        #[arg(long)]
        json: bool,
    },
    /// List every item on the marketplace
    All {
        #[arg(long)]
        json: bool,
    },
    /// Show an item
    Show { item: String },
    /// Create an item
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "")]
        condition: String,
    },
    /// Update an item's details; omitted fields keep their value
    Update {
        item: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        condition: Option<String>,
    },
    /// Delete an item
    Delete { item: String },
}

#[derive(Subcommand)]
pub enum RequestCommands {
    /// List incoming and outgoing requests
    List {
        #[arg(long)]
        json: bool,
    },
    /// Ask to borrow or receive an item
    Create {
        item: String,
        #[arg(long = "type", value_enum, default_value_t = RequestTypeArg::Borrow)]
        request_type: RequestTypeArg,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
    /// Accept an incoming request
    Accept { request: String },
    /// Reject an incoming request
    Reject { request: String },
    /// Cancel one of your requests
    Cancel { request: String },
}

#[derive(Subcommand)]
pub enum TransactionCommands {
    /// List your transactions
    List {
        #[arg(long)]
        json: bool,
    },
    /// Mark the item as picked up
    Pickup { transaction: String },
    /// Mark the item as returned
    Return { transaction: String },
    /// Confirm the item came back
    Confirm { transaction: String },
    /// Cancel an open transaction
    Cancel { transaction: String },
}

#[derive(Subcommand)]
pub enum MessageCommands {
    /// Send a message about an item
    Send {
        /// Recipient user id
        to: String,
        /// Item id the conversation is about
        item: String,
        /// Message text
        content: Vec<String>,
    },
    /// Show a conversation, fetching backend history
    Show { other: String, item: String },
    /// Mark a conversation as read
    Read { other: String, item: String },
    /// List conversations with unread counts
    Unread,
}

#[derive(Subcommand)]
pub enum NotificationCommands {
    /// List the feed, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Mark one notification, or all of them, as read
    Read {
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Dismiss one notification, or clear the feed
    Clear { id: Option<String> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ListingTypeArg {
    Borrow,
    Transfer,
}

impl From<ListingTypeArg> for ListingType {
    fn from(value: ListingTypeArg) -> Self {
        match value {
            ListingTypeArg::Borrow => Self::Borrow,
            ListingTypeArg::Transfer => Self::Transfer,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ListingStatusArg {
    Available,
    Pending,
    Claimed,
    Expired,
}

impl From<ListingStatusArg> for ListingStatus {
    fn from(value: ListingStatusArg) -> Self {
        match value {
            ListingStatusArg::Available => Self::Available,
            ListingStatusArg::Pending => Self::Pending,
            ListingStatusArg::Claimed => Self::Claimed,
            ListingStatusArg::Expired => Self::Expired,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RequestTypeArg {
    Borrow,
    Transfer,
    Item,
}

impl From<RequestTypeArg> for RequestType {
    fn from(value: RequestTypeArg) -> Self {
        match value {
            RequestTypeArg::Borrow => Self::Borrow,
            RequestTypeArg::Transfer => Self::Transfer,
            RequestTypeArg::Item => Self::Item,
        }
    }
}
