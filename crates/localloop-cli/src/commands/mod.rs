pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod config;
pub mod items;
pub mod listings;
pub mod messages;
pub mod notifications;
pub mod profile;
pub mod requests;
pub mod transactions;
pub mod watch;
