use localloop_core::models::{ItemId, ListingFilter, ListingStatus, WindowId};

use crate::cli::{ListingCommands, ListingFilterArgs};
use crate::commands::common::{
    format_listing_lines, normalize_content, normalize_identifier, open_context, print_json,
    print_lines, wire_label,
};
use crate::error::CliError;

pub async fn run_listings(
    command: Option<ListingCommands>,
    filter: ListingFilterArgs,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let profile = open_context(global_profile)?;
    let listings = &profile.context.listings;

    let Some(command) = command else {
        let as_json = filter.json;
        let filter = listing_filter(filter);
        let found = listings.fetch_listings(&filter).await;
        if let Some(error) = listings.last_error() {
            eprintln!("Warning: {error}");
        }
        if as_json {
            print_json(&found)?;
        } else {
            print_lines(&format_listing_lines(&found));
        }
        return Ok(());
    };

    match command {
        ListingCommands::Show { item } => {
            let item = ItemId::new(normalize_identifier(&item, "Item ID")?);
            match listings.listing_for_item(&item).await? {
                Some(listing) => print_lines(&format_listing_lines(&[listing])),
                None => println!("Item {item} is not listed."),
            }
            for window in listings.availability(&item).await? {
                println!(
                    "  window {}  {} -> {}  {}",
                    window.id,
                    window.start_time.to_rfc3339(),
                    window.end_time.to_rfc3339(),
                    wire_label(&window.status)
                );
            }
            for photo in listings.photos(&item).await? {
                println!("  photo {}  {}", photo.order, photo.photo_url);
            }
        }
        ListingCommands::Publish {
            item,
            listing_type,
            dorm,
        } => {
            profile.require_user()?;
            let item = ItemId::new(normalize_identifier(&item, "Item ID")?);
            listings
                .list_item(&item, listing_type.into(), &dorm)
                .await?;
            println!("Listed {item}");
        }
        ListingCommands::Unlist { item } => {
            profile.require_user()?;
            let item = ItemId::new(normalize_identifier(&item, "Item ID")?);
            listings.unlist_item(&item).await?;
            println!("Unlisted {item}");
        }
        ListingCommands::Status { item, status } => {
            profile.require_user()?;
            let item = ItemId::new(normalize_identifier(&item, "Item ID")?);
            let status: ListingStatus = status.into();
            listings.update_listing_status(&item, status).await?;
            println!("Listing for {item} is now {}", wire_label(&status));
        }
        ListingCommands::AddWindow { item, start, end } => {
            profile.require_user()?;
            let item = ItemId::new(normalize_identifier(&item, "Item ID")?);
            let window = listings.set_availability(&item, start, end).await?;
            println!("{window}");
        }
        ListingCommands::Reserve { window } => {
            profile.require_user()?;
            let window = WindowId::new(normalize_identifier(&window, "Window ID")?);
            listings.reserve_window(&window).await?;
            println!("Reserved window {window}");
        }
        ListingCommands::RemoveWindow { window } => {
            profile.require_user()?;
            let window = WindowId::new(normalize_identifier(&window, "Window ID")?);
            listings.remove_availability(&window).await?;
            println!("Removed window {window}");
        }
        ListingCommands::Count => {
            println!("{}", listings.available_count().await?);
        }
    }
    Ok(())
}

pub fn listing_filter(args: ListingFilterArgs) -> ListingFilter {
    ListingFilter {
        listing_type: args.listing_type.map(Into::into),
        status: args.status.map(Into::into),
        dorm_visibility: args.dorm.as_deref().and_then(normalize_content),
    }
}
