use localloop_core::models::{Item, ItemDetails, ItemId};

use crate::cli::ItemCommands;
use crate::commands::common::{
    format_item_lines, normalize_identifier, open_context, print_json, print_lines,
};
use crate::error::CliError;

pub async fn run_items(command: ItemCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let profile = open_context(global_profile)?;
    let items = &profile.context.items;

    match command {
        ItemCommands::Mine { json } => {
            let me = profile.require_user()?;
            let mine = items.items_by_owner(&me).await?;
            if json {
                print_json(&mine)?;
            } else {
                print_lines(&format_item_lines(&mine));
            }
        }
        ItemCommands::All { json } => {
            let all = items.all_items().await?;
            if json {
                print_json(&all)?;
            } else {
                print_lines(&format_item_lines(&all));
            }
        }
        ItemCommands::Show { item } => {
            let id = ItemId::new(normalize_identifier(&item, "Item ID")?);
            let item = items.item(&id).await?;
            let owner = match &item.owner {
                Some(owner) => profile.context.profiles.display_name(owner).await,
                None => "(unknown owner)".to_string(),
            };
            println!("{}  {}", item.id, item.display_title());
            println!("owner: {owner}");
            if !item.category.is_empty() {
                println!("category: {}", item.category);
            }
            if !item.condition.is_empty() {
                println!("condition: {}", item.condition);
            }
            if !item.description.is_empty() {
                println!();
                println!("{}", item.description);
            }
        }
        ItemCommands::Create {
            title,
            description,
            category,
            condition,
        } => {
            let me = profile.require_user()?;
            let details = ItemDetails {
                title,
                description,
                category,
                condition,
            };
            let id = items.create_item(&me, details).await?;
            println!("{id}");
        }
        ItemCommands::Update {
            item,
            title,
            description,
            category,
            condition,
        } => {
            profile.require_user()?;
            let id = ItemId::new(normalize_identifier(&item, "Item ID")?);
            let current = items.item(&id).await?;
            let details = merge_details(&current, title, description, category, condition);
            items.update_item(&id, details).await?;
            println!("Updated {id}");
        }
        ItemCommands::Delete { item } => {
            profile.require_user()?;
            let id = ItemId::new(normalize_identifier(&item, "Item ID")?);
            items.delete_item(&id).await?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

pub fn merge_details(
    current: &Item,
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    condition: Option<String>,
) -> ItemDetails {
    ItemDetails {
        title: title.unwrap_or_else(|| current.title.clone()),
        description: description.unwrap_or_else(|| current.description.clone()),
        category: category.unwrap_or_else(|| current.category.clone()),
        condition: condition.unwrap_or_else(|| current.condition.clone()),
    }
}
