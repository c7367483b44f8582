use localloop_core::cache::transactions::LifecycleAction;
use localloop_core::models::TransactionId;

use crate::cli::TransactionCommands;
use crate::commands::common::{
    format_transaction_lines, normalize_identifier, open_context, print_json, print_lines,
};
use crate::error::CliError;

pub async fn run_transactions(
    command: TransactionCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let profile = open_context(global_profile)?;
    let me = profile.require_user()?;
    let transactions = &profile.context.transactions;

    let (raw_id, action, done) = match command {
        TransactionCommands::List { json } => {
            let all = transactions.fetch_transactions(&me).await;
            if let Some(error) = transactions.last_error() {
                eprintln!("Warning: {error}");
            }
            if json {
                print_json(&all)?;
            } else {
                print_lines(&format_transaction_lines(&all));
            }
            return Ok(());
        }
        TransactionCommands::Pickup { transaction } => {
            (transaction, LifecycleAction::PickUp, "Marked picked up")
        }
        TransactionCommands::Return { transaction } => {
            (transaction, LifecycleAction::Return, "Marked returned")
        }
        TransactionCommands::Confirm { transaction } => {
            (transaction, LifecycleAction::ConfirmReturn, "Confirmed return of")
        }
        TransactionCommands::Cancel { transaction } => {
            (transaction, LifecycleAction::Cancel, "Cancelled")
        }
    };

    let id = TransactionId::new(normalize_identifier(&raw_id, "Transaction ID")?);
    transactions.run_lifecycle(&id, action).await?;
    println!("{done} {id}");
    Ok(())
}
