use chrono::Utc;
use localloop_core::models::{ItemId, NewRequest, RequestId};
use serde::Serialize;

use crate::cli::RequestCommands;
use crate::commands::common::{
    format_request_lines, normalize_identifier, open_context, print_json, print_lines,
};
use crate::error::CliError;

#[derive(Serialize)]
struct RequestLists<T> {
    incoming: Vec<T>,
    outgoing: Vec<T>,
}

pub async fn run_requests(
    command: RequestCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let profile = open_context(global_profile)?;
    let me = profile.require_user()?;
    let requests = &profile.context.requests;

    match command {
        RequestCommands::List { json } => {
            let incoming = requests.fetch_incoming(&me).await;
            let outgoing = requests.fetch_outgoing(&me).await;
            if let Some(error) = requests.last_error() {
                eprintln!("Warning: {error}");
            }
            if json {
                print_json(&RequestLists { incoming, outgoing })?;
            } else {
                let now = Utc::now();
                print_lines(&format_request_lines("Incoming", &incoming, now));
                print_lines(&format_request_lines("Outgoing", &outgoing, now));
            }
        }
        RequestCommands::Create {
            item,
            request_type,
            notes,
            start,
            end,
        } => {
            if let (Some(start), Some(end)) = (start, end) {
                if end <= start {
                    return Err(CliError::InvalidArgument(
                        "--end must be after --start".to_string(),
                    ));
                }
            }
            let new_request = NewRequest {
                requester: me,
                item: ItemId::new(normalize_identifier(&item, "Item ID")?),
                request_type: request_type.into(),
                notes: notes.trim().to_string(),
                start_time: start,
                end_time: end,
            };
            let id = requests.create_request(new_request).await?;
            println!("{id}");
        }
        RequestCommands::Accept { request } => {
            let id = RequestId::new(normalize_identifier(&request, "Request ID")?);
            let item = requests.find(&id).map(|entry| entry.request.item.clone());
            requests.accept_request(&id).await?;
            println!("Accepted {id}");
            if let Some(item) = item {
                match requests.other_pending_requests(&item, &id).await {
                    Ok(others) if !others.is_empty() => {
                        println!("{} other pending request(s) for this item", others.len());
                    }
                    Ok(_) => {}
                    Err(error) => tracing::warn!("Could not load other requests: {}", error),
                }
            }
        }
        RequestCommands::Reject { request } => {
            let id = RequestId::new(normalize_identifier(&request, "Request ID")?);
            requests.reject_request(&id).await?;
            println!("Rejected {id}");
        }
        RequestCommands::Cancel { request } => {
            let id = RequestId::new(normalize_identifier(&request, "Request ID")?);
            requests.cancel_request(&id).await?;
            println!("Cancelled {id}");
        }
    }
    Ok(())
}
