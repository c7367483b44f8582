use crate::cli::AuthCommands;
use crate::commands::common::open_context;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let profile = open_context(global_profile)?;
    let session = &profile.context.session;

    match command {
        AuthCommands::Login { username, password } => {
            let signed_in = session.login(&username, &password).await?;
            println!(
                "Signed in profile '{}' as {}",
                profile.name,
                signed_in.username.as_deref().unwrap_or(&username)
            );
        }
        AuthCommands::Register {
            username,
            password,
            email,
        } => {
            let signed_in = session.register(&username, &password, &email).await?;
            println!(
                "Registered and signed in profile '{}' as {}",
                profile.name,
                signed_in.username.as_deref().unwrap_or(&username)
            );
        }
        AuthCommands::Status => match session.session() {
            Some(current) => {
                let user = current
                    .user_id
                    .as_ref()
                    .map_or_else(|| "(unknown id)".to_string(), ToString::to_string);
                let expiry = if session.access_token_expired() {
                    "access token expired, will refresh on next call"
                } else {
                    "access token valid"
                };
                println!(
                    "Profile '{}' is signed in as {} ({user}); {expiry}",
                    profile.name,
                    current.username.as_deref().unwrap_or("(no username)")
                );
            }
            None => println!("Profile '{}' is not signed in.", profile.name),
        },
        AuthCommands::Logout => {
            profile.context.sign_out().await;
            println!("Signed out profile '{}'", profile.name);
        }
        AuthCommands::Password { old, new } => {
            profile.require_user()?;
            if new.trim().is_empty() {
                return Err(CliError::InvalidArgument(
                    "New password cannot be empty".to_string(),
                ));
            }
            profile.context.api.change_password(&old, &new).await?;
            println!("Password changed for profile '{}'", profile.name);
        }
        AuthCommands::DeleteAccount { password } => {
            profile.require_user()?;
            profile.context.api.delete_account(&password).await?;
            profile.context.sign_out().await;
            println!("Account deleted; profile '{}' is signed out", profile.name);
        }
    }
    Ok(())
}
