use localloop_core::models::{ProfileUpdate, UserId, UserProfile};

use crate::cli::ProfileCommands;
use crate::commands::common::{normalize_content, normalize_identifier, open_context};
use crate::error::CliError;

pub async fn run_profile(
    command: ProfileCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let profile = open_context(global_profile)?;
    let profiles = &profile.context.profiles;

    match command {
        ProfileCommands::Show { user } => {
            let user = match user {
                Some(user) => UserId::new(normalize_identifier(&user, "User ID")?),
                None => profile.require_user()?,
            };
            match profiles.refresh(&user).await? {
                Some(found) => {
                    for line in format_profile_lines(&found) {
                        println!("{line}");
                    }
                }
                None => println!("User {user} has no profile yet."),
            }
        }
        ProfileCommands::Create { name, dorm } => {
            let me = profile.require_user()?;
            let name = normalize_identifier(&name, "Display name")?;
            let dorm = normalize_identifier(&dorm, "Dorm")?;
            profiles.create_profile(&me, &name, &dorm).await?;
            println!("Created profile for {me}");
        }
        ProfileCommands::Update { name, dorm, bio } => {
            let me = profile.require_user()?;
            let current = profiles.profile(&me).await?.ok_or_else(|| {
                CliError::InvalidArgument(
                    "No profile yet. Run `localloop profile create` first.".to_string(),
                )
            })?;
            let update = merge_profile(&current, name, dorm, bio);
            profiles.update_profile(&me, &update).await?;
            println!("Updated profile for {me}");
        }
    }
    Ok(())
}

pub fn merge_profile(
    current: &UserProfile,
    name: Option<String>,
    dorm: Option<String>,
    bio: Option<String>,
) -> ProfileUpdate {
    ProfileUpdate {
        display_name: name
            .as_deref()
            .and_then(normalize_content)
            .unwrap_or_else(|| current.display_name.clone()),
        dorm: dorm
            .as_deref()
            .and_then(normalize_content)
            .unwrap_or_else(|| current.dorm.clone()),
        bio: bio.map_or_else(|| current.bio.clone(), |bio| bio.trim().to_string()),
    }
}

pub fn format_profile_lines(profile: &UserProfile) -> Vec<String> {
    let mut lines = vec![
        format!("{}  ({})", profile.display_name, profile.user),
        format!("dorm: {}", profile.dorm),
        format!(
            "reputation: {:.1} (lender {:.1}, borrower {:.1})",
            profile.reputation(),
            profile.lender_score,
            profile.borrower_score
        ),
        format!("points: {}", profile.points),
    ];
    if !profile.bio.is_empty() {
        lines.push(String::new());
        lines.push(profile.bio.clone());
    }
    lines
}
