use std::path::PathBuf;

use localloop_core::util::{non_blank, normalize_base_url};

use crate::cli::ConfigCommands;
use crate::commands::common::open_context;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub async fn run_config(
    command: ConfigCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_base_url,
            request_timeout_secs,
            data_dir,
            no_activate,
        } => run_config_init(
            global_profile,
            api_base_url,
            request_timeout_secs,
            data_dir,
            no_activate,
        ),
        ConfigCommands::Show => run_config_show(global_profile),
        ConfigCommands::Check => run_config_check(global_profile).await,
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    data_dir: Option<PathBuf>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let api_base_url = normalize_api_base_url(api_base_url)?;
    let profile = config.profile_mut_or_default(&profile_name);
    if let Some(url) = api_base_url {
        profile.api_base_url = Some(url);
    }
    if request_timeout_secs.is_some() {
        profile.request_timeout_secs = request_timeout_secs;
    }
    if data_dir.is_some() {
        profile.data_dir = data_dir;
    }
    if profile.api_base_url().is_none() {
        return Err(CliError::Config(format!(
            "Profile '{profile_name}' needs --api-base-url"
        )));
    }

    if !no_activate || config.active_profile.is_none() {
        config.active_profile = Some(profile_name.clone());
    }
    let path = config.save().map_err(CliError::Config)?;
    println!("Saved profile '{profile_name}' to {}", path.display());
    Ok(())
}

/// Validate an explicit base URL. `None` leaves the stored one in place.
pub fn normalize_api_base_url(value: Option<String>) -> Result<Option<String>, CliError> {
    let Some(value) = value.as_deref().and_then(non_blank) else {
        return Ok(None);
    };
    normalize_base_url(&value).map(Some).map_err(CliError::from)
}

fn run_config_show(global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);
    let Some(profile) = config.profile(&profile_name) else {
        println!("Profile '{profile_name}' is not configured.");
        return Ok(());
    };
    let resolved = profile
        .client_config(&profile_name)
        .map_err(CliError::Config)?;
    println!("profile: {profile_name}");
    println!("api_base_url: {}", resolved.api_base_url);
    println!("events_url: {}", resolved.events_url());
    println!("request_timeout_secs: {}", resolved.request_timeout_secs);
    if let Some(dir) = &resolved.data_dir {
        println!("data_dir: {}", dir.display());
    }
    Ok(())
}

async fn run_config_check(global_profile: Option<&str>) -> Result<(), CliError> {
    let profile = open_context(global_profile)?;
    let base = profile.context.config.api_base_url.clone();
    let status = profile.context.check_backend().await?;
    println!("Backend at {base} answered with HTTP {status}");
    Ok(())
}
