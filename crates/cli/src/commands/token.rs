use anyhow::{anyhow, Context};
use chrono::Utc;
use woms_core::config::AppConfig;
use woms_core::domain::actor::{Actor, Role};
use woms_core::session::TokenCodec;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub actor: String,
    pub name: String,
    pub role: String,
    pub unconfirmed: bool,
}

/// Prints a bearer token signed with the configured secret. Role names are
/// matched the same way the server reads them back from the token.
pub fn run(request: TokenRequest) -> CommandResult {
    let config = match load_config("token") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    match issue(&config, &request) {
        Ok(token) => CommandResult::success("token", token),
        Err(error) => CommandResult::failure("token", "invalid_actor", format!("{error:#}"), 2),
    }
}

fn issue(config: &AppConfig, request: &TokenRequest) -> anyhow::Result<String> {
    let role = Role::parse(&request.role).ok_or_else(|| {
        anyhow!(
            "unknown role `{}` (expected one of: {})",
            request.role,
            Role::ALL.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
        )
    })?;
    if request.actor.trim().is_empty() {
        return Err(anyhow!("--actor must not be empty"));
    }

    let mut actor = Actor::new(request.actor.trim(), request.name.trim(), role);
    if request.unconfirmed {
        actor = actor.unconfirmed();
    }

    TokenCodec::new(config.auth.jwt_secret.clone(), config.auth.token_ttl_secs)
        .issue(&actor, Utc::now())
        .context("failed to sign token")
}
