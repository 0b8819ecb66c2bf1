use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use woms_core::config::{AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in effective_values(&config) {
        let source = field_source(
            entry.key_path,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key_path, &entry.value, source));
    }

    lines.join("\n")
}

struct ConfigEntry {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn entry(key_path: &'static str, value: String, env_keys: &'static [&'static str]) -> ConfigEntry {
    ConfigEntry { key_path, value, env_keys }
}

fn effective_values(config: &AppConfig) -> Vec<ConfigEntry> {
    vec![
        entry("database.url", config.database.url.clone(), &["WOMS_DATABASE_URL"]),
        entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["WOMS_DATABASE_MAX_CONNECTIONS"],
        ),
        entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["WOMS_DATABASE_TIMEOUT_SECS"],
        ),
        entry("server.bind_address", config.server.bind_address.clone(), &["WOMS_SERVER_BIND_ADDRESS"]),
        entry("server.port", config.server.port.to_string(), &["WOMS_SERVER_PORT"]),
        entry(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["WOMS_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        entry(
            "auth.jwt_secret",
            redact_secret(config.auth.jwt_secret.expose_secret()),
            &["WOMS_AUTH_JWT_SECRET"],
        ),
        entry(
            "auth.token_ttl_secs",
            config.auth.token_ttl_secs.to_string(),
            &["WOMS_AUTH_TOKEN_TTL_SECS"],
        ),
        entry(
            "renderer.backend",
            format!("{:?}", config.renderer.backend).to_lowercase(),
            &["WOMS_RENDERER_BACKEND"],
        ),
        entry(
            "renderer.template_dir",
            config.renderer.template_dir.display().to_string(),
            &["WOMS_RENDERER_TEMPLATE_DIR"],
        ),
        entry(
            "renderer.service_url",
            config.renderer.service_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["WOMS_RENDERER_SERVICE_URL"],
        ),
        entry(
            "renderer.timeout_secs",
            config.renderer.timeout_secs.to_string(),
            &["WOMS_RENDERER_TIMEOUT_SECS"],
        ),
        entry(
            "notifications.poll_interval_secs",
            config.notifications.poll_interval_secs.to_string(),
            &["WOMS_NOTIFICATIONS_POLL_INTERVAL_SECS"],
        ),
        entry(
            "listing.default_page_size",
            config.listing.default_page_size.to_string(),
            &["WOMS_LISTING_DEFAULT_PAGE_SIZE"],
        ),
        entry(
            "listing.max_page_size",
            config.listing.max_page_size.to_string(),
            &["WOMS_LISTING_MAX_PAGE_SIZE"],
        ),
        entry("organization.name", config.organization.name.clone(), &["WOMS_ORGANIZATION_NAME"]),
        entry(
            "organization.address",
            config.organization.address.clone(),
            &["WOMS_ORGANIZATION_ADDRESS"],
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["WOMS_LOGGING_LEVEL", "WOMS_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["WOMS_LOGGING_FORMAT", "WOMS_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("woms.toml"), PathBuf::from("config/woms.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Shows only enough of the secret to tell two deployments apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let prefix: String = trimmed.chars().take(2).collect();
    format!("{prefix}***")
}
