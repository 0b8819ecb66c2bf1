use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::documents::Organization;
use crate::listing::PageLimits;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub renderer: RendererConfig,
    pub notifications: NotificationConfig,
    pub listing: ListingConfig,
    pub organization: OrganizationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub token_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RendererConfig {
    pub backend: RendererBackend,
    pub template_dir: PathBuf,
    pub service_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub poll_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ListingConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl ListingConfig {
    pub fn limits(&self) -> PageLimits {
        PageLimits { default_page_size: self.default_page_size, max_page_size: self.max_page_size }
    }
}

#[derive(Clone, Debug)]
pub struct OrganizationConfig {
    pub name: String,
    pub address: String,
}

impl OrganizationConfig {
    pub fn to_organization(&self) -> Organization {
        Organization { name: self.name.clone(), address: self.address.clone() }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererBackend {
    Html,
    Wkhtmltopdf,
    Http,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub jwt_secret: Option<String>,
    pub renderer_backend: Option<RendererBackend>,
    pub renderer_service_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://woms.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            auth: AuthConfig { jwt_secret: String::new().into(), token_ttl_secs: 36_000 },
            renderer: RendererConfig {
                backend: RendererBackend::Html,
                template_dir: PathBuf::from("templates/documents"),
                service_url: None,
                timeout_secs: 20,
            },
            notifications: NotificationConfig { poll_interval_secs: 15 },
            listing: ListingConfig { default_page_size: 7, max_page_size: 50 },
            organization: OrganizationConfig {
                name: "Warehouse Operations".to_string(),
                address: String::new(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for RendererBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "wkhtmltopdf" => Ok(Self::Wkhtmltopdf),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::Validation(format!(
                "unsupported renderer backend `{other}` (expected html|wkhtmltopdf|http)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("woms.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(jwt_secret) = auth.jwt_secret {
                self.auth.jwt_secret = secret_value(jwt_secret);
            }
            if let Some(token_ttl_secs) = auth.token_ttl_secs {
                self.auth.token_ttl_secs = token_ttl_secs;
            }
        }

        if let Some(renderer) = patch.renderer {
            if let Some(backend) = renderer.backend {
                self.renderer.backend = backend;
            }
            if let Some(template_dir) = renderer.template_dir {
                self.renderer.template_dir = template_dir;
            }
            if let Some(service_url) = renderer.service_url {
                self.renderer.service_url = Some(service_url);
            }
            if let Some(timeout_secs) = renderer.timeout_secs {
                self.renderer.timeout_secs = timeout_secs;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(poll_interval_secs) = notifications.poll_interval_secs {
                self.notifications.poll_interval_secs = poll_interval_secs;
            }
        }

        if let Some(listing) = patch.listing {
            if let Some(default_page_size) = listing.default_page_size {
                self.listing.default_page_size = default_page_size;
            }
            if let Some(max_page_size) = listing.max_page_size {
                self.listing.max_page_size = max_page_size;
            }
        }

        if let Some(organization) = patch.organization {
            if let Some(name) = organization.name {
                self.organization.name = name;
            }
            if let Some(address) = organization.address {
                self.organization.address = address;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("WOMS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("WOMS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("WOMS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("WOMS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("WOMS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WOMS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("WOMS_SERVER_PORT") {
            self.server.port = parse_u16("WOMS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("WOMS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("WOMS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("WOMS_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = secret_value(value);
        }
        if let Some(value) = read_env("WOMS_AUTH_TOKEN_TTL_SECS") {
            self.auth.token_ttl_secs = parse_u64("WOMS_AUTH_TOKEN_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("WOMS_RENDERER_BACKEND") {
            self.renderer.backend = value.parse()?;
        }
        if let Some(value) = read_env("WOMS_RENDERER_TEMPLATE_DIR") {
            self.renderer.template_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("WOMS_RENDERER_SERVICE_URL") {
            self.renderer.service_url = Some(value);
        }
        if let Some(value) = read_env("WOMS_RENDERER_TIMEOUT_SECS") {
            self.renderer.timeout_secs = parse_u64("WOMS_RENDERER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WOMS_NOTIFICATIONS_POLL_INTERVAL_SECS") {
            self.notifications.poll_interval_secs =
                parse_u64("WOMS_NOTIFICATIONS_POLL_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("WOMS_LISTING_DEFAULT_PAGE_SIZE") {
            self.listing.default_page_size = parse_u32("WOMS_LISTING_DEFAULT_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("WOMS_LISTING_MAX_PAGE_SIZE") {
            self.listing.max_page_size = parse_u32("WOMS_LISTING_MAX_PAGE_SIZE", &value)?;
        }

        if let Some(value) = read_env("WOMS_ORGANIZATION_NAME") {
            self.organization.name = value;
        }
        if let Some(value) = read_env("WOMS_ORGANIZATION_ADDRESS") {
            self.organization.address = value;
        }

        let log_level = read_env("WOMS_LOGGING_LEVEL").or_else(|| read_env("WOMS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("WOMS_LOGGING_FORMAT").or_else(|| read_env("WOMS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(jwt_secret) = overrides.jwt_secret {
            self.auth.jwt_secret = secret_value(jwt_secret);
        }
        if let Some(backend) = overrides.renderer_backend {
            self.renderer.backend = backend;
        }
        if let Some(service_url) = overrides.renderer_service_url {
            self.renderer.service_url = Some(service_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_renderer(&self.renderer)?;
        validate_notifications(&self.notifications)?;
        validate_listing(&self.listing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("woms.toml"), PathBuf::from("config/woms.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let secret = auth.jwt_secret.expose_secret();
    if secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.jwt_secret is required. Set WOMS_AUTH_JWT_SECRET or [auth] jwt_secret"
                .to_string(),
        ));
    }
    if secret.len() < 16 {
        return Err(ConfigError::Validation(
            "auth.jwt_secret must be at least 16 characters long".to_string(),
        ));
    }
    if auth.token_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "auth.token_ttl_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_renderer(renderer: &RendererConfig) -> Result<(), ConfigError> {
    if renderer.timeout_secs == 0 || renderer.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "renderer.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if renderer.backend == RendererBackend::Http {
        let Some(url) = renderer.service_url.as_deref().map(str::trim) else {
            return Err(ConfigError::Validation(
                "renderer.service_url is required for the http renderer backend".to_string(),
            ));
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "renderer.service_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationConfig) -> Result<(), ConfigError> {
    if notifications.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "notifications.poll_interval_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_listing(listing: &ListingConfig) -> Result<(), ConfigError> {
    if listing.max_page_size == 0 || listing.max_page_size > 500 {
        return Err(ConfigError::Validation(
            "listing.max_page_size must be in range 1..=500".to_string(),
        ));
    }
    if listing.default_page_size == 0 || listing.default_page_size > listing.max_page_size {
        return Err(ConfigError::Validation(
            "listing.default_page_size must be in range 1..=listing.max_page_size".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    renderer: Option<RendererPatch>,
    notifications: Option<NotificationPatch>,
    listing: Option<ListingPatch>,
    organization: Option<OrganizationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    jwt_secret: Option<String>,
    token_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RendererPatch {
    backend: Option<RendererBackend>,
    template_dir: Option<PathBuf>,
    service_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    poll_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ListingPatch {
    default_page_size: Option<u32>,
    max_page_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct OrganizationPatch {
    name: Option<String>,
    address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
