//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::refresh::RefreshTimings;
use crate::application::search::PageLimits;
use crate::cache::ResultCacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "eventscout";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_WORKFLOW_TIMEOUT_SECS: u64 = 120;
const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
const DEFAULT_SYNC_MAX_WAIT_SECS: u64 = 120;
const DEFAULT_READ_MAX_WAIT_SECS: u64 = 90;
const DEFAULT_RUNNING_GRACE_MS: u64 = 5_000;
const DEFAULT_PAGE_LIMIT: u32 = 50;
const DEFAULT_MAX_PAGE_LIMIT: u32 = 200;

/// Provincial capitals whose names are recognized in free-text locations.
pub const DEFAULT_RECOGNIZED_CITIES: [&str; 12] = [
    "Milano", "Bergamo", "Brescia", "Como", "Cremona", "Lecco", "Lodi", "Mantova", "Monza",
    "Pavia", "Sondrio", "Varese",
];

/// Command-line arguments for the eventscout binary.
#[derive(Debug, Parser)]
#[command(
    name = "eventscout",
    version,
    about = "Event catalog search with cached ingestion refresh"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "EVENTSCOUT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API.
    Serve(Box<ServeArgs>),
    /// Trigger an ingestion run now, bypassing freshness checks.
    Refresh(RefreshArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkflowOverride {
    /// Override the ingestion workflow webhook URL.
    #[arg(long = "workflow-webhook-url", value_name = "URL")]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub workflow: WorkflowOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Disable or enable the in-process result cache.
    #[arg(
        long = "result-cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub result_cache: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RefreshArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub workflow: WorkflowOverride,

    /// City to ingest; repeat for several. Defaults to every recognized city.
    #[arg(long = "city", value_name = "CITY")]
    pub cities: Vec<String>,

    /// First day to ingest (YYYY-MM-DD). Defaults to today.
    #[arg(long = "date-from", value_name = "DATE")]
    pub date_from: Option<String>,

    /// Last day to ingest (YYYY-MM-DD). Defaults to December 31 of this year.
    #[arg(long = "date-to", value_name = "DATE")]
    pub date_to: Option<String>,

    /// Block until the run settles or the sync wait elapses.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub wait: bool,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub workflow: WorkflowSettings,
    pub refresh: RefreshTimings,
    pub catalog: CatalogSettings,
    pub result_cache: ResultCacheConfig,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Clone)]
pub struct WorkflowSettings {
    /// `None` leaves triggering disabled; every trigger reports failure.
    pub webhook_url: Option<Url>,
    pub secret: Option<String>,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for WorkflowSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowSettings")
            .field("webhook_url", &self.webhook_url.as_ref().map(Url::as_str))
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub limits: PageLimits,
    pub recognized_cities: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("EVENTSCOUT").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Refresh(args)) => {
            raw.apply_database_override(&args.database);
            raw.apply_workflow_override(&args.workflow);
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    workflow: RawWorkflowSettings,
    refresh: RawRefreshSettings,
    catalog: RawCatalogSettings,
    result_cache: ResultCacheConfig,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.result_cache {
            self.result_cache.enabled = enabled;
        }

        self.apply_database_override(&overrides.database);
        self.apply_workflow_override(&overrides.workflow);
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }

    fn apply_workflow_override(&mut self, overrides: &WorkflowOverride) {
        if let Some(url) = overrides.webhook_url.as_ref() {
            self.workflow.webhook_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            workflow,
            refresh,
            catalog,
            result_cache,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let workflow = build_workflow_settings(workflow)?;
        let refresh = build_refresh_timings(refresh)?;
        let catalog = build_catalog_settings(catalog)?;
        if result_cache.ttl_seconds == 0 {
            return Err(LoadError::invalid(
                "result_cache.ttl_seconds",
                "must be greater than zero",
            ));
        }

        Ok(Self {
            server,
            logging,
            database,
            workflow,
            refresh,
            catalog,
            result_cache,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_workflow_settings(workflow: RawWorkflowSettings) -> Result<WorkflowSettings, LoadError> {
    let webhook_url = match non_blank(workflow.webhook_url) {
        Some(raw) => {
            let url = Url::parse(&raw).map_err(|err| {
                LoadError::invalid("workflow.webhook_url", format!("failed to parse: {err}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "workflow.webhook_url",
                    "scheme must be http or https",
                ));
            }
            Some(url)
        }
        None => None,
    };

    let timeout_secs = workflow
        .request_timeout_seconds
        .unwrap_or(DEFAULT_WORKFLOW_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "workflow.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(WorkflowSettings {
        webhook_url,
        secret: non_blank(workflow.secret),
        request_timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_refresh_timings(refresh: RawRefreshSettings) -> Result<RefreshTimings, LoadError> {
    let poll_interval_ms = refresh.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    if poll_interval_ms == 0 {
        return Err(LoadError::invalid(
            "refresh.poll_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(RefreshTimings {
        poll_interval: Duration::from_millis(poll_interval_ms),
        sync_max_wait: Duration::from_secs(
            refresh
                .sync_max_wait_seconds
                .unwrap_or(DEFAULT_SYNC_MAX_WAIT_SECS),
        ),
        read_max_wait: Duration::from_secs(
            refresh
                .read_max_wait_seconds
                .unwrap_or(DEFAULT_READ_MAX_WAIT_SECS),
        ),
        running_grace: Duration::from_millis(
            refresh.running_grace_ms.unwrap_or(DEFAULT_RUNNING_GRACE_MS),
        ),
    })
}

fn build_catalog_settings(catalog: RawCatalogSettings) -> Result<CatalogSettings, LoadError> {
    let default_limit = catalog.default_limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let max_limit = catalog.max_limit.unwrap_or(DEFAULT_MAX_PAGE_LIMIT);
    if default_limit == 0 {
        return Err(LoadError::invalid(
            "catalog.default_limit",
            "must be greater than zero",
        ));
    }
    if max_limit < default_limit {
        return Err(LoadError::invalid(
            "catalog.max_limit",
            format!("must be at least default_limit ({default_limit})"),
        ));
    }

    let recognized_cities = match catalog.recognized_cities {
        Some(cities) => cities
            .into_iter()
            .filter_map(|city| non_blank(Some(city)))
            .collect::<Vec<_>>(),
        None => DEFAULT_RECOGNIZED_CITIES
            .iter()
            .map(|city| city.to_string())
            .collect(),
    };
    if recognized_cities.is_empty() {
        return Err(LoadError::invalid(
            "catalog.recognized_cities",
            "at least one city is required",
        ));
    }

    Ok(CatalogSettings {
        limits: PageLimits {
            default_limit,
            max_limit,
        },
        recognized_cities,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkflowSettings {
    webhook_url: Option<String>,
    secret: Option<String>,
    request_timeout_seconds: Option<u64>,
}

impl std::fmt::Debug for RawWorkflowSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawWorkflowSettings")
            .field("webhook_url", &self.webhook_url)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRefreshSettings {
    poll_interval_ms: Option<u64>,
    sync_max_wait_seconds: Option<u64>,
    read_max_wait_seconds: Option<u64>,
    running_grace_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCatalogSettings {
    default_limit: Option<u32>,
    max_limit: Option<u32>,
    recognized_cities: Option<Vec<String>>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 3000);
        assert_eq!(settings.database.max_connections.get(), 8);
        assert_eq!(settings.workflow.request_timeout, Duration::from_secs(120));
        assert_eq!(settings.refresh, RefreshTimings::default());
        assert_eq!(settings.catalog.limits, PageLimits::default());
        assert_eq!(settings.catalog.recognized_cities.len(), 12);
        assert!(settings.workflow.webhook_url.is_none());
        assert!(settings.result_cache.enabled);
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn webhook_url_must_be_http() {
        let mut raw = RawSettings::default();
        raw.workflow.webhook_url = Some("ftp://example.com/hook".to_string());

        let err = Settings::from_raw(raw).expect_err("invalid scheme");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "workflow.webhook_url",
                ..
            }
        ));
    }

    #[test]
    fn blank_secret_is_treated_as_absent() {
        let mut raw = RawSettings::default();
        raw.workflow.webhook_url = Some("https://flows.example.com/webhook/events".to_string());
        raw.workflow.secret = Some("   ".to_string());

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(settings.workflow.secret.is_none());
        assert!(settings.workflow.webhook_url.is_some());
    }

    #[test]
    fn max_limit_below_default_is_rejected() {
        let mut raw = RawSettings::default();
        raw.catalog.default_limit = Some(100);
        raw.catalog.max_limit = Some(20);

        let err = Settings::from_raw(raw).expect_err("invalid limits");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "catalog.max_limit",
                ..
            }
        ));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut raw = RawSettings::default();
        raw.refresh.poll_interval_ms = Some(0);

        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let mut raw = RawSettings::default();
        raw.workflow.secret = Some("s3cret".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");

        let rendered = format!("{:?}", settings.workflow);
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["eventscout"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_refresh_arguments() {
        let args = CliArgs::parse_from([
            "eventscout",
            "refresh",
            "--city",
            "Milano",
            "--city",
            "Bergamo",
            "--date-to",
            "2026-06-30",
            "--wait",
            "--database-url",
            "postgres://example",
        ]);

        match args.command.expect("refresh command") {
            Command::Refresh(refresh) => {
                assert_eq!(refresh.cities, vec!["Milano", "Bergamo"]);
                assert_eq!(refresh.date_to.as_deref(), Some("2026-06-30"));
                assert!(refresh.wait);
                assert_eq!(
                    refresh.database.database_url.as_deref(),
                    Some("postgres://example")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "eventscout",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--workflow-webhook-url",
            "https://flows.example.com/hook",
            "--result-cache",
            "false",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.workflow.webhook_url.as_deref(),
                    Some("https://flows.example.com/hook")
                );
                assert_eq!(serve.overrides.result_cache, Some(false));
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
