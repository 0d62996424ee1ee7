use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::workflows::intake::{
    AssetPaths, BotSettings, ChannelId, GuildId, LeadershipMarkers, ReviewSettings, RoleId,
};

const CALLSIGN_PLACEHOLDER: &str = "{callsign}";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub intake: IntakeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&var_or("APP_ENV", "development"));

        let host = var_or("APP_HOST", "127.0.0.1");
        let port = var_or("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = var_or("APP_LOG_LEVEL", "info");

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            intake: IntakeConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Guild wiring, file locations and timing for the intake bot.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub guild_id: GuildId,
    pub review_channel: ChannelId,
    pub announcement_channel: ChannelId,
    pub admin_role: RoleId,
    pub general_role: RoleId,
    pub recruit_role: RoleId,
    pub assets: AssetPaths,
    pub store_path: PathBuf,
    pub reconcile_interval: Duration,
    pub intro_delay: Duration,
    pub organization_name: String,
    pub nickname_template: String,
    pub leadership_markers: LeadershipMarkers,
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let nickname_template = var_or("INTAKE_NICKNAME_TEMPLATE", "[HVY](R){callsign}");
        if !nickname_template.contains(CALLSIGN_PLACEHOLDER) {
            return Err(ConfigError::InvalidTemplate(nickname_template));
        }

        Ok(Self {
            guild_id: GuildId(required_id("INTAKE_GUILD_ID")?),
            review_channel: ChannelId(required_id("INTAKE_REVIEW_CHANNEL_ID")?),
            announcement_channel: ChannelId(required_id("INTAKE_ANNOUNCEMENT_CHANNEL_ID")?),
            admin_role: RoleId(required_id("INTAKE_ADMIN_ROLE_ID")?),
            general_role: RoleId(required_id("INTAKE_GENERAL_ROLE_ID")?),
            recruit_role: RoleId(required_id("INTAKE_RECRUIT_ROLE_ID")?),
            assets: AssetPaths {
                questions: var_or("INTAKE_QUESTIONS_PATH", "application.json").into(),
                directory: var_or("INTAKE_DIRECTORY_PATH", "sq_roles.json").into(),
                announcements: var_or("INTAKE_ANNOUNCEMENTS_PATH", "announcement_bodies.json")
                    .into(),
            },
            store_path: var_or("INTAKE_STORE_PATH", "applications.csv").into(),
            reconcile_interval: seconds("INTAKE_RECONCILE_INTERVAL_SECS", 60, 1)?,
            intro_delay: seconds("INTAKE_INTRO_DELAY_SECS", 5, 0)?,
            organization_name: var_or("INTAKE_ORGANIZATION_NAME", "Joint Task Force Heavy"),
            nickname_template,
            leadership_markers: LeadershipMarkers {
                commanding_officer: var_or("INTAKE_CO_MARKER", "[HVY]CO"),
                executive_officer: var_or("INTAKE_XO_MARKER", "[HVY]XO"),
            },
        })
    }

    pub fn review_settings(&self) -> ReviewSettings {
        ReviewSettings {
            guild_id: self.guild_id,
            review_channel: self.review_channel,
            announcement_channel: self.announcement_channel,
            general_role: self.general_role,
            recruit_role: self.recruit_role,
            nickname_template: self.nickname_template.clone(),
            organization_name: self.organization_name.clone(),
            leadership_markers: self.leadership_markers.clone(),
        }
    }

    pub fn bot_settings(&self) -> BotSettings {
        BotSettings {
            review: self.review_settings(),
            admin_role: self.admin_role,
            intro_delay: self.intro_delay,
            reconcile_interval: self.reconcile_interval,
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required_id(name: &'static str) -> Result<u64, ConfigError> {
    let raw = env::var(name).map_err(|_| ConfigError::MissingVar(name))?;
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidId { var: name, value: raw })
}

fn seconds(name: &'static str, default: u64, minimum: u64) -> Result<Duration, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(Duration::from_secs(default));
    };
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs >= minimum)
        .map(Duration::from_secs)
        .ok_or(ConfigError::InvalidDuration { var: name, value: raw })
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingVar(&'static str),
    InvalidId { var: &'static str, value: String },
    InvalidDuration { var: &'static str, value: String },
    InvalidTemplate(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingVar(var) => write!(f, "{var} must be set"),
            ConfigError::InvalidId { var, value } => {
                write!(f, "{var} must be a numeric platform id (got '{value}')")
            }
            ConfigError::InvalidDuration { var, value } => {
                write!(f, "{var} must be a whole number of seconds (got '{value}')")
            }
            ConfigError::InvalidTemplate(template) => write!(
                f,
                "INTAKE_NICKNAME_TEMPLATE must contain {CALLSIGN_PLACEHOLDER} (got '{template}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
