//! Application configuration loaded from environment variables and config files.
//!
//! Config precedence: env vars > .env file > config file > defaults.
//! Environment variables use the `KINSHIP__` prefix with `__` as the section
//! separator, e.g. `KINSHIP__DATABASE__URL`.

use serde::Deserialize;
use std::collections::HashMap;
/// Build the configuration from defaults, the optional file at `path`
/// (extension inferred) and the environment.
pub fn load(path: &str) -> Result<AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let cfg = with_defaults(config::Config::builder())?
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("KINSHIP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    cfg.try_deserialize()
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    builder
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.api_port", 8080)?
        .set_default("server.gateway_port", 8081)?
        .set_default("database.url", "memory")?
        .set_default("database.max_connections", 5)?
        .set_default("world.tick_millis", 50)? // 20 ticks per second
        .set_default("world.queue_capacity", 4096)?
        .set_default("world.max_tasks_per_tick", 256)?
        .set_default("gateway.outbound_capacity", 256)?
        .set_default("gateway.rest_session_idle_secs", 3600)?
        .set_default("gateway.session_sweep_secs", 60)?
        .set_default("host.bind", "127.0.0.1")?
        .set_default("host.port", 8082)?
        .set_default("friends.max_friends", 50)?
        .set_default("groups.default_max_members", 20)?
        .set_default("groups.max_members_limit", 100)?
        .set_default("groups.max_groups_per_player", 5)?
        .set_default("groups.invite_role", "member")?
        .set_default("groups.history_limit", 100)?
        .set_default("groups.search_limit", 50)?
        .set_default("limits.max_message_length", 256)?
        .set_default(
            "formats.private_message",
            "[PM] {sender} -> {receiver}: {message}",
        )?
        .set_default("formats.group_message", "[Group: {group}] {player}: {message}")?
        .set_default("formats.announcement", "[Group: {group}] [Announcement] {player}: {message}")?
        .set_default("formats.system", "[Group: {group}] {message}")?
        .set_default("formats.notice", "[Friends] {message}")?
        .set_default("formats.web_suffix", " (Web)")?
        .set_default("ranks.provider", "none")
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub world: WorldConfig,
    pub gateway: GatewayConfig,
    pub host: HostConfig,
    pub friends: FriendsConfig,
    pub groups: GroupsConfig,
    pub limits: LimitsConfig,
    pub formats: FormatsConfig,
    pub ranks: RanksConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// REST API port.
    pub api_port: u16,
    /// WebSocket gateway port.
    pub gateway_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// `memory` for the in-process document store, or a `sqlite://` URL.
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorldConfig {
    /// Interval between authoritative loop ticks.
    pub tick_millis: u64,
    /// Bound of the task queue feeding the loop.
    pub queue_capacity: usize,
    /// Tasks drained per tick; the remainder waits for the next tick.
    pub max_tasks_per_tick: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Per-session outbound buffer. Events beyond it are dropped for that session.
    pub outbound_capacity: usize,
    /// REST sessions unused for this long must log in again.
    pub rest_session_idle_secs: u64,
    /// How often expired REST sessions are swept.
    pub session_sweep_secs: u64,
}

/// Ingress for the world host: player join/leave and in-world commands.
#[derive(Debug, Deserialize, Clone)]
pub struct HostConfig {
    /// Keep this on loopback unless `token` is set.
    pub bind: String,
    pub port: u16,
    /// Shared secret the host sends as `Authorization: Bearer <token>`.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FriendsConfig {
    pub max_friends: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupsConfig {
    pub default_max_members: u32,
    pub max_members_limit: u32,
    pub max_groups_per_player: u32,
    /// Minimum role allowed to invite (`member`, `moderator`, `admin`, `owner`).
    pub invite_role: String,
    pub history_limit: u32,
    pub search_limit: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub max_message_length: u32,
}

/// In-world line formats. Placeholders: `{sender}`, `{receiver}`, `{player}`,
/// `{group}`, `{message}`.
#[derive(Debug, Deserialize, Clone)]
pub struct FormatsConfig {
    pub private_message: String,
    pub group_message: String,
    pub announcement: String,
    pub system: String,
    pub notice: String,
    /// Appended to the sender name when the message came from the web.
    pub web_suffix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RanksConfig {
    /// `none` or `static`.
    pub provider: String,
    /// Static rank table keyed by lower-cased player name.
    #[serde(default)]
    pub entries: HashMap<String, RankEntry>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RankEntry {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}
