//! # kinship-db
//!
//! Persistence layer for Kinship. A [`Database`] is either the in-process
//! store or a SQLite pool; the relationship, group, player and credential
//! stores are written against the [`DocumentStore`] contract and never see
//! which one they got.

pub mod codec;
pub mod credentials;
pub mod document;
pub mod groups;
pub mod memory;
pub mod players;
pub mod relationships;
pub mod sqlite;

use std::str::FromStr;

use anyhow::Result;
use kinship_common::config::AppConfig;
use kinship_common::error::KinshipResult;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use credentials::CredentialStore;
pub use document::{Document, DocumentStore, Filter, FindOptions, SortOrder};
pub use groups::{GroupPolicy, GroupStore};
pub use memory::MemoryStore;
pub use players::PlayerDirectory;
pub use relationships::RelationshipStore;
pub use sqlite::SqliteStore;

/// Collection names.
pub mod collections {
    pub const FRIEND_REQUESTS: &str = "friend_requests";
    pub const FRIENDSHIPS: &str = "friendships";
    pub const GROUPS: &str = "groups";
    pub const GROUP_INVITES: &str = "group_invites";
    pub const GROUP_MESSAGES: &str = "group_messages";
    pub const PLAYERS: &str = "players";
    pub const WEB_CREDENTIALS: &str = "web_credentials";
}

/// Shared database handle passed to every store.
#[derive(Debug, Clone)]
pub enum Database {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Database {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    /// Open the backend named by `database.url`.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let url = config.database.url.as_str();
        if url == "memory" {
            tracing::info!("Using in-memory document store");
            return Ok(Self::memory());
        }

        tracing::info!("Connecting to SQLite...");
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Each connection to an in-memory SQLite URL is its own database.
        let max_connections = if url.contains(":memory:") {
            1
        } else {
            config.database.max_connections
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        tracing::info!("Connected to SQLite");

        Ok(Self::Sqlite(SqliteStore::new(pool)))
    }

    /// Run database migrations. A no-op for the in-memory store.
    pub async fn migrate(&self) -> Result<()> {
        if let Self::Sqlite(store) = self {
            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(store.pool()).await?;
            tracing::info!("Migrations complete");
        }
        Ok(())
    }
}

impl DocumentStore for Database {
    async fn insert(&self, collection: &str, doc: Document) -> KinshipResult<()> {
        match self {
            Self::Memory(s) => s.insert(collection, doc).await,
            Self::Sqlite(s) => s.insert(collection, doc).await,
        }
    }

    async fn insert_unique(&self, collection: &str, key: &str, doc: Document) -> KinshipResult<bool> {
        match self {
            Self::Memory(s) => s.insert_unique(collection, key, doc).await,
            Self::Sqlite(s) => s.insert_unique(collection, key, doc).await,
        }
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> KinshipResult<Vec<Document>> {
        match self {
            Self::Memory(s) => s.find(collection, filter, options).await,
            Self::Sqlite(s) => s.find(collection, filter, options).await,
        }
    }

    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> KinshipResult<bool> {
        match self {
            Self::Memory(s) => s.update_one(collection, filter, set).await,
            Self::Sqlite(s) => s.update_one(collection, filter, set).await,
        }
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> KinshipResult<bool> {
        match self {
            Self::Memory(s) => s.delete_one(collection, filter).await,
            Self::Sqlite(s) => s.delete_one(collection, filter).await,
        }
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> KinshipResult<u64> {
        match self {
            Self::Memory(s) => s.delete_many(collection, filter).await,
            Self::Sqlite(s) => s.delete_many(collection, filter).await,
        }
    }

    async fn count(&self, collection: &str, filter: &Filter) -> KinshipResult<u64> {
        match self {
            Self::Memory(s) => s.count(collection, filter).await,
            Self::Sqlite(s) => s.count(collection, filter).await,
        }
    }
}
