//! Core domain models shared across all Kinship crates.
//!
//! These are the "truth" types: what the document store persists and what the
//! web channel receives. Field names are the storage contract, so every model
//! carries explicit serde renames (`senderUUID`, `groupId`, ...) and stores
//! timestamps as epoch milliseconds.

pub mod friend;
pub mod group;
pub mod identity;
pub mod invite;
pub mod member;
pub mod message;
pub mod player;

/// Re-export all model types for convenience.
pub use friend::*;
pub use group::*;
pub use identity::*;
pub use invite::*;
pub use member::*;
pub use message::*;
pub use player::*;
