//! Record ID generation.
//!
//! Groups, invites and messages use UUID v7 ids: globally unique, generated
//! without coordination, and time-sortable so message history can be ordered
//! by id as well as by timestamp.

use uuid::Uuid;

/// Generate a new time-sortable id.
pub fn generate_id() -> Uuid {
    Uuid::now_v7()
}
