//! Client reference data.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A flight-school client, owned by user management.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Client {
    pub client_id: Uuid,
    pub display_name: String,
    pub email: String,
}

impl Client {
    /// Case-insensitive substring match against display name or email.
    /// A blank needle matches everyone.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.display_name.to_lowercase().contains(&needle)
            || self.email.to_lowercase().contains(&needle)
    }
}
