//! Utility functions for the battle engine

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique lobby ID
pub fn generate_lobby_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Format an öre amount as a SEK string for logs
pub fn format_sek(ore: i64) -> String {
    format!("{}.{:02} SEK", ore / 100, (ore % 100).abs())
}
