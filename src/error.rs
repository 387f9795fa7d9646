//! Error types for the battle engine
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific battle-engine scenarios
#[derive(Debug, thiserror::Error)]
pub enum BattleError {
    #[error("Invalid battle format: {value}")]
    InvalidFormat { value: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Lobby not found: {lobby_id}")]
    LobbyNotFound { lobby_id: String },

    #[error("Lobby is full: {lobby_id}")]
    LobbyFull { lobby_id: String },

    #[error("User {user_id} is already in lobby {lobby_id}")]
    AlreadyInLobby { user_id: String, lobby_id: String },

    #[error("Match not found: {match_id}")]
    MatchNotFound { match_id: String },

    #[error("Matchmaking blocked for {user_id}: {seconds_remaining}s cooldown remaining")]
    MatchmakingBlocked {
        user_id: String,
        seconds_remaining: i64,
    },

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Conflicting update: {message}")]
    Conflict { message: String },

    #[error("Storage operation failed: {message}")]
    Storage { message: String },

    #[error("Broker connection failed: {message}")]
    BrokerConnectionFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl BattleError {
    /// Whether the caller may retry the failed operation against current state.
    ///
    /// Conflicts are retryable because every terminal transition in the engine
    /// is idempotent; storage and broker failures are transient by contract.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BattleError::Conflict { .. }
                | BattleError::Storage { .. }
                | BattleError::BrokerConnectionFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let conflict = BattleError::Conflict {
            message: "end-match raced".to_string(),
        };
        assert!(conflict.is_retryable());

        let storage = BattleError::Storage {
            message: "row store unreachable".to_string(),
        };
        assert!(storage.is_retryable());

        let permission = BattleError::PermissionDenied {
            reason: "not a leader".to_string(),
        };
        assert!(!permission.is_retryable());

        let full = BattleError::LobbyFull {
            lobby_id: "x".to_string(),
        };
        assert!(!full.is_retryable());
    }
}
