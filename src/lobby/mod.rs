//! Lobby lifecycle for the battle engine
//!
//! Covers lobby creation, team assignment, leadership, and promotion of
//! staffed lobbies into active matches.

pub mod instance;
pub mod manager;
pub mod pairing;

// Re-export commonly used types
pub use instance::{Departure, Lobby};
pub use manager::{LobbyManager, LobbyManagerStats};
pub use pairing::{FifoLobbyPairer, LobbyPairer};
