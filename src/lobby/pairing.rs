//! Pairing policy for counterpart lobbies
//!
//! Pairing is FIFO: the two oldest fully-staffed open lobbies of the same
//! format are matched. Formats never mix. The trait seam exists so a
//! different policy (regional, rating-based) can be swapped in without
//! touching the manager.

use crate::lobby::instance::Lobby;
use crate::types::LobbyId;

/// Trait for counterpart selection among pairable lobbies
pub trait LobbyPairer: Send + Sync {
    /// Pick two lobbies to pair from candidates of one format.
    ///
    /// Candidates arrive oldest-first; implementations return the ids in
    /// (team A slot, team B slot) order or `None` when no pair exists.
    fn select_pair(&self, candidates: &[Lobby]) -> Option<(LobbyId, LobbyId)>;
}

/// First-in-first-out pairing: the two oldest candidates
#[derive(Debug, Default)]
pub struct FifoLobbyPairer;

impl FifoLobbyPairer {
    pub fn new() -> Self {
        Self
    }
}

impl LobbyPairer for FifoLobbyPairer {
    fn select_pair(&self, candidates: &[Lobby]) -> Option<(LobbyId, LobbyId)> {
        if candidates.len() < 2 {
            return None;
        }
        Some((candidates[0].id, candidates[1].id))
    }
}
