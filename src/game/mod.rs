//! Game engine modules - round lifecycle, scoring, prompt and turn allocation

pub mod allocator;
pub mod entities;
pub mod rotation;
pub mod round;
pub mod scoring;

pub use entities::{Game, GameStatus, Player, Round, RoundStatus, Team};
pub use scoring::ScoringTable;

/// Engine-wide error taxonomy. Every operation failure falls into one of
/// these buckets; the HTTP and WebSocket layers map them uniformly
/// (NotFound -> 404, InvalidState/Validation -> 400, Permission -> 403).
#[derive(Debug, Clone, thiserror::Error)]
pub enum GameError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Permission(String),
}

impl GameError {
    /// Shorthand for "X not found" errors
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{} not found", what))
    }
}
