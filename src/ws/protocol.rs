//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::game::entities::{GameStatus, RoundStatus};

/// Version stamped on every outbound envelope
pub const PROTOCOL_VERSION: u8 = 1;

/// Actions sent from client to server. A closed set: anything else fails
/// to parse and only the sender is told.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join the game this connection is subscribed to
    JoinGame {
        player_name: String,
        /// Returning device identity, if the client kept one
        #[serde(default)]
        session_token: Option<String>,
    },

    /// Host adds a player who has no device of their own
    AddPlayer {
        player_name: String,
        /// Team to place them on, unassigned when absent
        #[serde(default)]
        team_id: Option<Uuid>,
    },

    /// Move a player onto a team (or between teams)
    AssignPlayer {
        player_id: Uuid,
        team_id: Uuid,
    },

    /// Rename or recolor a team
    UpdateTeam {
        team_id: Uuid,
        #[serde(default)]
        name: Option<String>,
        /// Hex color like "#3B82F6"
        #[serde(default)]
        color: Option<String>,
    },

    /// Change game settings; absent fields keep their value
    UpdateSettings {
        #[serde(default)]
        total_rounds: Option<u32>,
        #[serde(default)]
        max_time_per_turn: Option<u32>,
        /// Merged into the settings bag key by key
        #[serde(default)]
        settings: Option<Map<String, Value>>,
        /// Replaces the selected category set
        #[serde(default)]
        category_ids: Option<Vec<Uuid>>,
    },

    /// Leave the lobby and create round 1
    StartGame,

    /// Pick who will act this round
    SelectActor {
        round_id: Uuid,
        player_id: Uuid,
    },

    /// Pick a category; the server draws the prompt
    SelectCategory {
        round_id: Uuid,
        category_id: Uuid,
    },

    /// Actor has seen the prompt and is ready to act
    ActorReady {
        round_id: Uuid,
    },

    /// Start the guessing timer
    StartTimer {
        round_id: Uuid,
    },

    /// The team guessed the prompt
    CorrectGuess {
        round_id: Uuid,
    },

    /// Time ran out
    Timeout {
        round_id: Uuid,
    },

    /// Abandon the round before its timer ran
    SkipRound {
        round_id: Uuid,
    },

    /// Move to the next round, or finish the game
    NextRound,
}

/// Envelopes sent from server to client. Every variant carries the
/// protocol version; state-bearing ones carry a full game snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Full state on subscribe
    GameState {
        version: u8,
        data: GameSnapshot,
    },

    /// Someone joined the lobby
    PlayerJoined {
        version: u8,
        data: GameSnapshot,
    },

    /// Roster or team appearance changed
    TeamUpdated {
        version: u8,
        data: GameSnapshot,
    },

    /// Lobby ended, round 1 exists
    GameStarted {
        version: u8,
        data: GameSnapshot,
    },

    /// The current round moved through its lifecycle
    RoundUpdated {
        version: u8,
        data: GameSnapshot,
    },

    /// Actor saw the prompt
    ActorReady {
        version: u8,
        data: GameSnapshot,
    },

    /// Guessing timer started
    TimerStarted {
        version: u8,
        data: GameSnapshot,
    },

    /// Round reached a terminal status
    RoundEnded {
        version: u8,
        data: GameSnapshot,
        result: RoundResult,
    },

    /// All rounds played
    GameFinished {
        version: u8,
        data: GameSnapshot,
    },

    /// Settings changed
    SettingsUpdated {
        version: u8,
        data: GameSnapshot,
    },

    /// Sent only to the offending connection, never broadcast
    Error {
        version: u8,
        message: String,
    },
}

impl ServerMsg {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            version: PROTOCOL_VERSION,
            message: message.into(),
        }
    }
}

/// How a round ended, attached to the round_ended envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    pub status: RoundStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_taken: Option<f64>,
    pub points: i32,
    /// Scoring team's new total, present only on a correct guess
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_score: Option<i32>,
}

impl RoundResult {
    pub fn guessed(time_taken: f64, points: i32, team_score: i32) -> Self {
        Self {
            status: RoundStatus::Guessed,
            time_taken: Some(time_taken),
            points,
            team_score: Some(team_score),
        }
    }

    pub fn timeout() -> Self {
        Self {
            status: RoundStatus::Timeout,
            time_taken: None,
            points: 0,
            team_score: None,
        }
    }

    pub fn skipped(time_taken: Option<f64>) -> Self {
        Self {
            status: RoundStatus::Skipped,
            time_taken,
            points: 0,
            team_score: None,
        }
    }
}

/// Full game state as clients see it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub code: String,
    pub status: GameStatus,
    pub current_round: u32,
    pub total_rounds: u32,
    /// Guessing time limit in seconds
    pub max_time_per_turn: u32,
    pub created_at: DateTime<Utc>,
    /// Last mutation, for clients polling the REST snapshot
    pub updated_at: DateTime<Utc>,
    pub teams: Vec<TeamView>,
    pub unassigned_players: Vec<PlayerView>,
    /// The round currently being played, if any
    pub round: Option<RoundView>,
    pub selected_categories: Vec<CategoryView>,
    pub settings: Map<String, Value>,
}

/// Team with its roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamView {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub total_score: i32,
    pub order: u32,
    pub players: Vec<PlayerView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: Uuid,
    pub name: String,
    pub is_host: bool,
    /// Join time; rosters list players in this order
    pub created_at: DateTime<Utc>,
}

/// Round state as clients see it. The prompt itself never appears here;
/// the token lets the host screen render the QR the actor scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundView {
    pub id: Uuid,
    pub round_number: u32,
    pub team_id: Uuid,
    pub team_name: String,
    pub team_color: String,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub category_icon: Option<String>,
    pub status: RoundStatus,
    pub token: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub time_taken_seconds: Option<f64>,
    pub points_awarded: i32,
}

/// Category as shown inside a snapshot's selected set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryView {
    pub id: Uuid,
    pub name: String,
    pub name_ar: String,
    pub icon: String,
}

/// End-of-game summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreboardView {
    pub game_code: String,
    pub teams: Vec<TeamStanding>,
    /// Highest total; first listed team wins ties
    pub winner: Option<TeamStanding>,
    /// Fastest correct guess of the game
    pub best_round: Option<BestRound>,
    pub total_rounds_played: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamStanding {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub total_score: i32,
    pub rounds_won: usize,
    pub rounds_timeout: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestRound {
    pub round_number: u32,
    pub time_taken: f64,
    pub points: i32,
    pub actor: String,
    pub prompt: String,
}

/// Prompt reveal for the actor's device, gated by the round token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorPromptView {
    pub round_id: Uuid,
    pub round_number: u32,
    pub title: String,
    pub title_ar: String,
    pub image_url: Option<String>,
    pub category: String,
    pub category_ar: String,
    pub category_icon: String,
}
