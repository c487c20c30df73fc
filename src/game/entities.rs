//! Core game entities - games, teams, players, rounds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Characters used for join codes (uppercase letters and digits)
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Length of a game join code
pub const CODE_LENGTH: usize = 6;

/// Rounds played per game unless the host changes it
pub const DEFAULT_TOTAL_ROUNDS: u32 = 10;
/// Seconds an actor has per turn unless the host changes it
pub const DEFAULT_MAX_TIME_PER_TURN: u32 = 240;

/// Default team seeds created with every game: (name, color, order)
pub const DEFAULT_TEAMS: [(&str, &str, u8); 2] =
    [("Team 1", "#3B82F6", 1), ("Team 2", "#EF4444", 2)];

/// Round metadata key holding the score multiplier
pub const MULTIPLIER_KEY: &str = "multiplier";

/// Game lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Players joining and organizing into teams
    Lobby,
    /// Rounds being played
    InProgress,
    /// All rounds done, scoreboard final
    Finished,
}

/// Round lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Placeholder only; rounds are materialized directly in selecting_actor
    #[default]
    Pending,
    /// Active team picks its actor
    SelectingActor,
    /// Actor picks a category (prompt assigned on selection)
    SelectingCategory,
    /// Prompt bound, actor scanning the QR / opening the prompt view
    ShowingQr,
    /// Actor confirmed they have seen the prompt
    ActorReady,
    /// Timer running, team guessing
    Active,
    /// Team guessed correctly before the deadline
    Guessed,
    /// Client reported the deadline passed
    Timeout,
    /// Round abandoned
    Skipped,
}

impl RoundStatus {
    /// Terminal statuses are never re-entered
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Guessed | Self::Timeout | Self::Skipped)
    }

    /// Statuses a round may be skipped from
    pub fn can_skip(self) -> bool {
        matches!(
            self,
            Self::Active
                | Self::ShowingQr
                | Self::ActorReady
                | Self::SelectingActor
                | Self::SelectingCategory
        )
    }

    /// Statuses in which the actor may fetch the hidden prompt
    pub fn prompt_visible(self) -> bool {
        matches!(self, Self::ShowingQr | Self::ActorReady | Self::Active)
    }
}

/// A game session
#[derive(Debug, Clone)]
pub struct Game {
    pub id: Uuid,
    /// Join code, unique across live games
    pub code: String,
    pub status: GameStatus,
    /// 1-based number of the round being played; 0 while in the lobby
    pub current_round: u32,
    pub total_rounds: u32,
    /// Per-turn guessing deadline in seconds (clients enforce it)
    pub max_time_per_turn: u32,
    /// Free-form host settings, merged key-by-key on update
    pub settings: Map<String, Value>,
    /// Catalog categories enabled for this game (empty = all)
    pub selected_categories: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Game {
    pub fn new(code: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code,
            status: GameStatus::Lobby,
            current_round: 0,
            total_rounds: DEFAULT_TOTAL_ROUNDS,
            max_time_per_turn: DEFAULT_MAX_TIME_PER_TURN,
            settings: Map::new(),
            selected_categories: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One of the two competing teams
#[derive(Debug, Clone)]
pub struct Team {
    pub id: Uuid,
    pub game_id: Uuid,
    pub name: String,
    /// Display color as #RRGGBB
    pub color: String,
    pub total_score: i32,
    /// Turn order, 1 or 2
    pub order: u8,
}

impl Team {
    pub fn new(game_id: Uuid, name: &str, color: &str, order: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id,
            name: name.to_string(),
            color: color.to_string(),
            total_score: 0,
            order,
        }
    }
}

/// A connected participant
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub game_id: Uuid,
    /// None until assigned to a team
    pub team_id: Option<Uuid>,
    pub name: String,
    /// Device identity, unique within the game
    pub session_token: String,
    pub is_host: bool,
    pub created_at: DateTime<Utc>,
}

impl Player {
    pub fn new(game_id: Uuid, name: String, session_token: String, is_host: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id,
            team_id: None,
            name,
            session_token,
            is_host,
            created_at: Utc::now(),
        }
    }
}

/// A single turn of the game
#[derive(Debug, Clone)]
pub struct Round {
    pub id: Uuid,
    pub game_id: Uuid,
    /// 1-based, contiguous within the game
    pub round_number: u32,
    /// Team whose turn this is
    pub team_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    /// Hidden from everyone but the token holder until the round ends
    pub prompt_id: Option<Uuid>,
    pub status: RoundStatus,
    /// Random hex token gating actor-only prompt access
    pub token: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Seconds from timer start to the guess, rounded to one decimal
    pub time_taken_seconds: Option<f64>,
    pub points_awarded: i32,
    /// Extra round data; `multiplier` is the one typed key
    pub metadata: Map<String, Value>,
}

impl Round {
    /// Rounds are materialized directly in selecting_actor
    pub fn new(game_id: Uuid, round_number: u32, team_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id,
            round_number,
            team_id,
            actor_id: None,
            category_id: None,
            prompt_id: None,
            status: RoundStatus::SelectingActor,
            token: String::new(),
            started_at: None,
            ended_at: None,
            time_taken_seconds: None,
            points_awarded: 0,
            metadata: Map::new(),
        }
    }

    /// Score multiplier from metadata, 1.0 when absent or not a number
    pub fn multiplier(&self) -> f64 {
        self.metadata
            .get(MULTIPLIER_KEY)
            .and_then(Value::as_f64)
            .unwrap_or(1.0)
    }
}
