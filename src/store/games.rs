//! Live game registry - per-game records behind a sharded map
//!
//! Every game lives under its join code as an `Arc<GameEntry>`. Mutations
//! take the entry's write lock for a short critical section so that guard
//! checks and state changes are atomic; concurrent conflicting actions on
//! the same game serialize and exactly one wins. Reads take the read lock
//! and copy a snapshot out. Games never interact, so there is no cross-game
//! locking.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::game::entities::{CODE_ALPHABET, CODE_LENGTH};
use crate::game::{Game, GameError, Player, Round, Team};

/// One game's full state. Fields are plain vectors; a game holds a handful
/// of players and at most a few dozen rounds.
#[derive(Debug)]
pub struct GameRecord {
    pub game: Game,
    pub teams: Vec<Team>,
    pub players: Vec<Player>,
    pub rounds: Vec<Round>,
}

impl GameRecord {
    pub fn new(game: Game) -> Self {
        Self {
            game,
            teams: Vec::new(),
            players: Vec::new(),
            rounds: Vec::new(),
        }
    }

    pub fn team(&self, id: Uuid) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn team_mut(&mut self, id: Uuid) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| t.id == id)
    }

    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: Uuid) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_by_token_mut(&mut self, token: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.session_token == token)
    }

    pub fn round(&self, id: Uuid) -> Option<&Round> {
        self.rounds.iter().find(|r| r.id == id)
    }

    pub fn round_mut(&mut self, id: Uuid) -> Option<&mut Round> {
        self.rounds.iter_mut().find(|r| r.id == id)
    }

    /// The round matching the game's current round number
    pub fn current_round(&self) -> Option<&Round> {
        self.rounds
            .iter()
            .find(|r| r.round_number == self.game.current_round)
    }

    /// Players on a team, in join order
    pub fn team_players(&self, team_id: Uuid) -> impl Iterator<Item = &Player> {
        self.players
            .iter()
            .filter(move |p| p.team_id == Some(team_id))
    }

    /// Players not yet assigned to any team
    pub fn unassigned_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.team_id.is_none())
    }

    /// Prompt ids already bound to any round of this game
    pub fn used_prompt_ids(&self) -> HashSet<Uuid> {
        self.rounds.iter().filter_map(|r| r.prompt_id).collect()
    }

    /// Insert a team, enforcing one team per display order
    pub fn add_team(&mut self, team: Team) -> Result<(), GameError> {
        if team.game_id != self.game.id {
            return Err(GameError::Validation(
                "Team belongs to a different game".to_string(),
            ));
        }
        if self.teams.iter().any(|t| t.order == team.order) {
            return Err(GameError::Validation(format!(
                "A team with order {} already exists",
                team.order
            )));
        }
        self.teams.push(team);
        Ok(())
    }

    /// Insert a player, enforcing session token uniqueness within the game
    pub fn add_player(&mut self, player: Player) -> Result<(), GameError> {
        if player.game_id != self.game.id {
            return Err(GameError::Validation(
                "Player belongs to a different game".to_string(),
            ));
        }
        if self
            .players
            .iter()
            .any(|p| p.session_token == player.session_token)
        {
            return Err(GameError::Validation(
                "Session token already in use".to_string(),
            ));
        }
        self.players.push(player);
        Ok(())
    }

    /// Insert a round, enforcing one round per number
    pub fn add_round(&mut self, round: Round) -> Result<(), GameError> {
        if round.game_id != self.game.id {
            return Err(GameError::Validation(
                "Round belongs to a different game".to_string(),
            ));
        }
        if self
            .rounds
            .iter()
            .any(|r| r.round_number == round.round_number)
        {
            return Err(GameError::Validation(format!(
                "Round {} already exists",
                round.round_number
            )));
        }
        self.rounds.push(round);
        Ok(())
    }
}

/// A registered game: its record behind the per-game lock
#[derive(Debug)]
pub struct GameEntry {
    pub record: RwLock<GameRecord>,
}

impl GameEntry {
    fn new(game: Game) -> Self {
        Self {
            record: RwLock::new(GameRecord::new(game)),
        }
    }
}

/// Registry of live games keyed by join code, plus a round-id index so
/// round-scoped actions can find their game without a scan.
pub struct GameStore {
    games: DashMap<String, Arc<GameEntry>>,
    round_index: DashMap<Uuid, String>,
}

impl GameStore {
    pub fn new() -> Self {
        Self {
            games: DashMap::new(),
            round_index: DashMap::new(),
        }
    }

    /// Register a new game under a freshly generated unique code
    pub fn create(&self) -> Arc<GameEntry> {
        loop {
            let code = generate_code(&mut rand::thread_rng());
            match self.games.entry(code.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    info!(code = %code, "Code collision, regenerating");
                    continue;
                }
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    let entry = Arc::new(GameEntry::new(Game::new(code)));
                    slot.insert(entry.clone());
                    return entry;
                }
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<Arc<GameEntry>> {
        self.games.get(code).map(|e| e.value().clone())
    }

    /// Remember which game a round belongs to
    pub fn index_round(&self, round_id: Uuid, code: &str) {
        self.round_index.insert(round_id, code.to_string());
    }

    /// Join code of the game owning a round
    pub fn code_for_round(&self, round_id: Uuid) -> Option<String> {
        self.round_index.get(&round_id).map(|c| c.value().clone())
    }

    pub fn active_games(&self) -> usize {
        self.games.len()
    }
}

impl Default for GameStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Random join code over the unambiguous uppercase alphabet
fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}
