//! Session directory - every game mutation goes through here
//!
//! The directory owns cross-entity invariants the round state machine
//! cannot see on its own: lobby-only joins, team rosters at start, score
//! aggregation, turn rotation and prompt allocation. Each operation takes
//! its game's write lock for one short read-validate-write section, so two
//! racing calls resolve to exactly one winner.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::game::allocator::pick_prompt;
use crate::game::entities::{GameStatus, Player, Round, RoundStatus, Team, DEFAULT_TEAMS};
use crate::game::rotation::{next_order, team_with_order, FIRST_TEAM_ORDER};
use crate::game::scoring::ScoringTable;
use crate::game::GameError;
use crate::session::identity::{self, reconcile_join};
use crate::session::views::{
    build_actor_prompt, build_round_view, build_scoreboard, build_snapshot, build_team_view,
};
use crate::store::catalog::CatalogStore;
use crate::store::games::{GameEntry, GameRecord, GameStore};
use crate::ws::protocol::{ActorPromptView, GameSnapshot, RoundView, ScoreboardView, TeamView};

/// Longest accepted player or team name
const MAX_NAME_LEN: usize = 100;
const MIN_TOTAL_ROUNDS: u32 = 1;
const MAX_TOTAL_ROUNDS: u32 = 50;
const MIN_TIME_PER_TURN: u32 = 30;
const MAX_TIME_PER_TURN: u32 = 600;

/// Returned to the host's device after create_game
#[derive(Debug, Clone)]
pub struct CreatedGame {
    pub code: String,
    pub player_id: Uuid,
    pub session_token: String,
}

/// Returned to a joining device
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub player_id: Uuid,
    pub session_token: String,
    pub player_name: String,
    pub team_id: Option<Uuid>,
}

/// Partial settings change; absent fields keep their value
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub total_rounds: Option<u32>,
    pub max_time_per_turn: Option<u32>,
    /// Merged into the settings bag key by key
    pub settings: Option<Map<String, Value>>,
    /// Replaces the selected category set
    pub category_ids: Option<Vec<Uuid>>,
}

/// Result of a correct guess: the round plus the scoring side effects
#[derive(Debug, Clone)]
pub struct GuessResult {
    pub round: RoundView,
    pub time_taken: f64,
    pub points: i32,
    /// The scoring team's new running total
    pub team_score: i32,
}

/// Result of advancing past a finished round
#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    /// True when all rounds are played and the game just finished
    pub finished: bool,
    /// The newly created round, absent when the game finished
    pub round: Option<RoundView>,
}

/// Orchestrates all game sessions in this process
pub struct SessionDirectory {
    games: Arc<GameStore>,
    catalog: Arc<CatalogStore>,
    scoring: ScoringTable,
}

impl SessionDirectory {
    pub fn new(games: Arc<GameStore>, catalog: Arc<CatalogStore>) -> Self {
        Self::with_scoring(games, catalog, ScoringTable::default())
    }

    pub fn with_scoring(
        games: Arc<GameStore>,
        catalog: Arc<CatalogStore>,
        scoring: ScoringTable,
    ) -> Self {
        Self {
            games,
            catalog,
            scoring,
        }
    }

    /// Create a game with the two default teams and its host player.
    /// The host stays unassigned until they pick a team like everyone else.
    pub fn create_game(
        &self,
        host_name: &str,
        session_token: Option<String>,
    ) -> Result<CreatedGame, GameError> {
        let host_name = valid_name(host_name, "Player name")?;
        let session_token = session_token.unwrap_or_else(identity::host_token);

        let entry = self.games.create();
        let mut record = entry.record.write();
        let game_id = record.game.id;

        for (name, color, order) in DEFAULT_TEAMS {
            record.add_team(Team::new(game_id, name, color, order))?;
        }

        let host = Player::new(game_id, host_name, session_token.clone(), true);
        let player_id = host.id;
        record.add_player(host)?;

        let code = record.game.code.clone();
        drop(record);

        info!(code = %code, "Game created");

        Ok(CreatedGame {
            code,
            player_id,
            session_token,
        })
    }

    /// Join (or rejoin) a lobby. A device that presents a token it already
    /// holds in this game gets its old player back, renamed.
    pub fn join_game(
        &self,
        code: &str,
        player_name: &str,
        session_token: Option<String>,
    ) -> Result<JoinOutcome, GameError> {
        let player_name = valid_name(player_name, "Player name")?;
        let session_token = session_token.unwrap_or_else(identity::device_token);
        let entry = self.entry(code)?;

        let mut record = entry.record.write();
        if record.game.status != GameStatus::Lobby {
            return Err(GameError::InvalidState(
                "Game has already started".to_string(),
            ));
        }

        let reconciled = reconcile_join(&mut record, &player_name, &session_token)?;
        let code = record.game.code.clone();
        drop(record);

        info!(
            code = %code,
            player = %player_name,
            rejoined = reconciled.rejoined,
            "Player joined"
        );

        Ok(JoinOutcome {
            player_id: reconciled.player_id,
            session_token,
            player_name,
            team_id: reconciled.team_id,
        })
    }

    /// Host adds a player who has no device. The synthetic token keeps the
    /// roster's token-uniqueness without letting anyone reconnect as them.
    pub fn host_add_player(
        &self,
        code: &str,
        player_name: &str,
        team_id: Option<Uuid>,
    ) -> Result<Uuid, GameError> {
        let player_name = valid_name(player_name, "Player name")?;
        let entry = self.entry(code)?;

        let mut record = entry.record.write();
        if record.game.status != GameStatus::Lobby {
            return Err(GameError::InvalidState(
                "Game has already started".to_string(),
            ));
        }
        if let Some(team_id) = team_id {
            if record.team(team_id).is_none() {
                return Err(GameError::not_found("Team"));
            }
        }

        let mut player = Player::new(
            record.game.id,
            player_name,
            identity::host_added_token(),
            false,
        );
        player.team_id = team_id;
        let player_id = player.id;
        record.add_player(player)?;

        let code = record.game.code.clone();
        drop(record);

        info!(code = %code, player_id = %player_id, "Host added a player");
        Ok(player_id)
    }

    /// Move a player onto a team. Allowed at any game status so lineups
    /// can be fixed mid-game.
    pub fn assign_player_to_team(
        &self,
        code: &str,
        player_id: Uuid,
        team_id: Uuid,
    ) -> Result<(), GameError> {
        let entry = self.entry(code)?;
        let mut record = entry.record.write();

        if record.team(team_id).is_none() {
            return Err(GameError::not_found("Team"));
        }
        let player = record
            .player_mut(player_id)
            .ok_or_else(|| GameError::not_found("Player"))?;
        player.team_id = Some(team_id);
        Ok(())
    }

    /// Rename or recolor a team
    pub fn update_team(
        &self,
        code: &str,
        team_id: Uuid,
        name: Option<String>,
        color: Option<String>,
    ) -> Result<TeamView, GameError> {
        let name = name.map(|n| valid_name(&n, "Team name")).transpose()?;
        if let Some(color) = &color {
            if !is_hex_color(color) {
                return Err(GameError::Validation(
                    "Color must be a hex value like #3B82F6".to_string(),
                ));
            }
        }

        let entry = self.entry(code)?;
        let mut record = entry.record.write();
        {
            let team = record
                .team_mut(team_id)
                .ok_or_else(|| GameError::not_found("Team"))?;
            if let Some(name) = name {
                team.name = name;
            }
            if let Some(color) = color {
                team.color = color;
            }
        }

        match record.team(team_id) {
            Some(team) => Ok(build_team_view(&record, team)),
            None => Err(GameError::not_found("Team")),
        }
    }

    /// Apply a partial settings change. Every field is validated before
    /// anything is written, so a bad update changes nothing.
    pub fn update_game_settings(
        &self,
        code: &str,
        update: SettingsUpdate,
    ) -> Result<(), GameError> {
        if let Some(total) = update.total_rounds {
            if !(MIN_TOTAL_ROUNDS..=MAX_TOTAL_ROUNDS).contains(&total) {
                return Err(GameError::Validation(format!(
                    "total_rounds must be between {} and {}",
                    MIN_TOTAL_ROUNDS, MAX_TOTAL_ROUNDS
                )));
            }
        }
        if let Some(limit) = update.max_time_per_turn {
            if !(MIN_TIME_PER_TURN..=MAX_TIME_PER_TURN).contains(&limit) {
                return Err(GameError::Validation(format!(
                    "max_time_per_turn must be between {} and {} seconds",
                    MIN_TIME_PER_TURN, MAX_TIME_PER_TURN
                )));
            }
        }

        // Category ids are checked against the catalog up front; duplicates
        // collapse while keeping the host's ordering
        let category_ids = match update.category_ids {
            Some(ids) => {
                let mut seen = HashSet::new();
                let mut deduped = Vec::with_capacity(ids.len());
                for id in ids {
                    if self.catalog.category(id).is_none() {
                        return Err(GameError::not_found("Category"));
                    }
                    if seen.insert(id) {
                        deduped.push(id);
                    }
                }
                Some(deduped)
            }
            None => None,
        };

        let entry = self.entry(code)?;
        let mut record = entry.record.write();

        if let Some(total) = update.total_rounds {
            record.game.total_rounds = total;
        }
        if let Some(limit) = update.max_time_per_turn {
            record.game.max_time_per_turn = limit;
        }
        if let Some(bag) = update.settings {
            for (key, value) in bag {
                record.game.settings.insert(key, value);
            }
        }
        if let Some(ids) = category_ids {
            record.game.selected_categories = ids;
        }
        record.game.touch();
        Ok(())
    }

    /// Leave the lobby: every team needs a player, then round 1 goes to
    /// the order-1 team.
    pub fn start_game(&self, code: &str) -> Result<(), GameError> {
        let entry = self.entry(code)?;
        let mut record = entry.record.write();

        if record.game.status != GameStatus::Lobby {
            return Err(GameError::InvalidState(
                "Game is not in lobby state".to_string(),
            ));
        }
        if record.teams.len() < 2 {
            return Err(GameError::InvalidState(
                "Game needs at least two teams".to_string(),
            ));
        }
        if let Some(team) = record
            .teams
            .iter()
            .find(|t| record.team_players(t.id).next().is_none())
        {
            return Err(GameError::InvalidState(format!(
                "{} needs at least one player",
                team.name
            )));
        }

        let first_team = team_with_order(&record.teams, FIRST_TEAM_ORDER)
            .map(|t| t.id)
            .ok_or_else(|| GameError::not_found("Team"))?;

        let round = Round::new(record.game.id, 1, first_team);
        let round_id = round.id;

        record.game.status = GameStatus::InProgress;
        record.game.current_round = 1;
        record.game.touch();
        record.add_round(round)?;

        let code = record.game.code.clone();
        drop(record);

        self.games.index_round(round_id, &code);
        info!(code = %code, round_id = %round_id, "Game started");
        Ok(())
    }

    /// The active team picks its actor
    pub fn select_actor(&self, round_id: Uuid, player_id: Uuid) -> Result<RoundView, GameError> {
        let (code, entry) = self.round_entry(round_id)?;
        let mut record = entry.record.write();

        let player = record
            .player(player_id)
            .cloned()
            .ok_or_else(|| GameError::not_found("Player"))?;
        {
            let round = record
                .round_mut(round_id)
                .ok_or_else(|| GameError::not_found("Round"))?;
            round.select_actor(&player)?;
        }

        let view = round_view_by_id(&record, round_id, &self.catalog)?;
        drop(record);

        info!(code = %code, round_id = %round_id, actor = %player.name, "Actor selected");
        Ok(view)
    }

    /// The actor picks a category; the server draws the prompt so nobody
    /// on the guessing side ever sees it.
    pub fn select_category(
        &self,
        round_id: Uuid,
        category_id: Uuid,
    ) -> Result<RoundView, GameError> {
        let (code, entry) = self.round_entry(round_id)?;

        let category = self
            .catalog
            .category(category_id)
            .ok_or_else(|| GameError::not_found("Category"))?;
        let candidates = self.catalog.active_prompt_ids(category_id);
        if candidates.is_empty() {
            return Err(GameError::NotFound(format!(
                "No prompts available in category {}",
                category.name
            )));
        }

        let mut record = entry.record.write();
        {
            let round = record
                .round(round_id)
                .ok_or_else(|| GameError::not_found("Round"))?;
            if round.status != RoundStatus::SelectingCategory {
                return Err(GameError::InvalidState(
                    "Round is not in category selection".to_string(),
                ));
            }
        }

        let used = record.used_prompt_ids();
        let prompt_id = pick_prompt(&mut rand::thread_rng(), &candidates, &used)
            .ok_or_else(|| {
                GameError::NotFound(format!(
                    "No prompts available in category {}",
                    category.name
                ))
            })?;

        {
            let round = record
                .round_mut(round_id)
                .ok_or_else(|| GameError::not_found("Round"))?;
            round.bind_prompt(category_id, prompt_id, identity::round_token())?;
        }

        let view = round_view_by_id(&record, round_id, &self.catalog)?;
        drop(record);

        // Usage only counts once the prompt is actually bound to a round
        self.catalog.record_usage(prompt_id);

        info!(
            code = %code,
            round_id = %round_id,
            category = %category.name,
            "Category selected, prompt drawn"
        );
        Ok(view)
    }

    /// Actor confirms they have seen the prompt
    pub fn actor_ready(&self, round_id: Uuid) -> Result<RoundView, GameError> {
        self.transition(round_id, "Actor ready", |round| round.mark_actor_ready())
    }

    /// Start the guessing timer
    pub fn start_timer(&self, round_id: Uuid) -> Result<RoundView, GameError> {
        let now = Utc::now();
        self.transition(round_id, "Timer started", move |round| {
            round.start_timer(now)
        })
    }

    /// The team guessed it: close the round and bank the points in the
    /// same critical section, so score and status can never diverge.
    pub fn correct_guess(&self, round_id: Uuid) -> Result<GuessResult, GameError> {
        let (code, entry) = self.round_entry(round_id)?;
        let now = Utc::now();

        let mut record = entry.record.write();
        let team_id = record
            .round(round_id)
            .ok_or_else(|| GameError::not_found("Round"))?
            .team_id;
        if record.team(team_id).is_none() {
            return Err(GameError::not_found("Team"));
        }

        let outcome = {
            let round = record
                .round_mut(round_id)
                .ok_or_else(|| GameError::not_found("Round"))?;
            round.finish_guessed(now, &self.scoring)?
        };

        let team_score = {
            let team = record
                .team_mut(team_id)
                .ok_or_else(|| GameError::not_found("Team"))?;
            team.total_score += outcome.points;
            team.total_score
        };

        let view = round_view_by_id(&record, round_id, &self.catalog)?;
        drop(record);

        info!(
            code = %code,
            round_id = %round_id,
            points = outcome.points,
            time_taken = outcome.time_taken,
            "Correct guess"
        );

        Ok(GuessResult {
            round: view,
            time_taken: outcome.time_taken,
            points: outcome.points,
            team_score,
        })
    }

    /// A client reported the deadline passed
    pub fn timeout_round(&self, round_id: Uuid) -> Result<RoundView, GameError> {
        let now = Utc::now();
        self.transition(round_id, "Round timed out", move |round| {
            round.finish_timeout(now)
        })
    }

    /// Abandon the round
    pub fn skip_round(&self, round_id: Uuid) -> Result<RoundView, GameError> {
        let now = Utc::now();
        self.transition(round_id, "Round skipped", move |round| {
            round.finish_skipped(now)
        })
    }

    /// Move past a finished round: either create the next one for the
    /// other team or finish the game when all rounds are played.
    pub fn advance_round(&self, code: &str) -> Result<AdvanceOutcome, GameError> {
        let entry = self.entry(code)?;
        let mut record = entry.record.write();

        if record.game.status != GameStatus::InProgress {
            return Err(GameError::InvalidState(
                "Game is not in progress".to_string(),
            ));
        }
        let (current_team, terminal) = match record.current_round() {
            Some(round) => (round.team_id, round.status.is_terminal()),
            None => {
                return Err(GameError::InvalidState(
                    "No round to advance from".to_string(),
                ))
            }
        };
        // A duplicate next_round lands here instead of eating a turn
        if !terminal {
            return Err(GameError::InvalidState(
                "Current round has not ended".to_string(),
            ));
        }

        if record.game.current_round >= record.game.total_rounds {
            record.game.status = GameStatus::Finished;
            record.game.touch();
            let code = record.game.code.clone();
            drop(record);

            info!(code = %code, "Game finished");
            return Ok(AdvanceOutcome {
                finished: true,
                round: None,
            });
        }

        let current_order = record
            .team(current_team)
            .map(|t| t.order)
            .ok_or_else(|| GameError::not_found("Team"))?;
        let next_team = team_with_order(&record.teams, next_order(current_order))
            .map(|t| t.id)
            .ok_or_else(|| GameError::not_found("Team"))?;

        let number = record.game.current_round + 1;
        let round = Round::new(record.game.id, number, next_team);
        let round_id = round.id;
        record.add_round(round)?;
        record.game.current_round = number;
        record.game.touch();

        let view = round_view_by_id(&record, round_id, &self.catalog)?;
        let code = record.game.code.clone();
        drop(record);

        self.games.index_round(round_id, &code);
        info!(code = %code, round = number, "Advanced to next round");
        Ok(AdvanceOutcome {
            finished: false,
            round: Some(view),
        })
    }

    /// Full state snapshot for subscribers and REST reads
    pub fn game_state(&self, code: &str) -> Result<GameSnapshot, GameError> {
        let entry = self.entry(code)?;
        let record = entry.record.read();
        Ok(build_snapshot(&record, &self.catalog))
    }

    /// End-of-game (or mid-game) standings
    pub fn scoreboard(&self, code: &str) -> Result<ScoreboardView, GameError> {
        let entry = self.entry(code)?;
        let record = entry.record.read();
        Ok(build_scoreboard(&record, &self.catalog))
    }

    /// Actor-only prompt fetch, gated by the round token. Never appears
    /// in any broadcast or snapshot.
    pub fn actor_prompt(&self, round_id: Uuid, token: &str) -> Result<ActorPromptView, GameError> {
        let (_, entry) = self.round_entry(round_id)?;
        let record = entry.record.read();

        let round = record
            .round(round_id)
            .ok_or_else(|| GameError::not_found("Round"))?;
        // An empty round token never grants access
        if round.token.is_empty() || round.token != token {
            return Err(GameError::Permission("Invalid token".to_string()));
        }
        if !round.status.prompt_visible() {
            return Err(GameError::InvalidState(
                "Prompt is not available in the round's current state".to_string(),
            ));
        }

        let prompt_id = round
            .prompt_id
            .ok_or_else(|| GameError::not_found("Prompt"))?;
        let prompt = self
            .catalog
            .prompt(prompt_id)
            .ok_or_else(|| GameError::not_found("Prompt"))?;
        let category = self
            .catalog
            .category(prompt.category_id)
            .ok_or_else(|| GameError::not_found("Category"))?;

        Ok(build_actor_prompt(round, &prompt, &category))
    }

    /// Which game a round belongs to, for connection-scope checks
    pub fn round_game_code(&self, round_id: Uuid) -> Option<String> {
        self.games.code_for_round(round_id)
    }

    fn entry(&self, code: &str) -> Result<Arc<GameEntry>, GameError> {
        self.games
            .get(&code.trim().to_uppercase())
            .ok_or_else(|| GameError::not_found("Game"))
    }

    fn round_entry(&self, round_id: Uuid) -> Result<(String, Arc<GameEntry>), GameError> {
        let code = self
            .games
            .code_for_round(round_id)
            .ok_or_else(|| GameError::not_found("Round"))?;
        let entry = self
            .games
            .get(&code)
            .ok_or_else(|| GameError::not_found("Game"))?;
        Ok((code, entry))
    }

    /// Shared shape of the single-round transitions: resolve, lock, apply,
    /// project.
    fn transition(
        &self,
        round_id: Uuid,
        message: &str,
        apply: impl FnOnce(&mut Round) -> Result<(), GameError>,
    ) -> Result<RoundView, GameError> {
        let (code, entry) = self.round_entry(round_id)?;
        let mut record = entry.record.write();
        {
            let round = record
                .round_mut(round_id)
                .ok_or_else(|| GameError::not_found("Round"))?;
            apply(round)?;
        }

        let view = round_view_by_id(&record, round_id, &self.catalog)?;
        drop(record);

        info!(code = %code, round_id = %round_id, "{}", message);
        Ok(view)
    }
}

fn round_view_by_id(
    record: &GameRecord,
    round_id: Uuid,
    catalog: &CatalogStore,
) -> Result<RoundView, GameError> {
    let round = record
        .round(round_id)
        .ok_or_else(|| GameError::not_found("Round"))?;
    Ok(build_round_view(record, round, catalog))
}

fn valid_name(raw: &str, what: &str) -> Result<String, GameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(GameError::Validation(format!("{} is required", what)));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(GameError::Validation(format!(
            "{} must be at most {} characters",
            what, MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7 && value.starts_with('#') && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::store::catalog::{Category, Prompt};

    fn empty_directory() -> SessionDirectory {
        SessionDirectory::new(Arc::new(GameStore::new()), Arc::new(CatalogStore::new()))
    }

    /// Directory backed by a catalog with `prompts_per` prompts in each of
    /// `categories` categories; returns the category ids in order
    fn seeded_directory(categories: usize, prompts_per: usize) -> (SessionDirectory, Vec<Uuid>) {
        let catalog = Arc::new(CatalogStore::new());
        let mut ids = Vec::new();
        for c in 0..categories {
            let category = Category::new(&format!("Category {}", c + 1));
            ids.push(category.id);
            for p in 0..prompts_per {
                catalog.insert_prompt(Prompt::new(
                    category.id,
                    &format!("Prompt {}-{}", c + 1, p + 1),
                ));
            }
            catalog.insert_category(category);
        }
        (
            SessionDirectory::new(Arc::new(GameStore::new()), catalog),
            ids,
        )
    }

    struct Started {
        dir: SessionDirectory,
        code: String,
        category_id: Uuid,
        host: Uuid,
        alice: Uuid,
        bob: Uuid,
        team1: Uuid,
        team2: Uuid,
    }

    /// A game with host+Alice on team 1, Bob on team 2, already started
    fn started_game() -> Started {
        let (dir, categories) = seeded_directory(1, 20);
        let created = dir.create_game("Host", None).unwrap();
        let code = created.code.clone();

        let alice = dir.join_game(&code, "Alice", None).unwrap().player_id;
        let bob = dir.join_game(&code, "Bob", None).unwrap().player_id;

        let snapshot = dir.game_state(&code).unwrap();
        let team1 = snapshot.teams[0].id;
        let team2 = snapshot.teams[1].id;

        dir.assign_player_to_team(&code, created.player_id, team1)
            .unwrap();
        dir.assign_player_to_team(&code, alice, team1).unwrap();
        dir.assign_player_to_team(&code, bob, team2).unwrap();
        dir.start_game(&code).unwrap();

        Started {
            dir,
            code,
            category_id: categories[0],
            host: created.player_id,
            alice,
            bob,
            team1,
            team2,
        }
    }

    fn current_round_id(dir: &SessionDirectory, code: &str) -> Uuid {
        dir.game_state(code).unwrap().round.unwrap().id
    }

    /// Pull the timer start back so elapsed-time scoring is testable
    fn rewind_timer(dir: &SessionDirectory, code: &str, round_id: Uuid, seconds: i64) {
        let entry = dir.games.get(code).unwrap();
        let mut record = entry.record.write();
        if let Some(round) = record.round_mut(round_id) {
            round.started_at = Some(Utc::now() - Duration::seconds(seconds));
        }
    }

    #[test]
    fn create_game_seeds_defaults() {
        let dir = empty_directory();
        let created = dir.create_game("Host", None).unwrap();

        assert!(created.session_token.starts_with("host_"));

        let snapshot = dir.game_state(&created.code).unwrap();
        assert_eq!(snapshot.status, GameStatus::Lobby);
        assert_eq!(snapshot.teams.len(), 2);
        assert_eq!(snapshot.teams[0].name, "Team 1");
        assert_eq!(snapshot.teams[0].color, "#3B82F6");
        assert_eq!(snapshot.teams[0].order, 1);
        assert_eq!(snapshot.teams[1].name, "Team 2");
        assert_eq!(snapshot.teams[1].color, "#EF4444");
        assert_eq!(snapshot.teams[1].order, 2);

        // The host starts unassigned like everyone else
        assert_eq!(snapshot.unassigned_players.len(), 1);
        assert_eq!(snapshot.unassigned_players[0].name, "Host");
        assert!(snapshot.unassigned_players[0].is_host);
    }

    #[test]
    fn create_game_rejects_blank_names() {
        let dir = empty_directory();
        assert!(matches!(
            dir.create_game("   ", None),
            Err(GameError::Validation(_))
        ));

        let long = "x".repeat(101);
        assert!(matches!(
            dir.create_game(&long, None),
            Err(GameError::Validation(_))
        ));
    }

    #[test]
    fn join_generates_a_token_when_none_is_given() {
        let dir = empty_directory();
        let code = dir.create_game("Host", None).unwrap().code;

        let joined = dir.join_game(&code, "Alice", None).unwrap();
        assert_eq!(joined.session_token.len(), 32);
        assert_eq!(joined.team_id, None);

        let kept = dir
            .join_game(&code, "Casey", Some("my-device-token".to_string()))
            .unwrap();
        assert_eq!(kept.session_token, "my-device-token");
    }

    #[test]
    fn join_accepts_lowercase_codes() {
        let dir = empty_directory();
        let code = dir.create_game("Host", None).unwrap().code;

        let joined = dir.join_game(&code.to_lowercase(), "Alice", None);
        assert!(joined.is_ok());
    }

    #[test]
    fn join_unknown_code_is_not_found() {
        let dir = empty_directory();
        assert!(matches!(
            dir.join_game("ZZZZZZ", "Alice", None),
            Err(GameError::NotFound(_))
        ));
    }

    #[test]
    fn rejoining_renames_instead_of_duplicating() {
        let dir = empty_directory();
        let code = dir.create_game("Host", None).unwrap().code;

        let first = dir
            .join_game(&code, "Alice", Some("tok".to_string()))
            .unwrap();
        let second = dir
            .join_game(&code, "Alicia", Some("tok".to_string()))
            .unwrap();

        assert_eq!(second.player_id, first.player_id);

        let snapshot = dir.game_state(&code).unwrap();
        let names: Vec<&str> = snapshot
            .unassigned_players
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert!(names.contains(&"Alicia"));
        assert!(!names.contains(&"Alice"));
    }

    #[test]
    fn join_after_start_is_rejected() {
        let game = started_game();
        let err = game.dir.join_game(&game.code, "Late", None).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
        assert_eq!(err.to_string(), "Game has already started");
    }

    #[test]
    fn host_add_player_lands_on_the_team() {
        let dir = empty_directory();
        let code = dir.create_game("Host", None).unwrap().code;
        let team1 = dir.game_state(&code).unwrap().teams[0].id;

        let player_id = dir
            .host_add_player(&code, "Grandma", Some(team1))
            .unwrap();

        let snapshot = dir.game_state(&code).unwrap();
        assert_eq!(snapshot.teams[0].players.len(), 1);
        assert_eq!(snapshot.teams[0].players[0].id, player_id);
        assert_eq!(snapshot.teams[0].players[0].name, "Grandma");

        assert!(matches!(
            dir.host_add_player(&code, "Nobody", Some(Uuid::new_v4())),
            Err(GameError::NotFound(_))
        ));
    }

    #[test]
    fn assign_player_moves_between_teams() {
        let dir = empty_directory();
        let created = dir.create_game("Host", None).unwrap();
        let code = created.code;
        let snapshot = dir.game_state(&code).unwrap();
        let (team1, team2) = (snapshot.teams[0].id, snapshot.teams[1].id);

        dir.assign_player_to_team(&code, created.player_id, team1)
            .unwrap();
        dir.assign_player_to_team(&code, created.player_id, team2)
            .unwrap();

        let snapshot = dir.game_state(&code).unwrap();
        assert!(snapshot.teams[0].players.is_empty());
        assert_eq!(snapshot.teams[1].players.len(), 1);

        assert!(matches!(
            dir.assign_player_to_team(&code, Uuid::new_v4(), team1),
            Err(GameError::NotFound(_))
        ));
        assert!(matches!(
            dir.assign_player_to_team(&code, created.player_id, Uuid::new_v4()),
            Err(GameError::NotFound(_))
        ));
    }

    #[test]
    fn update_team_validates_color() {
        let dir = empty_directory();
        let code = dir.create_game("Host", None).unwrap().code;
        let team1 = dir.game_state(&code).unwrap().teams[0].id;

        let view = dir
            .update_team(
                &code,
                team1,
                Some("Red Pandas".to_string()),
                Some("#AA00FF".to_string()),
            )
            .unwrap();
        assert_eq!(view.name, "Red Pandas");
        assert_eq!(view.color, "#AA00FF");

        for bad in ["AA00FF", "#AA00F", "#GG0000", "#AA00FF0"] {
            assert!(matches!(
                dir.update_team(&code, team1, None, Some(bad.to_string())),
                Err(GameError::Validation(_))
            ));
        }
    }

    #[test]
    fn settings_bounds_are_enforced() {
        let (dir, categories) = seeded_directory(2, 1);
        let code = dir.create_game("Host", None).unwrap().code;

        for update in [
            SettingsUpdate {
                total_rounds: Some(0),
                ..Default::default()
            },
            SettingsUpdate {
                total_rounds: Some(51),
                ..Default::default()
            },
            SettingsUpdate {
                max_time_per_turn: Some(29),
                ..Default::default()
            },
            SettingsUpdate {
                max_time_per_turn: Some(601),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                dir.update_game_settings(&code, update),
                Err(GameError::Validation(_))
            ));
        }

        assert!(matches!(
            dir.update_game_settings(
                &code,
                SettingsUpdate {
                    category_ids: Some(vec![Uuid::new_v4()]),
                    ..Default::default()
                }
            ),
            Err(GameError::NotFound(_))
        ));

        let mut bag = Map::new();
        bag.insert("language".to_string(), Value::String("ar".to_string()));
        dir.update_game_settings(
            &code,
            SettingsUpdate {
                total_rounds: Some(6),
                max_time_per_turn: Some(120),
                settings: Some(bag),
                category_ids: Some(vec![categories[0], categories[1], categories[0]]),
            },
        )
        .unwrap();

        let snapshot = dir.game_state(&code).unwrap();
        assert_eq!(snapshot.total_rounds, 6);
        assert_eq!(snapshot.max_time_per_turn, 120);
        assert_eq!(snapshot.settings.get("language"), Some(&Value::String("ar".to_string())));
        // Duplicate category collapsed, order kept
        assert_eq!(snapshot.selected_categories.len(), 2);
        assert_eq!(snapshot.selected_categories[0].id, categories[0]);
        assert_eq!(snapshot.selected_categories[1].id, categories[1]);
    }

    #[test]
    fn start_requires_every_team_to_have_a_player() {
        let dir = empty_directory();
        let created = dir.create_game("Host", None).unwrap();
        let code = created.code;

        // Nobody assigned yet
        let err = dir.start_game(&code).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
        assert!(err.to_string().contains("needs at least one player"));

        // One team filled, the other still empty
        let team1 = dir.game_state(&code).unwrap().teams[0].id;
        dir.assign_player_to_team(&code, created.player_id, team1)
            .unwrap();
        let err = dir.start_game(&code).unwrap_err();
        assert!(err.to_string().contains("Team 2"));
    }

    #[test]
    fn start_twice_fails() {
        let game = started_game();
        let err = game.dir.start_game(&game.code).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[test]
    fn starting_creates_round_one_for_the_first_team() {
        let game = started_game();
        let snapshot = game.dir.game_state(&game.code).unwrap();

        assert_eq!(snapshot.status, GameStatus::InProgress);
        assert_eq!(snapshot.current_round, 1);
        let round = snapshot.round.unwrap();
        assert_eq!(round.round_number, 1);
        assert_eq!(round.team_id, game.team1);
        assert_eq!(round.status, RoundStatus::SelectingActor);
    }

    #[test]
    fn actor_must_be_on_the_active_team() {
        let game = started_game();
        let round_id = current_round_id(&game.dir, &game.code);

        let err = game.dir.select_actor(round_id, game.bob).unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));

        assert!(matches!(
            game.dir.select_actor(round_id, Uuid::new_v4()),
            Err(GameError::NotFound(_))
        ));
    }

    #[test]
    fn full_round_scores_the_guessing_team() {
        let game = started_game();
        let round_id = current_round_id(&game.dir, &game.code);

        let view = game.dir.select_actor(round_id, game.alice).unwrap();
        assert_eq!(view.status, RoundStatus::SelectingCategory);
        assert_eq!(view.actor_name.as_deref(), Some("Alice"));

        let view = game
            .dir
            .select_category(round_id, game.category_id)
            .unwrap();
        assert_eq!(view.status, RoundStatus::ShowingQr);
        assert_eq!(view.category_name.as_deref(), Some("Category 1"));
        assert_eq!(view.token.len(), 32);

        let view = game.dir.actor_ready(round_id).unwrap();
        assert_eq!(view.status, RoundStatus::ActorReady);

        let view = game.dir.start_timer(round_id).unwrap();
        assert_eq!(view.status, RoundStatus::Active);
        assert!(view.started_at.is_some());

        rewind_timer(&game.dir, &game.code, round_id, 20);
        let result = game.dir.correct_guess(round_id).unwrap();

        assert_eq!(result.round.status, RoundStatus::Guessed);
        assert!((19.9..=20.5).contains(&result.time_taken));
        assert_eq!(result.points, 100);
        assert_eq!(result.team_score, 100);

        let snapshot = game.dir.game_state(&game.code).unwrap();
        assert_eq!(snapshot.teams[0].total_score, 100);
        assert_eq!(snapshot.teams[1].total_score, 0);

        // The loser of a duplicate guess observes the terminal status
        assert!(matches!(
            game.dir.correct_guess(round_id),
            Err(GameError::InvalidState(_))
        ));
    }

    #[test]
    fn timeout_awards_nothing() {
        let game = started_game();
        let round_id = current_round_id(&game.dir, &game.code);

        game.dir.select_actor(round_id, game.host).unwrap();
        game.dir.select_category(round_id, game.category_id).unwrap();
        game.dir.start_timer(round_id).unwrap();

        let view = game.dir.timeout_round(round_id).unwrap();
        assert_eq!(view.status, RoundStatus::Timeout);
        assert_eq!(view.points_awarded, 0);

        let snapshot = game.dir.game_state(&game.code).unwrap();
        assert_eq!(snapshot.teams[0].total_score, 0);
    }

    #[test]
    fn skip_works_before_the_timer_starts() {
        let game = started_game();
        let round_id = current_round_id(&game.dir, &game.code);

        let view = game.dir.skip_round(round_id).unwrap();
        assert_eq!(view.status, RoundStatus::Skipped);
        assert_eq!(view.time_taken_seconds, None);
    }

    #[test]
    fn advance_requires_a_terminal_round() {
        let game = started_game();

        let err = game.dir.advance_round(&game.code).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
        assert_eq!(err.to_string(), "Current round has not ended");
    }

    #[test]
    fn rounds_alternate_teams_until_the_game_finishes() {
        let game = started_game();
        game.dir
            .update_game_settings(
                &game.code,
                SettingsUpdate {
                    total_rounds: Some(4),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut seen_teams = Vec::new();
        for number in 1..=4u32 {
            let snapshot = game.dir.game_state(&game.code).unwrap();
            let round = snapshot.round.unwrap();
            assert_eq!(round.round_number, number);
            seen_teams.push(round.team_id);

            game.dir.skip_round(round.id).unwrap();
            let outcome = game.dir.advance_round(&game.code).unwrap();
            assert_eq!(outcome.finished, number == 4);
        }

        assert_eq!(
            seen_teams,
            vec![game.team1, game.team2, game.team1, game.team2]
        );

        let snapshot = game.dir.game_state(&game.code).unwrap();
        assert_eq!(snapshot.status, GameStatus::Finished);
        assert!(snapshot.round.is_none());

        // No advancing a finished game
        assert!(matches!(
            game.dir.advance_round(&game.code),
            Err(GameError::InvalidState(_))
        ));
    }

    #[test]
    fn prompts_do_not_repeat_within_a_game() {
        let (dir, categories) = seeded_directory(1, 3);
        let created = dir.create_game("Host", None).unwrap();
        let code = created.code.clone();

        let alice = dir.join_game(&code, "Alice", None).unwrap().player_id;
        let bob = dir.join_game(&code, "Bob", None).unwrap().player_id;
        let snapshot = dir.game_state(&code).unwrap();
        dir.assign_player_to_team(&code, created.player_id, snapshot.teams[0].id)
            .unwrap();
        dir.assign_player_to_team(&code, alice, snapshot.teams[0].id)
            .unwrap();
        dir.assign_player_to_team(&code, bob, snapshot.teams[1].id)
            .unwrap();
        dir.update_game_settings(
            &code,
            SettingsUpdate {
                total_rounds: Some(3),
                ..Default::default()
            },
        )
        .unwrap();
        dir.start_game(&code).unwrap();

        let mut drawn = Vec::new();
        for number in 1..=3u32 {
            let round = dir.game_state(&code).unwrap().round.unwrap();
            let actor = if round.team_id == snapshot.teams[0].id {
                alice
            } else {
                bob
            };
            dir.select_actor(round.id, actor).unwrap();
            dir.select_category(round.id, categories[0]).unwrap();

            let entry = dir.games.get(&code).unwrap();
            let prompt_id = entry
                .record
                .read()
                .round(round.id)
                .and_then(|r| r.prompt_id)
                .unwrap();
            drawn.push(prompt_id);

            dir.skip_round(round.id).unwrap();
            let outcome = dir.advance_round(&code).unwrap();
            assert_eq!(outcome.finished, number == 3);
        }

        let unique: HashSet<Uuid> = drawn.iter().copied().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn empty_category_cannot_be_selected() {
        let (dir, categories) = seeded_directory(1, 0);
        let created = dir.create_game("Host", None).unwrap();
        let code = created.code.clone();
        let alice = dir.join_game(&code, "Alice", None).unwrap().player_id;
        let bob = dir.join_game(&code, "Bob", None).unwrap().player_id;
        let snapshot = dir.game_state(&code).unwrap();
        dir.assign_player_to_team(&code, created.player_id, snapshot.teams[0].id)
            .unwrap();
        dir.assign_player_to_team(&code, alice, snapshot.teams[0].id)
            .unwrap();
        dir.assign_player_to_team(&code, bob, snapshot.teams[1].id)
            .unwrap();
        dir.start_game(&code).unwrap();

        let round_id = current_round_id(&dir, &code);
        dir.select_actor(round_id, alice).unwrap();

        let err = dir.select_category(round_id, categories[0]).unwrap_err();
        assert!(matches!(err, GameError::NotFound(_)));
        assert!(err.to_string().contains("No prompts available"));
    }

    #[test]
    fn actor_prompt_is_gated_by_token_and_status() {
        let game = started_game();
        let round_id = current_round_id(&game.dir, &game.code);

        // Before a prompt is bound there is nothing to fetch
        assert!(matches!(
            game.dir.actor_prompt(round_id, ""),
            Err(GameError::Permission(_))
        ));

        game.dir.select_actor(round_id, game.alice).unwrap();
        let view = game
            .dir
            .select_category(round_id, game.category_id)
            .unwrap();
        let token = view.token;

        let prompt = game.dir.actor_prompt(round_id, &token).unwrap();
        assert!(prompt.title.starts_with("Prompt"));
        assert_eq!(prompt.category, "Category 1");

        assert!(matches!(
            game.dir.actor_prompt(round_id, "wrong-token"),
            Err(GameError::Permission(_))
        ));

        // Terminal round: the token no longer opens anything
        game.dir.skip_round(round_id).unwrap();
        assert!(matches!(
            game.dir.actor_prompt(round_id, &token),
            Err(GameError::InvalidState(_))
        ));
    }

    #[test]
    fn concurrent_guesses_resolve_to_one_winner() {
        let game = started_game();
        let round_id = current_round_id(&game.dir, &game.code);

        game.dir.select_actor(round_id, game.alice).unwrap();
        game.dir
            .select_category(round_id, game.category_id)
            .unwrap();
        game.dir.start_timer(round_id).unwrap();
        rewind_timer(&game.dir, &game.code, round_id, 20);

        let dir = Arc::new(game.dir);
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let dir = Arc::clone(&dir);
                std::thread::spawn(move || dir.correct_guess(round_id))
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect();

        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        let loss = results.iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(loss, Err(GameError::InvalidState(_))));

        // Points banked exactly once
        let snapshot = dir.game_state(&game.code).unwrap();
        assert_eq!(snapshot.teams[0].total_score, 100);
    }

    #[test]
    fn round_ids_resolve_back_to_their_game() {
        let game = started_game();
        let round_id = current_round_id(&game.dir, &game.code);

        assert_eq!(
            game.dir.round_game_code(round_id).as_deref(),
            Some(game.code.as_str())
        );
        assert_eq!(game.dir.round_game_code(Uuid::new_v4()), None);
    }
}
