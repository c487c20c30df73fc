//! Read projections - game state and scoreboard views built from a record
//!
//! Builders take a `&GameRecord` (read or write lock already held by the
//! caller) plus the catalog and produce the wire types in `ws::protocol`.
//! Nothing here mutates.

use crate::game::entities::{GameStatus, Round, RoundStatus, Team};
use crate::store::catalog::{CatalogStore, Category, Prompt};
use crate::store::games::GameRecord;
use crate::ws::protocol::{
    ActorPromptView, BestRound, CategoryView, GameSnapshot, PlayerView, RoundView,
    ScoreboardView, TeamStanding, TeamView,
};

/// Full game state as broadcast to every subscriber
pub fn build_snapshot(record: &GameRecord, catalog: &CatalogStore) -> GameSnapshot {
    let mut teams: Vec<&Team> = record.teams.iter().collect();
    teams.sort_by_key(|t| t.order);

    let round = if record.game.status == GameStatus::InProgress {
        record
            .current_round()
            .map(|r| build_round_view(record, r, catalog))
    } else {
        None
    };

    let selected_categories = record
        .game
        .selected_categories
        .iter()
        .filter_map(|id| catalog.category(*id))
        .map(|c| CategoryView {
            id: c.id,
            name: c.name,
            name_ar: c.name_ar,
            icon: c.icon,
        })
        .collect();

    GameSnapshot {
        code: record.game.code.clone(),
        status: record.game.status,
        current_round: record.game.current_round,
        total_rounds: record.game.total_rounds,
        max_time_per_turn: record.game.max_time_per_turn,
        created_at: record.game.created_at,
        updated_at: record.game.updated_at,
        teams: teams
            .into_iter()
            .map(|t| build_team_view(record, t))
            .collect(),
        unassigned_players: record.unassigned_players().map(player_view).collect(),
        round,
        selected_categories,
        settings: record.game.settings.clone(),
    }
}

/// Team with its nested roster
pub fn build_team_view(record: &GameRecord, team: &Team) -> TeamView {
    TeamView {
        id: team.id,
        name: team.name.clone(),
        color: team.color.clone(),
        total_score: team.total_score,
        order: team.order as u32,
        players: record.team_players(team.id).map(player_view).collect(),
    }
}

/// Round detail as every client may see it. The prompt stays hidden; only
/// the token travels, so the host screen can render the actor's QR code.
pub fn build_round_view(record: &GameRecord, round: &Round, catalog: &CatalogStore) -> RoundView {
    let team = record.team(round.team_id);
    let actor = round.actor_id.and_then(|id| record.player(id));
    let category = round.category_id.and_then(|id| catalog.category(id));

    RoundView {
        id: round.id,
        round_number: round.round_number,
        team_id: round.team_id,
        team_name: team.map(|t| t.name.clone()).unwrap_or_default(),
        team_color: team.map(|t| t.color.clone()).unwrap_or_default(),
        actor_id: round.actor_id,
        actor_name: actor.map(|p| p.name.clone()),
        category_id: round.category_id,
        category_name: category.as_ref().map(|c| c.name.clone()),
        category_icon: category.as_ref().map(|c| c.icon.clone()),
        status: round.status,
        token: round.token.clone(),
        started_at: round.started_at,
        ended_at: round.ended_at,
        time_taken_seconds: round.time_taken_seconds,
        points_awarded: round.points_awarded,
    }
}

/// End-of-game summary: standings, the winner, and the fastest guess
pub fn build_scoreboard(record: &GameRecord, catalog: &CatalogStore) -> ScoreboardView {
    let finished: Vec<&Round> = record
        .rounds
        .iter()
        .filter(|r| r.status.is_terminal())
        .collect();

    let mut teams: Vec<&Team> = record.teams.iter().collect();
    teams.sort_by_key(|t| t.order);

    let standings: Vec<TeamStanding> = teams
        .iter()
        .map(|team| TeamStanding {
            id: team.id,
            name: team.name.clone(),
            color: team.color.clone(),
            total_score: team.total_score,
            rounds_won: finished
                .iter()
                .filter(|r| r.team_id == team.id && r.status == RoundStatus::Guessed)
                .count(),
            rounds_timeout: finished
                .iter()
                .filter(|r| r.team_id == team.id && r.status == RoundStatus::Timeout)
                .count(),
        })
        .collect();

    // First-listed team wins ties, so only a strictly higher score replaces
    let mut winner: Option<&TeamStanding> = None;
    for standing in &standings {
        match winner {
            Some(current) if standing.total_score <= current.total_score => {}
            _ => winner = Some(standing),
        }
    }
    let winner = winner.cloned();

    let best_round = finished
        .iter()
        .filter(|r| r.status == RoundStatus::Guessed)
        .filter_map(|r| r.time_taken_seconds.map(|t| (*r, t)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(round, time_taken)| BestRound {
            round_number: round.round_number,
            time_taken,
            points: round.points_awarded,
            actor: round
                .actor_id
                .and_then(|id| record.player(id))
                .map(|p| p.name.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            prompt: round
                .prompt_id
                .and_then(|id| catalog.prompt(id))
                .map(|p| p.title)
                .unwrap_or_else(|| "Unknown".to_string()),
        });

    ScoreboardView {
        game_code: record.game.code.clone(),
        teams: standings,
        winner,
        best_round,
        total_rounds_played: finished.len(),
    }
}

/// The prompt reveal handed to the actor's device
pub fn build_actor_prompt(round: &Round, prompt: &Prompt, category: &Category) -> ActorPromptView {
    ActorPromptView {
        round_id: round.id,
        round_number: round.round_number,
        title: prompt.title.clone(),
        title_ar: prompt.title_ar.clone(),
        image_url: prompt.image.as_ref().map(|i| i.display_url()),
        category: category.name.clone(),
        category_ar: category.name_ar.clone(),
        category_icon: category.icon.clone(),
    }
}

fn player_view(player: &crate::game::entities::Player) -> PlayerView {
    PlayerView {
        id: player.id,
        name: player.name.clone(),
        is_host: player.is_host,
        created_at: player.created_at,
    }
}
