//! Round state machine - guarded transitions through a turn's lifecycle
//!
//! Every transition validates the current status before mutating, so a
//! stale or duplicate request fails with InvalidState instead of
//! re-running. Callers are expected to hold the game's write lock, which
//! makes each guard-plus-mutation atomic.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::entities::{Player, Round, RoundStatus};
use super::scoring::ScoringTable;
use super::GameError;

/// Result of a successful correct_guess transition
#[derive(Debug, Clone, Copy)]
pub struct GuessOutcome {
    /// Seconds from timer start to the guess, rounded to one decimal
    pub time_taken: f64,
    pub points: i32,
}

impl Round {
    /// The active team picks who acts this round
    pub fn select_actor(&mut self, player: &Player) -> Result<(), GameError> {
        if self.status != RoundStatus::SelectingActor {
            return Err(GameError::InvalidState(
                "Round is not in actor selection".to_string(),
            ));
        }
        if player.team_id != Some(self.team_id) {
            return Err(GameError::Validation(
                "Actor must be on the round's team".to_string(),
            ));
        }

        self.actor_id = Some(player.id);
        self.status = RoundStatus::SelectingCategory;
        Ok(())
    }

    /// Bind the allocated prompt and its access token to the round
    pub fn bind_prompt(
        &mut self,
        category_id: Uuid,
        prompt_id: Uuid,
        token: String,
    ) -> Result<(), GameError> {
        if self.status != RoundStatus::SelectingCategory {
            return Err(GameError::InvalidState(
                "Round is not in category selection".to_string(),
            ));
        }

        self.category_id = Some(category_id);
        self.prompt_id = Some(prompt_id);
        self.token = token;
        self.status = RoundStatus::ShowingQr;
        Ok(())
    }

    /// Actor confirms they have seen the prompt
    pub fn mark_actor_ready(&mut self) -> Result<(), GameError> {
        if self.status != RoundStatus::ShowingQr {
            return Err(GameError::InvalidState(
                "Round is not showing the prompt".to_string(),
            ));
        }

        self.status = RoundStatus::ActorReady;
        Ok(())
    }

    /// Start the guessing timer. Also accepted straight from showing_qr,
    /// for clients that never send the explicit ready signal.
    pub fn start_timer(&mut self, now: DateTime<Utc>) -> Result<(), GameError> {
        if !matches!(
            self.status,
            RoundStatus::ActorReady | RoundStatus::ShowingQr
        ) {
            return Err(GameError::InvalidState(
                "Round is not ready to start".to_string(),
            ));
        }

        self.started_at = Some(now);
        self.status = RoundStatus::Active;
        Ok(())
    }

    /// Record a correct guess and compute its score
    pub fn finish_guessed(
        &mut self,
        now: DateTime<Utc>,
        table: &ScoringTable,
    ) -> Result<GuessOutcome, GameError> {
        if self.status != RoundStatus::Active {
            return Err(GameError::InvalidState("Round is not active".to_string()));
        }
        let Some(started) = self.started_at else {
            return Err(GameError::InvalidState(
                "Round has no start time".to_string(),
            ));
        };

        let elapsed = seconds_between(started, now);
        let points = table.points_for(Some(elapsed), self.multiplier());

        self.status = RoundStatus::Guessed;
        self.ended_at = Some(now);
        self.time_taken_seconds = Some(round_to_tenth(elapsed));
        self.points_awarded = points;

        Ok(GuessOutcome {
            time_taken: round_to_tenth(elapsed),
            points,
        })
    }

    /// Record a client-reported timeout. Zero points.
    pub fn finish_timeout(&mut self, now: DateTime<Utc>) -> Result<(), GameError> {
        if self.status != RoundStatus::Active {
            return Err(GameError::InvalidState("Round is not active".to_string()));
        }

        self.status = RoundStatus::Timeout;
        self.ended_at = Some(now);
        if let Some(started) = self.started_at {
            self.time_taken_seconds = Some(round_to_tenth(seconds_between(started, now)));
        }
        self.points_awarded = 0;
        Ok(())
    }

    /// Abandon the round. Allowed before or during the timer; elapsed time
    /// is recorded only when a timer was actually running.
    pub fn finish_skipped(&mut self, now: DateTime<Utc>) -> Result<(), GameError> {
        if !self.status.can_skip() {
            return Err(GameError::InvalidState(
                "Round cannot be skipped in its current state".to_string(),
            ));
        }

        self.status = RoundStatus::Skipped;
        self.ended_at = Some(now);
        if let Some(started) = self.started_at {
            self.time_taken_seconds = Some(round_to_tenth(seconds_between(started, now)));
        }
        self.points_awarded = 0;
        Ok(())
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{Player, Round};
    use chrono::Duration;

    fn setup() -> (Round, Player) {
        let game_id = Uuid::new_v4();
        let team_id = Uuid::new_v4();
        let round = Round::new(game_id, 1, team_id);
        let mut player = Player::new(game_id, "Alice".to_string(), "tok".to_string(), false);
        player.team_id = Some(team_id);
        (round, player)
    }

    fn to_active(round: &mut Round, player: &Player, started: DateTime<Utc>) {
        round.select_actor(player).unwrap();
        round
            .bind_prompt(Uuid::new_v4(), Uuid::new_v4(), "deadbeef".to_string())
            .unwrap();
        round.mark_actor_ready().unwrap();
        round.start_timer(started).unwrap();
    }

    #[test]
    fn happy_path_walks_every_status() {
        let (mut round, player) = setup();
        let t0 = Utc::now();

        assert_eq!(round.status, RoundStatus::SelectingActor);
        round.select_actor(&player).unwrap();
        assert_eq!(round.status, RoundStatus::SelectingCategory);
        assert_eq!(round.actor_id, Some(player.id));

        round
            .bind_prompt(Uuid::new_v4(), Uuid::new_v4(), "deadbeef".to_string())
            .unwrap();
        assert_eq!(round.status, RoundStatus::ShowingQr);
        assert_eq!(round.token, "deadbeef");

        round.mark_actor_ready().unwrap();
        assert_eq!(round.status, RoundStatus::ActorReady);

        round.start_timer(t0).unwrap();
        assert_eq!(round.status, RoundStatus::Active);
        assert_eq!(round.started_at, Some(t0));

        let outcome = round
            .finish_guessed(t0 + Duration::seconds(20), &ScoringTable::default())
            .unwrap();
        assert_eq!(round.status, RoundStatus::Guessed);
        assert_eq!(outcome.points, 100);
        assert_eq!(outcome.time_taken, 20.0);
        assert_eq!(round.time_taken_seconds, Some(20.0));
        assert_eq!(round.points_awarded, 100);
    }

    #[test]
    fn actor_must_be_on_the_rounds_team() {
        let (mut round, _player) = setup();
        let mut outsider = Player::new(round.game_id, "Eve".to_string(), "tok2".to_string(), false);
        outsider.team_id = Some(Uuid::new_v4());

        let err = round.select_actor(&outsider).unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
        assert_eq!(round.status, RoundStatus::SelectingActor);

        // Unassigned players are rejected too
        let unassigned = Player::new(round.game_id, "Bob".to_string(), "tok3".to_string(), false);
        assert!(round.select_actor(&unassigned).is_err());
    }

    #[test]
    fn timer_can_start_straight_from_showing_qr() {
        let (mut round, player) = setup();
        round.select_actor(&player).unwrap();
        round
            .bind_prompt(Uuid::new_v4(), Uuid::new_v4(), "tok".to_string())
            .unwrap();

        // Skip the explicit ready signal
        round.start_timer(Utc::now()).unwrap();
        assert_eq!(round.status, RoundStatus::Active);
    }

    #[test]
    fn guarded_transitions_reject_wrong_status() {
        let (mut round, player) = setup();
        let now = Utc::now();

        assert!(round.mark_actor_ready().is_err());
        assert!(round.start_timer(now).is_err());
        assert!(round
            .finish_guessed(now, &ScoringTable::default())
            .is_err());
        assert!(round.finish_timeout(now).is_err());
        assert!(round
            .bind_prompt(Uuid::new_v4(), Uuid::new_v4(), "t".to_string())
            .is_err());

        // Status never moved
        assert_eq!(round.status, RoundStatus::SelectingActor);
        let _ = player;
    }

    #[test]
    fn second_guess_loses_the_race() {
        let (mut round, player) = setup();
        let t0 = Utc::now();
        to_active(&mut round, &player, t0);

        let table = ScoringTable::default();
        round.finish_guessed(t0 + Duration::seconds(10), &table).unwrap();
        let err = round
            .finish_guessed(t0 + Duration::seconds(11), &table)
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
        // First outcome stands
        assert_eq!(round.points_awarded, 100);
        assert_eq!(round.status, RoundStatus::Guessed);
    }

    #[test]
    fn terminal_rounds_reject_every_transition() {
        let (mut round, player) = setup();
        let t0 = Utc::now();
        to_active(&mut round, &player, t0);
        round.finish_timeout(t0 + Duration::seconds(241)).unwrap();

        let now = Utc::now();
        assert!(round.select_actor(&player).is_err());
        assert!(round.start_timer(now).is_err());
        assert!(round.finish_guessed(now, &ScoringTable::default()).is_err());
        assert!(round.finish_timeout(now).is_err());
        assert!(round.finish_skipped(now).is_err());
        assert_eq!(round.status, RoundStatus::Timeout);
    }

    #[test]
    fn skip_before_timer_records_no_elapsed() {
        let (mut round, player) = setup();
        round.select_actor(&player).unwrap();

        round.finish_skipped(Utc::now()).unwrap();
        assert_eq!(round.status, RoundStatus::Skipped);
        assert_eq!(round.points_awarded, 0);
        assert!(round.time_taken_seconds.is_none());
        assert!(round.ended_at.is_some());
    }

    #[test]
    fn skip_during_timer_records_elapsed() {
        let (mut round, player) = setup();
        let t0 = Utc::now();
        to_active(&mut round, &player, t0);

        round.finish_skipped(t0 + Duration::seconds(15)).unwrap();
        assert_eq!(round.status, RoundStatus::Skipped);
        assert_eq!(round.time_taken_seconds, Some(15.0));
        assert_eq!(round.points_awarded, 0);
    }

    #[test]
    fn timeout_records_elapsed_and_zero_points() {
        let (mut round, player) = setup();
        let t0 = Utc::now();
        to_active(&mut round, &player, t0);

        round.finish_timeout(t0 + Duration::seconds(240)).unwrap();
        assert_eq!(round.status, RoundStatus::Timeout);
        assert_eq!(round.time_taken_seconds, Some(240.0));
        assert_eq!(round.points_awarded, 0);
    }

    #[test]
    fn guess_applies_round_multiplier() {
        let (mut round, player) = setup();
        round
            .metadata
            .insert("multiplier".to_string(), serde_json::json!(2.0));
        let t0 = Utc::now();
        to_active(&mut round, &player, t0);

        let outcome = round
            .finish_guessed(t0 + Duration::seconds(45), &ScoringTable::default())
            .unwrap();
        assert_eq!(outcome.points, 150);
    }
}
