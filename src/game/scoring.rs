//! Scoring - time-tiered points for correct guesses

/// One scoring tier: guesses at or under `max_seconds` earn `points`
#[derive(Debug, Clone, Copy)]
pub struct ScoreTier {
    pub max_seconds: f64,
    pub points: i32,
}

/// Time-tiered scoring table. Faster guesses earn more; a guess slower than
/// every tier earns the timeout score.
#[derive(Debug, Clone)]
pub struct ScoringTable {
    /// Tiers ordered by ascending max_seconds
    pub tiers: Vec<ScoreTier>,
    /// Points for a timeout or an out-of-tier guess
    pub timeout_points: i32,
}

impl Default for ScoringTable {
    fn default() -> Self {
        Self {
            tiers: vec![
                ScoreTier { max_seconds: 30.0, points: 100 },
                ScoreTier { max_seconds: 60.0, points: 75 },
                ScoreTier { max_seconds: 90.0, points: 50 },
                ScoreTier { max_seconds: 120.0, points: 30 },
                ScoreTier { max_seconds: 180.0, points: 15 },
                ScoreTier { max_seconds: 240.0, points: 10 },
            ],
            timeout_points: 0,
        }
    }
}

impl ScoringTable {
    /// Points for a guess `elapsed` seconds after the timer started,
    /// scaled by the round's multiplier and floored to a whole number.
    /// A missing or negative elapsed is treated as no score.
    pub fn points_for(&self, elapsed: Option<f64>, multiplier: f64) -> i32 {
        let Some(elapsed) = elapsed else {
            return self.timeout_points;
        };
        if elapsed < 0.0 {
            return self.timeout_points;
        }

        for tier in &self.tiers {
            if elapsed <= tier.max_seconds {
                return (tier.points as f64 * multiplier).floor() as i32;
            }
        }

        self.timeout_points
    }
}
