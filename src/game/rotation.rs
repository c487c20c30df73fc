//! Turn rotation - strict alternation between the two teams

use super::entities::Team;

/// Order of the team that plays round 1
pub const FIRST_TEAM_ORDER: u8 = 1;

/// The order that plays after `order`, alternating 1 and 2 regardless of
/// round outcome
pub fn next_order(order: u8) -> u8 {
    if order == 1 {
        2
    } else {
        1
    }
}

/// Find the team holding a given turn order
pub fn team_with_order(teams: &[Team], order: u8) -> Option<&Team> {
    teams.iter().find(|t| t.order == order)
}
