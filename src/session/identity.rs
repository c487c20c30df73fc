//! Session identity - reconciling device tokens to stable players
//!
//! A device keeps one opaque session token per game. Joining again with the
//! same token must land on the same Player (rename allowed), never create a
//! duplicate. Players the host adds by name have no device, so they get a
//! synthetic token no real device could present.

use uuid::Uuid;

use crate::game::entities::Player;
use crate::game::GameError;
use crate::store::games::GameRecord;

/// Fresh token for a device that joined without one. Returned to the caller
/// so the device can store it for reconnects.
pub fn device_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Token for a host who created a game without supplying one
pub fn host_token() -> String {
    format!("host_{}", &Uuid::new_v4().simple().to_string()[..16])
}

/// Synthetic token for a host-added player. Unguessable and never handed to
/// a device, so nobody can reconnect as them.
pub fn host_added_token() -> String {
    format!("host_added_{}", &Uuid::new_v4().simple().to_string()[..12])
}

/// Per-round secret gating the actor-only prompt view
pub fn round_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Outcome of reconciling a join against the game's roster
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub player_id: Uuid,
    pub team_id: Option<Uuid>,
    /// True when an existing player was reused instead of created
    pub rejoined: bool,
}

/// Map (game, session token) to a stable player. An existing holder of the
/// token is renamed and reused; otherwise a new unassigned player joins.
pub fn reconcile_join(
    record: &mut GameRecord,
    player_name: &str,
    session_token: &str,
) -> Result<Reconciled, GameError> {
    if let Some(existing) = record.player_by_token_mut(session_token) {
        existing.name = player_name.to_string();
        return Ok(Reconciled {
            player_id: existing.id,
            team_id: existing.team_id,
            rejoined: true,
        });
    }

    let player = Player::new(
        record.game.id,
        player_name.to_string(),
        session_token.to_string(),
        false,
    );
    let player_id = player.id;
    record.add_player(player)?;

    Ok(Reconciled {
        player_id,
        team_id: None,
        rejoined: false,
    })
}
