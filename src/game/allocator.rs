//! Prompt allocation - random pick avoiding repeats within a game

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

/// Pick a prompt uniformly at random from `candidates`, preferring ones not
/// yet used in this game. When every candidate has been used the pool falls
/// back to the full candidate list so the game can always progress.
/// Returns None only when `candidates` is empty.
pub fn pick_prompt<R: Rng + ?Sized>(
    rng: &mut R,
    candidates: &[Uuid],
    used: &HashSet<Uuid>,
) -> Option<Uuid> {
    let fresh: Vec<Uuid> = candidates
        .iter()
        .copied()
        .filter(|id| !used.contains(id))
        .collect();

    if let Some(id) = fresh.choose(rng) {
        return Some(*id);
    }

    candidates.choose(rng).copied()
}
