// Phase engine: role assignment, night and day resolution, win evaluation.
//
// Everything here is a plain function over a `Roster`. `Session` calls these
// while holding its write lock; tests call them directly on hand-built
// rosters, which is how scenarios that no legal lobby can reach (four living
// Mafia, say) get covered.
//
// Vote tallies live in a `std::collections::HashMap` with the default
// randomized hasher. The leading target is the first one met with a strictly
// higher count than everything before it, so when two targets tie the
// winner depends on map iteration order and is deliberately left unspecified.
// Nothing downstream may rely on a particular tie outcome.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;
use vendetta_protocol::PlayerId;

use crate::player::{Role, Roster};

/// Roster size from which one player is dealt the Detective role.
pub const DETECTIVE_MIN_PLAYERS: usize = 5;
/// Roster size from which one player is dealt the Medic role.
pub const MEDIC_MIN_PLAYERS: usize = 7;

/// Result of evaluating the win condition over the living roster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ongoing,
    /// Living Mafia reached parity with (or outnumber) everyone else.
    MafiaWin,
    /// No Mafia left alive.
    VillagerWin,
}

impl Outcome {
    pub fn is_over(self) -> bool {
        self != Outcome::Ongoing
    }

    /// The winning faction, named by its representative role.
    pub fn winner(self) -> Option<Role> {
        match self {
            Outcome::Ongoing => None,
            Outcome::MafiaWin => Some(Role::Mafia),
            Outcome::VillagerWin => Some(Role::Villager),
        }
    }
}

/// Number of Mafia dealt to a roster of `player_count`.
pub fn mafia_seats(configured: usize, player_count: usize) -> usize {
    configured.min(player_count / 3)
}

/// Role for the `seat`-th player of the shuffled order.
fn role_for_seat(seat: usize, player_count: usize, mafia: usize) -> Role {
    let detective = player_count >= DETECTIVE_MIN_PLAYERS;
    let medic = player_count >= MEDIC_MIN_PLAYERS;
    if seat < mafia {
        Role::Mafia
    } else if detective && seat == mafia {
        Role::Detective
    } else if medic && seat == mafia + 1 {
        Role::Medic
    } else {
        Role::Villager
    }
}

/// Shuffle the roster with `rng` and deal roles down the shuffled order:
/// Mafia first, then Detective and Medic when the roster is large enough,
/// Villager for the rest. Returns the deal in shuffled order.
pub fn assign_roles<R: Rng + ?Sized>(
    roster: &mut Roster,
    configured_mafia: usize,
    rng: &mut R,
) -> Vec<(PlayerId, Role)> {
    let mut order: Vec<PlayerId> = roster.keys().cloned().collect();
    order.shuffle(rng);

    let player_count = order.len();
    let mafia = mafia_seats(configured_mafia, player_count);
    let mut deal = Vec::with_capacity(player_count);
    for (seat, id) in order.into_iter().enumerate() {
        let role = role_for_seat(seat, player_count, mafia);
        if let Some(player) = roster.get_mut(&id) {
            player.role = Some(role);
        }
        deal.push((id, role));
    }
    deal
}

/// Living Mafia that have a recorded night target, and living Mafia overall.
pub fn mafia_votes(roster: &Roster) -> (usize, usize) {
    roster
        .values()
        .filter(|p| p.is_alive && p.is_mafia())
        .fold((0, 0), |(voted, living), p| {
            (voted + usize::from(p.voted_for.is_some()), living + 1)
        })
}

/// Votes a night target needs: half the living Mafia, rounded up.
pub fn night_threshold(living_mafia: usize) -> usize {
    living_mafia.div_ceil(2)
}

/// Whether enough living Mafia have chosen a target to end the night early.
pub fn mafia_consensus(roster: &Roster) -> bool {
    let (voted, living) = mafia_votes(roster);
    voted >= night_threshold(living)
}

/// Resolve the night: the Mafia's leading target dies if it collected at
/// least `night_threshold` votes. All votes are cleared either way.
pub fn resolve_night(roster: &mut Roster) -> Option<PlayerId> {
    let (_, living_mafia) = mafia_votes(roster);
    let tally = tally_votes(roster, |p| p.is_mafia());
    let victim = leading_target(&tally)
        .filter(|(_, votes)| *votes >= night_threshold(living_mafia))
        .map(|(id, _)| id);
    debug!(?tally, living_mafia, ?victim, "night tally");

    let victim = victim.filter(|id| kill(roster, id));
    clear_votes(roster);
    victim
}

/// Resolve the day vote: the leading target among all living voters is
/// eliminated. All votes are cleared either way.
pub fn resolve_vote(roster: &mut Roster) -> Option<PlayerId> {
    let tally = tally_votes(roster, |_| true);
    let eliminated = leading_target(&tally).map(|(id, _)| id);
    debug!(?tally, ?eliminated, "day tally");

    let eliminated = eliminated.filter(|id| kill(roster, id));
    clear_votes(roster);
    eliminated
}

/// Evaluate the win condition over living players. Ties go to the Mafia.
pub fn win_condition(roster: &Roster) -> Outcome {
    let (mafia, others) = roster
        .values()
        .filter(|p| p.is_alive)
        .fold((0usize, 0usize), |(m, o), p| {
            if p.is_mafia() { (m + 1, o) } else { (m, o + 1) }
        });
    if mafia == 0 {
        Outcome::VillagerWin
    } else if mafia >= others {
        Outcome::MafiaWin
    } else {
        Outcome::Ongoing
    }
}

pub fn clear_votes(roster: &mut Roster) {
    for player in roster.values_mut() {
        player.voted_for = None;
    }
}

/// Count votes cast by living players accepted by `eligible`.
fn tally_votes(
    roster: &Roster,
    eligible: impl Fn(&crate::player::Player) -> bool,
) -> HashMap<PlayerId, usize> {
    let mut tally = HashMap::new();
    for player in roster.values().filter(|p| p.is_alive && eligible(p)) {
        if let Some(target) = &player.voted_for {
            *tally.entry(target.clone()).or_insert(0) += 1;
        }
    }
    tally
}

fn leading_target(tally: &HashMap<PlayerId, usize>) -> Option<(PlayerId, usize)> {
    let mut best: Option<(&PlayerId, usize)> = None;
    for (id, &votes) in tally {
        if best.is_none_or(|(_, most)| votes > most) {
            best = Some((id, votes));
        }
    }
    best.map(|(id, votes)| (id.clone(), votes))
}

/// Mark `id` dead. Returns false if it is no longer on the roster.
fn kill(roster: &mut Roster, id: &PlayerId) -> bool {
    match roster.get_mut(id) {
        Some(player) => {
            player.is_alive = false;
            true
        }
        None => false,
    }
}
