//! Game state registry: sole owner of player and duel records
//!
//! Player <-> duel and player <-> player links are stored as ids and resolved
//! through the registry on every use. Lookups of ids that have since been
//! removed return `None`; callers treat that as a no-op.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::duel::{Duel, DuelEnding};
use super::player::{MovementIntent, Player};

/// Unordered pair key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey(Uuid, Uuid);

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

/// Everything the world needs to announce after a player is removed
#[derive(Debug)]
pub struct Departure {
    pub player: Player,
    /// Engagement partner that was released
    pub released_partner: Option<Uuid>,
    /// Duel force-ended by the departure
    pub ended_duel: Option<Duel>,
}

/// Owner of all authoritative world records
#[derive(Debug, Default)]
pub struct GameRegistry {
    players: HashMap<Uuid, Player>,
    duels: HashMap<Uuid, Duel>,
    names: HashSet<String>,
    /// Released pairs that must separate before they can engage again
    release_grace: HashSet<PairKey>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player(&self, id: &Uuid) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &Uuid) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn duel(&self, id: &Uuid) -> Option<&Duel> {
        self.duels.get(id)
    }

    pub fn duel_mut(&mut self, id: &Uuid) -> Option<&mut Duel> {
        self.duels.get_mut(id)
    }

    /// Pending or active duels
    pub fn live_duel_count(&self) -> usize {
        self.duels.values().filter(|d| d.is_live()).count()
    }

    pub fn name_taken(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Insert a freshly joined player. Returns false if the id or name is taken.
    pub fn add_player(&mut self, player: Player) -> bool {
        if self.players.contains_key(&player.id) || self.names.contains(&player.name) {
            return false;
        }
        self.names.insert(player.name.clone());
        self.players.insert(player.id, player);
        true
    }

    /// Replace the movement intent of a free player. Locked players keep none.
    pub fn set_intent(&mut self, id: &Uuid, intent: Option<MovementIntent>, seq: Option<u32>) {
        if let Some(p) = self.players.get_mut(id) {
            p.ack_seq(seq);
            if p.is_free() {
                p.intent = intent;
            }
        }
    }

    /// Mutually engage two players, stopping both
    pub fn engage(&mut self, a: Uuid, b: Uuid) {
        for (me, other) in [(a, b), (b, a)] {
            if let Some(p) = self.players.get_mut(&me) {
                p.engaged_with = Some(other);
                p.intent = None;
            }
        }
    }

    /// Clear the engagement of `id` and its partner. Returns the partner.
    pub fn release_engagement(&mut self, id: &Uuid) -> Option<Uuid> {
        let partner = self.players.get_mut(id)?.engaged_with.take()?;
        if let Some(other) = self.players.get_mut(&partner) {
            if other.engaged_with == Some(*id) {
                other.engaged_with = None;
            }
        }
        self.release_grace.insert(PairKey::new(*id, partner));
        Some(partner)
    }

    pub fn in_release_grace(&self, a: Uuid, b: Uuid) -> bool {
        self.release_grace.contains(&PairKey::new(a, b))
    }

    pub fn clear_release_grace(&mut self, a: Uuid, b: Uuid) {
        self.release_grace.remove(&PairKey::new(a, b));
    }

    /// Register a pending duel and point both participants at it
    pub fn insert_duel(&mut self, duel: Duel) {
        for id in duel.participants() {
            if let Some(p) = self.players.get_mut(&id) {
                p.duel_id = Some(duel.id);
                p.intent = None;
            }
        }
        self.duels.insert(duel.id, duel);
    }

    /// Drop an ended duel, clearing participant links and their engagement.
    /// Returns the duel record if it existed.
    pub fn retire_duel(&mut self, duel_id: &Uuid) -> Option<Duel> {
        let duel = self.duels.remove(duel_id)?;
        let [a, b] = duel.participants();
        for id in [a, b] {
            if let Some(p) = self.players.get_mut(&id) {
                if p.duel_id == Some(duel.id) {
                    p.duel_id = None;
                }
            }
        }
        if self.release_engagement(&a).is_none() {
            self.release_engagement(&b);
        }
        self.release_grace.insert(PairKey::new(a, b));
        Some(duel)
    }

    /// Remove a player, releasing their engagement and force-ending any duel
    pub fn remove_player(&mut self, id: &Uuid) -> Option<Departure> {
        let duel_id = self.players.get(id)?.duel_id;

        let ended_duel = duel_id.and_then(|duel_id| {
            if let Some(duel) = self.duels.get_mut(&duel_id) {
                duel.force_end(DuelEnding::Forfeit { by: *id });
            }
            self.retire_duel(&duel_id)
        });

        let released_partner = match &ended_duel {
            Some(duel) => duel.opponent(*id),
            None => self.release_engagement(id),
        };

        let player = self.players.remove(id)?;
        self.names.remove(&player.name);
        self.release_grace.retain(|k| k.0 != *id && k.1 != *id);

        Some(Departure {
            player,
            released_partner,
            ended_duel,
        })
    }
}
