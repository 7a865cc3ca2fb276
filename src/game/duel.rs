//! Turn-based duel state machine

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::constants::{FLEE_MIN_STRIKES, HEAL_AMOUNT, MAX_HP, STRIKE_DAMAGE};

/// Duel lifecycle; `Ended` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelPhase {
    Pending,
    Active,
    Ended,
}

/// Actions the turn-holder may take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelAction {
    Strike,
    Block,
    Heal,
    Flee,
}

impl FromStr for DuelAction {
    type Err = DuelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strike" => Ok(Self::Strike),
            "block" => Ok(Self::Block),
            "heal" => Ok(Self::Heal),
            "flee" => Ok(Self::Flee),
            other => Err(DuelError::InvalidAction(other.chars().take(32).collect())),
        }
    }
}

impl fmt::Display for DuelAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Strike => "strike",
            Self::Block => "block",
            Self::Heal => "heal",
            Self::Flee => "flee",
        };
        f.write_str(s)
    }
}

/// Why a duel reached `Ended`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DuelEnding {
    /// HP reached zero
    Knockout { winner: Uuid, loser: Uuid },
    /// Accepted flee, no winner
    Fled { by: Uuid },
    /// Pending invite withdrawn by leaving the engagement
    Cancelled,
    /// A participant disconnected
    Forfeit { by: Uuid },
}

impl DuelEnding {
    pub fn winner(&self) -> Option<Uuid> {
        match self {
            Self::Knockout { winner, .. } => Some(*winner),
            _ => None,
        }
    }
}

/// Rejected duel operations. The duel is never mutated when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DuelError {
    #[error("Duel not active")]
    NotActive,

    #[error("Duel is not awaiting acceptance")]
    NotPending,

    #[error("Only the invited player may accept")]
    NotInvitee,

    #[error("You are not in this duel")]
    NotParticipant,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Bad action: {0}")]
    InvalidAction(String),

    #[error("You cannot run yet (need {required} hits total, {strikes} so far)")]
    FleeTooEarly { strikes: u32, required: u32 },
}

/// One side of a duel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fighter {
    pub id: Uuid,
    pub hp: i32,
    pub blocking: bool,
    pub hits_dealt: u32,
}

impl Fighter {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            hp: MAX_HP,
            blocking: false,
            hits_dealt: 0,
        }
    }
}

/// Result of an accepted action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub actor: Uuid,
    pub action: DuelAction,
    /// Damage dealt by a strike
    pub damage: Option<i32>,
    /// Set when this action ended the duel
    pub ending: Option<DuelEnding>,
}

/// A duel between exactly two distinct players
#[derive(Debug, Clone)]
pub struct Duel {
    pub id: Uuid,
    fighters: [Fighter; 2],
    phase: DuelPhase,
    turn: Uuid,
    turn_no: u32,
    strikes: u32,
    ending: Option<DuelEnding>,
}

impl Duel {
    /// Create a pending duel; `inviter` and `invitee` must differ
    pub fn invite(id: Uuid, inviter: Uuid, invitee: Uuid) -> Self {
        debug_assert_ne!(inviter, invitee);
        Self {
            id,
            fighters: [Fighter::new(inviter), Fighter::new(invitee)],
            phase: DuelPhase::Pending,
            turn: inviter,
            turn_no: 0,
            strikes: 0,
            ending: None,
        }
    }

    pub fn phase(&self) -> DuelPhase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase != DuelPhase::Ended
    }

    pub fn inviter(&self) -> Uuid {
        self.fighters[0].id
    }

    pub fn invitee(&self) -> Uuid {
        self.fighters[1].id
    }

    pub fn participants(&self) -> [Uuid; 2] {
        [self.fighters[0].id, self.fighters[1].id]
    }

    pub fn turn(&self) -> Uuid {
        self.turn
    }

    pub fn turn_no(&self) -> u32 {
        self.turn_no
    }

    pub fn strikes(&self) -> u32 {
        self.strikes
    }

    pub fn ending(&self) -> Option<DuelEnding> {
        self.ending
    }

    pub fn involves(&self, player: Uuid) -> bool {
        self.fighters.iter().any(|f| f.id == player)
    }

    pub fn fighter(&self, player: Uuid) -> Option<&Fighter> {
        self.fighters.iter().find(|f| f.id == player)
    }

    pub fn opponent(&self, player: Uuid) -> Option<Uuid> {
        match self.index_of(player)? {
            0 => Some(self.fighters[1].id),
            _ => Some(self.fighters[0].id),
        }
    }

    pub fn hp_map(&self) -> HashMap<Uuid, i32> {
        self.fighters.iter().map(|f| (f.id, f.hp)).collect()
    }

    fn index_of(&self, player: Uuid) -> Option<usize> {
        self.fighters.iter().position(|f| f.id == player)
    }

    /// Accept a pending invite. The first turn-holder is a fair coin flip.
    pub fn accept<R: Rng>(&mut self, actor: Uuid, rng: &mut R) -> Result<Uuid, DuelError> {
        if self.phase != DuelPhase::Pending {
            return Err(DuelError::NotPending);
        }
        if actor != self.invitee() {
            return Err(DuelError::NotInvitee);
        }

        let first = self.fighters[rng.gen_range(0..2)].id;
        self.phase = DuelPhase::Active;
        self.turn = first;
        self.turn_no = 1;
        Ok(first)
    }

    /// Apply an action from `actor`
    pub fn act(&mut self, actor: Uuid, action: DuelAction) -> Result<ActionOutcome, DuelError> {
        if self.phase != DuelPhase::Active {
            return Err(DuelError::NotActive);
        }
        let me = self.index_of(actor).ok_or(DuelError::NotParticipant)?;
        if self.turn != actor {
            return Err(DuelError::NotYourTurn);
        }
        if action == DuelAction::Flee && self.strikes < FLEE_MIN_STRIKES {
            return Err(DuelError::FleeTooEarly {
                strikes: self.strikes,
                required: FLEE_MIN_STRIKES,
            });
        }

        let opp = 1 - me;
        let mut damage = None;

        match action {
            DuelAction::Strike => {
                let mut dmg = STRIKE_DAMAGE;
                if self.fighters[opp].blocking {
                    dmg = (dmg + 1) / 2;
                    self.fighters[opp].blocking = false;
                }
                self.fighters[opp].hp -= dmg;
                self.fighters[me].hits_dealt += 1;
                self.strikes += 1;
                damage = Some(dmg);
            }
            DuelAction::Block => {
                self.fighters[me].blocking = true;
            }
            DuelAction::Heal => {
                let healed = self.fighters[me].hp + HEAL_AMOUNT;
                self.fighters[me].hp = healed.clamp(0, MAX_HP);
            }
            DuelAction::Flee => {
                let ending = DuelEnding::Fled { by: actor };
                self.finish(ending);
                return Ok(ActionOutcome {
                    actor,
                    action,
                    damage: None,
                    ending: Some(ending),
                });
            }
        }

        let ending = self.knockout();
        match ending {
            Some(ending) => self.finish(ending),
            None => {
                self.turn = self.fighters[opp].id;
                self.turn_no += 1;
            }
        }

        Ok(ActionOutcome {
            actor,
            action,
            damage,
            ending,
        })
    }

    /// End the duel from outside the turn order (disconnect, cancel).
    /// Returns `None` if it had already ended.
    pub fn force_end(&mut self, ending: DuelEnding) -> Option<DuelEnding> {
        if self.phase == DuelPhase::Ended {
            return None;
        }
        self.finish(ending);
        Some(ending)
    }

    fn knockout(&self) -> Option<DuelEnding> {
        let [a, b] = self.fighters;
        if a.hp <= 0 {
            Some(DuelEnding::Knockout { winner: b.id, loser: a.id })
        } else if b.hp <= 0 {
            Some(DuelEnding::Knockout { winner: a.id, loser: b.id })
        } else {
            None
        }
    }

    fn finish(&mut self, ending: DuelEnding) {
        for f in &mut self.fighters {
            f.hp = f.hp.clamp(0, MAX_HP);
        }
        self.phase = DuelPhase::Ended;
        self.ending = Some(ending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn active_duel() -> (Duel, Uuid, Uuid) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut duel = Duel::invite(Uuid::new_v4(), a, b);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        duel.accept(b, &mut rng).unwrap();
        (duel, a, b)
    }

    fn set_turn(duel: &mut Duel, who: Uuid) {
        duel.turn = who;
    }

    #[test]
    fn only_invitee_may_accept() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut duel = Duel::invite(Uuid::new_v4(), a, b);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        assert_eq!(duel.accept(a, &mut rng), Err(DuelError::NotInvitee));
        assert_eq!(duel.phase(), DuelPhase::Pending);

        let first = duel.accept(b, &mut rng).unwrap();
        assert!(first == a || first == b);
        assert_eq!(duel.phase(), DuelPhase::Active);
        assert_eq!(duel.turn_no(), 1);
        assert_eq!(duel.accept(b, &mut rng), Err(DuelError::NotPending));
    }

    #[test]
    fn first_turn_covers_both_participants() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut firsts = std::collections::HashSet::new();
        for _ in 0..64 {
            let mut duel = Duel::invite(Uuid::new_v4(), a, b);
            firsts.insert(duel.accept(b, &mut rng).unwrap());
        }
        assert_eq!(firsts.len(), 2);
    }

    #[test]
    fn unblocked_strike_deals_base_damage() {
        let (mut duel, a, b) = active_duel();
        set_turn(&mut duel, a);

        let out = duel.act(a, DuelAction::Strike).unwrap();
        assert_eq!(out.damage, Some(STRIKE_DAMAGE));
        assert_eq!(duel.hp_map()[&b], MAX_HP - STRIKE_DAMAGE);
        assert_eq!(duel.strikes(), 1);
        assert_eq!(duel.turn(), b);
        assert_eq!(duel.turn_no(), 2);
    }

    #[test]
    fn blocked_strike_is_halved_rounding_up_and_clears_block() {
        let (mut duel, a, b) = active_duel();
        set_turn(&mut duel, b);

        duel.act(b, DuelAction::Block).unwrap();
        assert!(duel.fighter(b).unwrap().blocking);

        let out = duel.act(a, DuelAction::Strike).unwrap();
        assert_eq!(out.damage, Some((STRIKE_DAMAGE + 1) / 2));
        assert_eq!(out.damage, Some(9));
        assert!(!duel.fighter(b).unwrap().blocking);

        // Block only absorbs one strike
        duel.act(b, DuelAction::Heal).unwrap();
        let out = duel.act(a, DuelAction::Strike).unwrap();
        assert_eq!(out.damage, Some(STRIKE_DAMAGE));
    }

    #[test]
    fn heal_caps_at_max_hp() {
        let (mut duel, a, b) = active_duel();
        set_turn(&mut duel, a);

        duel.act(a, DuelAction::Heal).unwrap();
        assert_eq!(duel.hp_map()[&a], MAX_HP);

        duel.act(b, DuelAction::Strike).unwrap();
        duel.act(a, DuelAction::Heal).unwrap();
        assert_eq!(duel.hp_map()[&a], MAX_HP - STRIKE_DAMAGE + HEAL_AMOUNT);
    }

    #[test]
    fn out_of_turn_action_is_rejected_without_mutation() {
        let (mut duel, a, b) = active_duel();
        set_turn(&mut duel, a);
        let before = (duel.hp_map(), duel.turn(), duel.turn_no(), duel.strikes());

        assert_eq!(duel.act(b, DuelAction::Strike), Err(DuelError::NotYourTurn));
        assert_eq!(
            duel.act(Uuid::new_v4(), DuelAction::Strike),
            Err(DuelError::NotParticipant)
        );

        let after = (duel.hp_map(), duel.turn(), duel.turn_no(), duel.strikes());
        assert_eq!(before, after);
    }

    #[test]
    fn turn_alternates_strictly() {
        let (mut duel, a, b) = active_duel();
        set_turn(&mut duel, a);
        let mut expected = a;
        for n in 0..4 {
            let action = if n % 2 == 0 { DuelAction::Block } else { DuelAction::Heal };
            duel.act(expected, action).unwrap();
            expected = if expected == a { b } else { a };
            assert_eq!(duel.turn(), expected);
        }
        assert_eq!(duel.turn_no(), 5);
    }

    #[test]
    fn flee_requires_three_strikes() {
        let (mut duel, a, b) = active_duel();
        set_turn(&mut duel, a);

        duel.act(a, DuelAction::Strike).unwrap();
        duel.act(b, DuelAction::Strike).unwrap();
        assert_eq!(
            duel.act(a, DuelAction::Flee),
            Err(DuelError::FleeTooEarly { strikes: 2, required: 3 })
        );
        assert_eq!(duel.turn(), a);

        duel.act(a, DuelAction::Strike).unwrap();
        let hp_before = duel.hp_map();
        let out = duel.act(b, DuelAction::Flee).unwrap();
        assert_eq!(out.ending, Some(DuelEnding::Fled { by: b }));
        assert_eq!(out.ending.and_then(|e| e.winner()), None);
        assert_eq!(duel.phase(), DuelPhase::Ended);
        assert_eq!(duel.hp_map(), hp_before);
    }

    #[test]
    fn knockout_ends_with_other_participant_as_winner() {
        let (mut duel, a, b) = active_duel();
        set_turn(&mut duel, a);
        duel.fighters[1].hp = 18;

        let out = duel.act(a, DuelAction::Strike).unwrap();
        assert_eq!(out.ending, Some(DuelEnding::Knockout { winner: a, loser: b }));
        assert_eq!(duel.hp_map()[&b], 0);
        assert_eq!(duel.phase(), DuelPhase::Ended);
        assert_eq!(duel.act(b, DuelAction::Heal), Err(DuelError::NotActive));
    }

    #[test]
    fn overkill_is_clamped_to_zero() {
        let (mut duel, a, b) = active_duel();
        set_turn(&mut duel, a);
        duel.fighters[1].hp = 5;

        duel.act(a, DuelAction::Strike).unwrap();
        let hp = duel.hp_map();
        assert_eq!(hp[&b], 0);
        assert!(hp.values().all(|h| (0..=MAX_HP).contains(h)));
    }

    #[test]
    fn invalid_action_names_are_rejected() {
        assert_eq!("strike".parse::<DuelAction>(), Ok(DuelAction::Strike));
        assert!(matches!(
            "dance".parse::<DuelAction>(),
            Err(DuelError::InvalidAction(ref s)) if s == "dance"
        ));
    }

    #[test]
    fn force_end_is_idempotent() {
        let (mut duel, a, _) = active_duel();
        assert!(duel.force_end(DuelEnding::Forfeit { by: a }).is_some());
        assert!(duel.force_end(DuelEnding::Cancelled).is_none());
        assert_eq!(duel.ending(), Some(DuelEnding::Forfeit { by: a }));
    }
}
