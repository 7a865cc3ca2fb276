//! Validation errors surfaced to the originating connection

use crate::auth::AuthError;

use super::duel::DuelError;

/// A rejected command. Never mutates world state.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Already joined")]
    AlreadyJoined,

    #[error("Name in use")]
    NameInUse,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("No such player")]
    NoSuchPlayer,

    #[error("No such duel")]
    NoSuchDuel,

    #[error("You cannot duel yourself")]
    SelfTarget,

    #[error("You must be engaged with that player to challenge them")]
    NotEngaged,

    #[error("Already in a duel")]
    AlreadyInDuel,

    #[error("That player is already in a duel")]
    TargetBusy,

    #[error("Cannot leave while the duel is in progress")]
    DuelInProgress,

    #[error(transparent)]
    Duel(#[from] DuelError),
}

impl CommandError {
    /// Stable machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyJoined => "already_joined",
            Self::NameInUse => "name_in_use",
            Self::Auth(_) => "unauthorized",
            Self::NoSuchPlayer => "no_such_player",
            Self::NoSuchDuel => "no_such_duel",
            Self::SelfTarget => "self_target",
            Self::NotEngaged => "not_engaged",
            Self::AlreadyInDuel => "already_in_duel",
            Self::TargetBusy => "target_busy",
            Self::DuelInProgress => "duel_in_progress",
            Self::Duel(e) => match e {
                DuelError::NotActive => "duel_not_active",
                DuelError::NotPending => "duel_not_pending",
                DuelError::NotInvitee => "not_invitee",
                DuelError::NotParticipant => "not_participant",
                DuelError::NotYourTurn => "not_your_turn",
                DuelError::InvalidAction(_) => "invalid_action",
                DuelError::FleeTooEarly { .. } => "flee_too_early",
            },
        }
    }
}
