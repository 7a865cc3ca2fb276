//! Inbound frame gate: size ceiling, per-connection rate limit, envelope decode

use governor::clock::{Clock, DefaultClock};

use crate::game::constants::{MAX_MSG_BYTES, MAX_MSG_RATE};
use crate::util::rate_limit::MessageLimiter;
use crate::ws::protocol::ClientMsg;

/// Why a frame was dropped without effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    RateLimited,
    /// Binary frames carry no operations
    Binary,
    /// Not JSON, unknown op, or payload of the wrong shape
    Malformed,
}

/// What to do with one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept(ClientMsg),
    Drop(DropReason),
    /// Frame exceeded the byte ceiling; terminate the connection
    Close,
}

/// Per-connection ingress state
pub struct Ingress<C: Clock = DefaultClock> {
    limiter: MessageLimiter<C>,
    max_bytes: usize,
}

impl Ingress<DefaultClock> {
    pub fn new() -> Self {
        Self {
            limiter: MessageLimiter::new(MAX_MSG_RATE),
            max_bytes: MAX_MSG_BYTES,
        }
    }
}

impl Default for Ingress<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Ingress<C> {
    pub fn with_limiter(limiter: MessageLimiter<C>, max_bytes: usize) -> Self {
        Self { limiter, max_bytes }
    }

    /// Classify a frame. Oversize is checked before spending a token.
    pub fn inspect(&self, frame: &str) -> Verdict {
        if frame.len() > self.max_bytes {
            return Verdict::Close;
        }
        if !self.limiter.try_acquire() {
            return Verdict::Drop(DropReason::RateLimited);
        }
        match serde_json::from_str::<ClientMsg>(frame) {
            Ok(msg) => Verdict::Accept(msg),
            Err(_) => Verdict::Drop(DropReason::Malformed),
        }
    }

    /// Binary frames are held to the same ceiling and spend a token, but are
    /// never decoded.
    pub fn inspect_binary(&self, len: usize) -> Verdict {
        if len > self.max_bytes {
            return Verdict::Close;
        }
        if !self.limiter.try_acquire() {
            return Verdict::Drop(DropReason::RateLimited);
        }
        Verdict::Drop(DropReason::Binary)
    }
}
