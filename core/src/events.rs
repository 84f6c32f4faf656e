//! State-transition events published by `SocialClient`.
//!
//! Every tracked call moves `InFlight -> Succeeded | Failed` exactly once.
//! UI code subscribes and applies local updates (append a comment, remove a
//! deleted post) from the outcome instead of re-fetching whole lists.

use crate::api::Call;
use crate::types::{Comment, Post, Profile};

/// Events buffered per subscriber before the slowest one starts lagging.
pub const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientEvent {
    pub call: Call,
    pub state: CallState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallState {
    InFlight,
    Succeeded(Outcome),
    Failed(String),
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallState::InFlight)
    }
}

/// What a successful call changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    SessionStarted { username: String },
    SessionEnded,
    Registered(Profile),
    PostCreated(Post),
    PostUpdated(Post),
    PostDeleted { id: u64 },
    CommentAdded { post_id: u64, comment: Comment },
    CommentDeleted { post_id: u64, comment_id: u64 },
}
