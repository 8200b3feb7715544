//! Negotiation: the offer/answer state machine and candidate buffering

pub mod machine;

pub use machine::{Negotiator, NegotiationState, PendingCandidateQueue, SessionRole};
