//! Seams between the dispatcher and its collaborators.

pub mod channel;
pub mod outcome_log;

pub use channel::DeliveryChannel;
pub use outcome_log::OutcomeLog;
