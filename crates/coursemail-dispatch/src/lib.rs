//! # CourseMail Dispatch
//!
//! Sequential bulk sender. For every recipient: classify, build variables,
//! render, deliver to each address with retry, record outcomes, then pace.
//!
//! ```text
//! recipients ──► classify ──► variables ──► render ──► send (retry/backoff)
//!                                                         │
//!                         Pacer (address gap, pacing, batch pause)
//!                                                         │
//!                                                   OutcomeLog
//! ```
//!
//! Delays go through the [`Pacer`] trait so tests and alternative throttles
//! never touch the dispatch loop.

pub mod dispatch;
pub mod pacing;
pub mod retry;
pub mod variables;

pub use dispatch::{
    preview, unresolved_variables, DispatchRequest, DispatchSettings, Dispatcher, PreviewItem,
    RecipientReport, RunMode, StopSignal,
};
pub use pacing::{Pacer, Pause, SleepPacer};
pub use retry::{retry_with_backoff, RetryPolicy, RetryResult};
pub use variables::{numbered_list, recipient_variables};
