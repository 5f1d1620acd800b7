//! # CourseMail Channels
//! Delivery channel implementations.

pub mod email;

pub use email::SmtpChannel;
