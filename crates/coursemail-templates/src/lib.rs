//! # CourseMail Templates
//!
//! - [`render`] — all-or-nothing `{placeholder}` substitution
//! - [`catalog`] — template kinds, built-in texts, override lookup

pub mod catalog;
pub mod render;

pub use catalog::{TemplateCatalog, TemplateKind, TemplateOverrides};
pub use render::{placeholders, render, required_variables, Variables};
