//! # tally-core
//!
//! Passive records for the time tracker: [`Activity`] and [`Project`],
//! plus the drafts used to insert them and RFC3339 timestamp helpers.

pub mod activity;
pub mod project;
pub mod timestamp;

pub use activity::{Activity, NewActivity};
pub use project::{NewProject, Project};
