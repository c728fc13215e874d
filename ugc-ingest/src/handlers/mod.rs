//! HTTP handlers, grouped by surface.

pub mod events;
pub mod films;
pub mod health;
pub mod read;
