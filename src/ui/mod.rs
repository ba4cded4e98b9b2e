//! Terminal presentation layer.

pub mod controls;

pub use controls::{PlayerCommand, PlayerTui};
