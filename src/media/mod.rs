//! The audio source: decoded track plus the element that plays it.

pub mod element;
pub mod track;

pub use element::{AudioElement, MediaEvent, Playhead};
pub use track::Track;
