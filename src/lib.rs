//! Lumio: a shot and reference-image organizer.
//!
//! Shots are grouped into projects, adjusted with brightness, saturation
//! and vignette sliders, and optionally edited by a generative image
//! service. Everything is persisted in a quota-limited key-value store.

pub mod catalog;
pub mod config;
pub mod http;
pub mod render;
pub mod state;
pub mod upstream;
