//! Quota-driven prize dispenser for multi-reel machines.
//!
//! Given reel layouts and prize definitions with daily caps, decides per
//! spin which stop positions to show so the visible result awards an
//! eligible prize while its quota lasts, and degrades to a fallback or
//! losing result otherwise.

pub mod clock;
pub mod config;
pub mod dispenser;
pub mod error;
pub mod evaluate;
pub mod event;
pub mod persist;
pub mod planner;
pub mod quota;
pub mod reel_index;
pub mod rng;
pub mod scheduler;
pub mod store;
pub mod synth;
pub mod types;
