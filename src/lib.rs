//! # Open Voice
//!
//! Discord text-to-speech relay backed by the ElevenLabs API.
//!
//! Users send text and receive synthesized audio. Around the synthesis call
//! the crate layers per-user voice preferences, usage counters and
//! sliding-window rate limiting, persisted in Redis when available and kept
//! in process memory otherwise.
//!
//! ## Modules
//!
//! - [`store`]: optional key-value backing store (Redis or embedded)
//! - [`rate_limit`], [`settings`], [`usage`], [`voices`]: components on top of it
//! - [`synthesis`]: resilient speech synthesis client
//! - [`context`]: explicit application context owning all of the above
//! - [`bot`]: Discord event handler

pub mod bot;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod rate_limit;
pub mod settings;
pub mod store;
pub mod synthesis;
pub mod ui;
pub mod usage;
pub mod voices;
