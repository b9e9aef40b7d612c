//! tutorbot: a classroom chat-bot runtime.
//!
//! The [`engine`] owns the chat connection and runs attendance roll-calls,
//! timed surveys and tutor feedback forms on one task. Other threads drive it
//! through the [`controller`], which hands work to the engine loop over the
//! [`bridge`].

pub mod actor;
pub mod attendance;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod flush;
pub mod store;
pub mod survey;
pub mod sync;

pub mod build_info {
    /// Crate version, as reported by `tutorbot --version`.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
