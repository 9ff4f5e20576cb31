//! pdfdesk: a chat-driven PDF utility bot.
//!
//! Users upload PDFs and issue slash commands. Command handlers validate the
//! request against per-user session state and enqueue a job; a single worker
//! runs jobs one at a time, so at most one PDF transformation is in flight.

pub mod app;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pdf;
pub mod progress;
pub mod queue;
pub mod session;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
