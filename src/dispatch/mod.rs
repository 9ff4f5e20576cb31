//! Incoming message handling.
//!
//! Parses commands, validates preconditions against the session store and
//! turns accepted requests into jobs on the queue.

mod command;
mod dispatcher;
pub mod messages;
pub mod naming;

pub use command::{Command, DEFAULT_DPI, MAX_DPI, MIN_DPI, parse_dpi, parse_rotation};
pub use dispatcher::{DispatchSettings, Dispatcher};
