//! Decode sessions.
//!
//! A [`SessionController`] owns at most one live session at a time. Starting
//! a new session cancels the previous one before the new read loop begins,
//! so a superseded stream can never write into the state readers see.

mod controller;
mod state;

pub use controller::{ControllerConfig, SessionController, SessionHandle};
pub use state::{SessionState, SessionStats};
