//! Handler utilities for the shell protocols
//!
//! A shell represents the logic associated with turning a plain surface into something a user
//! can interact with as a window: giving it a role, negotiating its size through a configure/ack
//! cycle, and arranging auxiliary surfaces such as popups relative to it.
//!
//! This crate currently provides one shell:
//!
//! - The [`xdg`] module implements the `xdg_shell` protocol, the current standard used by desktop
//!   applications to create toplevel windows and popups.

use thiserror::Error;

use crate::utils::Serial;

pub mod xdg;

/// Possible errors returned when pinging a shell client.
#[derive(Debug, Error)]
pub enum PingError {
    /// The operation failed because the underlying resource has been destroyed.
    #[error("the ping failed because the client's shell resource has been destroyed")]
    DeadResource,
    /// There is already a ping pending for this client.
    #[error("there is already a ping pending: `{0:?}`")]
    PingAlreadyPending(Serial),
}
