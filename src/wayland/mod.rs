//! Protocol-related utilities
//!
//! This module contains the handlers needed to manage the fundamental `wl_compositor`
//! surface-compositing protocol and the `xdg_shell` windowing protocol built on top of it.
//!
//! ## General structure
//!
//! Both modules work in the same way:
//!
//! - A module-specific `*State` struct takes the wayland display as argument and inserts one or
//!   more globals into it through its constructor.
//! - The module-`State` is stored inside your global compositor state (the same type you
//!   parametrized [`wayland_server::Display`] over).
//! - You implement a module-specific `*Handler` trait for your compositor state. This
//!   implementation is called when wayland events require custom handling.
//! - You call the matching `delegate_*!` macro on your state to implement the required
//!   `wayland_server` dispatch traits.
//!
//! The [`compositor`] module provides the necessary logic to handle the fundamental component by
//! which clients build their windows: surfaces. The [`shell`] module, and in particular
//! [`shell::xdg`], contains the logic allowing clients to use their surface to build concrete
//! windows and popups.

pub mod compositor;
pub mod shell;

pub use crate::utils::{Serial, SerialCounter, SERIAL_COUNTER};
