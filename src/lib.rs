#![warn(missing_debug_implementations, rust_2018_idioms)]

//! A server-side implementation of the `xdg-shell` windowing protocol.
//!
//! This crate provides the building blocks needed to let wayland clients turn their
//! surfaces into windows and popups: role assignment, the toplevel/popup configure
//! life cycle, positioner geometry calculation, popup grabs and their input topology,
//! and client liveness tracking through the wayland ping/pong mechanism.
//!
//! ## Structure of the crate
//!
//! [`utils`] contains small generic helpers (geometry types, serials, user data
//! storage) that are shared by the rest of the crate. [`wayland::compositor`]
//! implements the `wl_compositor`/`wl_subcompositor`/`wl_surface` globals that every
//! shell surface is built on top of. [`wayland::shell::xdg`] is the main module of
//! this crate: it implements `xdg_wm_base` and the surface roles it exposes.
//!
//! ## General principles
//!
//! Like the compositor crates this one is modeled after, state is centralized in a
//! single `D` type owned by the caller and threaded through [`calloop`] as the shared
//! data of the event loop. Protocol handling is implemented through the
//! `wayland-server` `Dispatch`/`GlobalDispatch` traits, delegated to this crate's
//! state types via the `delegate_*!` macros, and surfaced to the caller through small
//! handler traits (such as [`wayland::shell::xdg::ShellHandler`]) that the caller
//! implements on `D`.

pub mod utils;
pub mod wayland;

pub mod reexports;
