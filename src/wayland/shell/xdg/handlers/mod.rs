//! Wire-level glue: one module per `xdg_shell` interface, each implementing the
//! `wayland_server` [`DelegateDispatch`](wayland_server::DelegateDispatch)/
//! [`DelegateGlobalDispatch`](wayland_server::DelegateGlobalDispatch) traits on
//! [`ShellState`](super::ShellState) and translating requests into calls on the pure state
//! machine in the parent module and the [`ShellHandler`](super::ShellHandler) the compositor
//! implements.

mod popup;
mod positioner;
mod surface;
mod toplevel;
mod wm_base;

pub use popup::XdgPopupUserData;
pub use positioner::XdgPositionerUserData;
pub use surface::XdgSurfaceUserData;
pub use toplevel::XdgToplevelUserData;
