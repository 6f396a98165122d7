use std::sync::Mutex;

use tracing::warn;
use wayland_protocols::xdg::shell::server::xdg_toplevel::{self, XdgToplevel};
use wayland_server::{
    backend::{ClientId, ObjectId},
    protocol::wl_surface::WlSurface,
    DataInit, DelegateDispatch, DestructionNotify, Dispatch, DisplayHandle, Resource, WEnum,
};

use crate::utils::alive_tracker::AliveTracker;
use crate::utils::Serial;
use crate::wayland::compositor;
use crate::wayland::shell::xdg::{PopupGrabSeat, ShellClient, ShellHandler, ShellState, SurfaceState, ToplevelSurface};

/// User data for `xdg_toplevel`.
#[derive(Debug)]
pub struct XdgToplevelUserData {
    pub(crate) wl_surface: WlSurface,
    pub(crate) alive_tracker: AliveTracker,
}

impl DestructionNotify for XdgToplevelUserData {
    fn object_destroyed(&self, _client_id: ClientId, _object_id: ObjectId) {
        self.alive_tracker.destroy_notify();
    }
}

fn make_toplevel_handle(wl_surface: &WlSurface, xdg_toplevel: &XdgToplevel) -> ToplevelSurface {
    let xdg_surface = compositor::with_states(wl_surface, |states| {
        states
            .data_map
            .get::<Mutex<SurfaceState>>()
            .unwrap()
            .lock()
            .unwrap()
            .xdg_surface
            .clone()
    });
    ToplevelSurface::from_parts(xdg_surface, xdg_toplevel.clone(), wl_surface.clone())
}

fn client_of(wl_surface: &WlSurface) -> ShellClient {
    compositor::with_states(wl_surface, |states| {
        states
            .data_map
            .get::<Mutex<SurfaceState>>()
            .unwrap()
            .lock()
            .unwrap()
            .client
            .clone()
    })
}

impl<D> DelegateDispatch<XdgToplevel, XdgToplevelUserData, D> for ShellState<D>
where
    D: Dispatch<XdgToplevel, XdgToplevelUserData> + ShellHandler + PopupGrabSeat + 'static,
{
    fn request(
        state: &mut D,
        _client: &wayland_server::Client,
        xdg_toplevel: &XdgToplevel,
        request: xdg_toplevel::Request,
        data: &XdgToplevelUserData,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        let handle = make_toplevel_handle(&data.wl_surface, xdg_toplevel);

        match request {
            xdg_toplevel::Request::Destroy => {
                state.shell_state().untrack_toplevel(&handle);
                client_of(&data.wl_surface).untrack_surface(&data.wl_surface);
                state.toplevel_destroyed(handle);
            }
            xdg_toplevel::Request::SetParent { parent } => {
                let parent_surface = parent
                    .and_then(|parent| parent.data::<XdgToplevelUserData>().map(|d| d.wl_surface.clone()));
                handle.set_parent(parent_surface);
            }
            xdg_toplevel::Request::SetTitle { title } => {
                handle.set_title(title);
            }
            xdg_toplevel::Request::SetAppId { app_id } => {
                handle.set_app_id(app_id);
            }
            xdg_toplevel::Request::ShowWindowMenu { seat, serial, x, y } => {
                let serial = Serial::from(serial);
                if !state.validate_grab_serial(&seat, serial) {
                    warn!(?serial, "seat rejected show_window_menu serial, ignoring request");
                    return;
                }
                state.request_show_window_menu(handle, seat, serial, x, y);
            }
            xdg_toplevel::Request::Move { seat, serial } => {
                let serial = Serial::from(serial);
                if !state.validate_grab_serial(&seat, serial) {
                    warn!(?serial, "seat rejected move serial, ignoring request");
                    return;
                }
                state.request_move(handle, seat, serial);
            }
            xdg_toplevel::Request::Resize { seat, serial, edges } => {
                let serial = Serial::from(serial);
                let WEnum::Value(edges) = edges else {
                    return;
                };
                if !state.validate_grab_serial(&seat, serial) {
                    warn!(?serial, "seat rejected resize serial, ignoring request");
                    return;
                }
                state.request_resize(handle, seat, serial, edges);
            }
            xdg_toplevel::Request::SetMaxSize { width, height } => {
                handle.set_max_size((width, height).into());
            }
            xdg_toplevel::Request::SetMinSize { width, height } => {
                handle.set_min_size((width, height).into());
            }
            xdg_toplevel::Request::SetMaximized => {
                handle.with_pending_state(|s| s.maximized = true);
                state.request_maximize(handle);
            }
            xdg_toplevel::Request::UnsetMaximized => {
                handle.with_pending_state(|s| s.maximized = false);
                state.request_maximize(handle);
            }
            xdg_toplevel::Request::SetFullscreen { output } => {
                handle.with_pending_state(|s| s.fullscreen = true);
                state.request_fullscreen(handle, output);
            }
            xdg_toplevel::Request::UnsetFullscreen => {
                handle.with_pending_state(|s| s.fullscreen = false);
                state.request_unfullscreen(handle);
            }
            xdg_toplevel::Request::SetMinimized => {
                state.request_minimize(handle);
            }
            _ => unreachable!(),
        }
    }
}
