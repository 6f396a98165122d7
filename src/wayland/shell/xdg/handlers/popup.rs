use std::sync::Mutex;

use wayland_protocols::xdg::shell::server::{
    xdg_popup::{self, XdgPopup},
    xdg_wm_base::{self, XdgWmBase},
};
use wayland_server::{
    backend::{ClientId, ObjectId},
    protocol::wl_surface::WlSurface,
    DataInit, DelegateDispatch, DestructionNotify, Dispatch, DisplayHandle, Resource,
};

use crate::utils::alive_tracker::AliveTracker;
use crate::utils::Serial;
use crate::wayland::compositor;
use crate::wayland::shell::xdg::{
    GrabError, PopupGrabSeat, PopupSurface, ShellClient, ShellHandler, ShellState, SurfaceState,
};

/// User data for `xdg_popup`.
#[derive(Debug)]
pub struct XdgPopupUserData {
    pub(crate) wl_surface: WlSurface,
    pub(crate) alive_tracker: AliveTracker,
}

impl DestructionNotify for XdgPopupUserData {
    fn object_destroyed(&self, _client_id: ClientId, _object_id: ObjectId) {
        self.alive_tracker.destroy_notify();
    }
}

fn make_popup_handle(wl_surface: &WlSurface, xdg_popup: &XdgPopup) -> PopupSurface {
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
    PopupSurface::from_parts(xdg_surface, xdg_popup.clone(), wl_surface.clone())
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

fn wm_base_of(wl_surface: &WlSurface) -> XdgWmBase {
    compositor::with_states(wl_surface, |states| {
        states
            .data_map
            .get::<Mutex<SurfaceState>>()
            .unwrap()
            .lock()
            .unwrap()
            .wm_base
            .clone()
    })
}

impl<D> DelegateDispatch<XdgPopup, XdgPopupUserData, D> for ShellState<D>
where
    D: Dispatch<XdgPopup, XdgPopupUserData> + ShellHandler + PopupGrabSeat + 'static,
{
    fn request(
        state: &mut D,
        _client: &wayland_server::Client,
        xdg_popup: &XdgPopup,
        request: xdg_popup::Request,
        data: &XdgPopupUserData,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            xdg_popup::Request::Destroy => {
                let handle = make_popup_handle(&data.wl_surface, xdg_popup);

                let was_topmost = ShellState::with_grabs(state, |state, grabs| grabs.popup_destroyed(state, &handle));
                if !was_topmost {
                    wm_base_of(&data.wl_surface)
                        .post_error(xdg_wm_base::Error::NotTheTopmostPopup, "popup destroyed out of order");
                }

                state.shell_state().untrack_popup(&handle);
                client_of(&data.wl_surface).untrack_surface(&data.wl_surface);
                state.popup_destroyed(handle);
            }
            xdg_popup::Request::Grab { seat, serial } => {
                let handle = make_popup_handle(&data.wl_surface, xdg_popup);
                let serial = Serial::from(serial);

                let result = ShellState::with_grabs(state, |state, grabs| grabs.request_grab(state, &handle, seat, serial));
                match result {
                    Ok(()) => {}
                    Err(err @ GrabError::AlreadyCommitted) => {
                        xdg_popup.post_error(xdg_popup::Error::InvalidGrab, err.to_string());
                    }
                    Err(err @ GrabError::NotTopmost) => {
                        wm_base_of(&data.wl_surface).post_error(xdg_wm_base::Error::NotTheTopmostPopup, err.to_string());
                    }
                }
            }
            // Reactive repositioning (v3+) is out of scope, same call as `xdg_positioner`'s
            // v3+ requests: accepted but ignored, the popup keeps its original geometry.
            xdg_popup::Request::Reposition { .. } => {}
            _ => unreachable!(),
        }
    }
}
