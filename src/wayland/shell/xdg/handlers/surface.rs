use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use wayland_protocols::xdg::shell::server::{
    xdg_popup::XdgPopup,
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::XdgToplevel,
    xdg_wm_base::{self, XdgWmBase},
};
use wayland_server::{DataInit, DelegateDispatch, DestructionNotify, Dispatch, DisplayHandle, Resource};

use crate::utils::{Rectangle, Serial};
use crate::wayland::compositor;
use crate::wayland::shell::xdg::{
    handlers::{XdgPopupUserData, XdgPositionerUserData, XdgToplevelUserData},
    Configure, PopupAttributes, PositionerState, ShellClient, ShellHandler, ShellState, ShellSurface, SurfaceState,
    ToplevelAttributes, ToplevelSurface, PopupSurface, Role, XDG_POPUP_ROLE, XDG_TOPLEVEL_ROLE,
};

/// User data for `xdg_surface`.
#[derive(Debug)]
pub struct XdgSurfaceUserData {
    pub(crate) wl_surface: wayland_server::protocol::wl_surface::WlSurface,
    pub(crate) wm_base: XdgWmBase,
    pub(crate) has_role: AtomicBool,
}

impl DestructionNotify for XdgSurfaceUserData {
    fn object_destroyed(&self, _client_id: wayland_server::backend::ClientId, _object_id: wayland_server::backend::ObjectId) {}
}

impl<D> DelegateDispatch<XdgSurface, XdgSurfaceUserData, D> for ShellState<D>
where
    D: Dispatch<XdgSurface, XdgSurfaceUserData>
        + Dispatch<XdgToplevel, XdgToplevelUserData>
        + Dispatch<XdgPopup, XdgPopupUserData>
        + ShellHandler
        + 'static,
{
    fn request(
        state: &mut D,
        _client: &wayland_server::Client,
        xdg_surface: &XdgSurface,
        request: xdg_surface::Request,
        data: &XdgSurfaceUserData,
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            xdg_surface::Request::Destroy => {
                if !data.wl_surface.alive() {
                    return;
                }
                if data.has_role.load(Ordering::Acquire) {
                    data.wm_base.post_error(
                        xdg_wm_base::Error::Role,
                        "xdg_surface was destroyed before its role object",
                    );
                }
            }
            xdg_surface::Request::GetToplevel { id } => {
                let surface = &data.wl_surface;

                if compositor::give_role(surface, XDG_TOPLEVEL_ROLE).is_err() {
                    data.wm_base.post_error(xdg_wm_base::Error::Role, "surface already has a role");
                    return;
                }
                data.has_role.store(true, Ordering::Release);

                let client = ShellClient::new(&data.wm_base);
                compositor::with_states(surface, |states| {
                    states.data_map.insert_if_missing_threadsafe(|| {
                        Mutex::new(SurfaceState::new(data.wm_base.clone(), xdg_surface.clone(), client.clone()))
                    });
                    let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
                    cell.lock().unwrap().role = Role::Toplevel(ToplevelAttributes::default());
                });

                compositor::add_pre_commit_hook::<D, _>(surface, ToplevelSurface::commit_hook::<D>);

                let xdg_toplevel = data_init.init(
                    id,
                    XdgToplevelUserData {
                        wl_surface: surface.clone(),
                        alive_tracker: Default::default(),
                    },
                );

                let handle = ToplevelSurface::from_parts(xdg_surface.clone(), xdg_toplevel, surface.clone());
                state.shell_state().track_toplevel(handle.clone());
                ShellClient::new(&data.wm_base).track_surface(ShellSurface::Toplevel(handle.clone()));
                state.new_toplevel(handle);
            }
            xdg_surface::Request::GetPopup {
                id,
                parent,
                positioner,
            } => {
                let positioner_data = *positioner.data::<XdgPositionerUserData>().unwrap().inner.lock().unwrap();

                if !positioner_data.is_complete() {
                    data.wm_base.post_error(
                        xdg_wm_base::Error::InvalidPositioner,
                        "positioner is missing a size or an anchor rectangle",
                    );
                    return;
                }

                let parent_wl_surface = parent
                    .as_ref()
                    .and_then(|parent| parent.data::<XdgSurfaceUserData>())
                    .map(|parent_data| parent_data.wl_surface.clone());
                let parent_is_toplevel = parent_wl_surface
                    .as_ref()
                    .map(|s| compositor::get_role(s) == Some(XDG_TOPLEVEL_ROLE))
                    .unwrap_or(false);

                let surface = &data.wl_surface;

                if compositor::give_role(surface, XDG_POPUP_ROLE).is_err() {
                    data.wm_base.post_error(xdg_wm_base::Error::Role, "surface already has a role");
                    return;
                }
                data.has_role.store(true, Ordering::Release);

                let client = ShellClient::new(&data.wm_base);
                let geometry = positioner_data.get_geometry();
                compositor::with_states(surface, |states| {
                    states.data_map.insert_if_missing_threadsafe(|| {
                        Mutex::new(SurfaceState::new(data.wm_base.clone(), xdg_surface.clone(), client.clone()))
                    });
                    let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
                    cell.lock().unwrap().role = Role::Popup(PopupAttributes {
                        parent: parent_wl_surface.clone(),
                        parent_is_toplevel,
                        positioner: positioner_data,
                        geometry,
                        committed: false,
                        seat: None,
                    });
                });

                compositor::add_pre_commit_hook::<D, _>(surface, PopupSurface::commit_hook::<D>);

                let xdg_popup = data_init.init(
                    id,
                    XdgPopupUserData {
                        wl_surface: surface.clone(),
                        alive_tracker: Default::default(),
                    },
                );

                let handle = PopupSurface::from_parts(xdg_surface.clone(), xdg_popup, surface.clone());
                state.shell_state().track_popup(handle.clone());
                ShellClient::new(&data.wm_base).track_surface(ShellSurface::Popup(handle.clone()));
                state.new_popup(handle, positioner_data);
            }
            xdg_surface::Request::SetWindowGeometry { x, y, width, height } => {
                let surface = &data.wl_surface;
                if compositor::get_role(surface).is_none() {
                    xdg_surface.post_error(xdg_surface::Error::NotConstructed, "xdg_surface must have a role");
                    return;
                }
                compositor::with_states(surface, |states| {
                    let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
                    cell.lock().unwrap().next_geometry = Some(Rectangle::from_loc_and_size((x, y), (width, height)));
                });
            }
            xdg_surface::Request::AckConfigure { serial } => {
                let serial = Serial::from(serial);
                let surface = &data.wl_surface;

                if compositor::get_role(surface).is_none() {
                    xdg_surface.post_error(xdg_surface::Error::NotConstructed, "xdg_surface must have a role");
                    return;
                }

                let result = compositor::with_states(surface, |states| {
                    let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
                    cell.lock().unwrap().ack(serial)
                });

                match result {
                    Ok(configure) => {
                        if let Configure::Toplevel(_) = &configure {
                            // nothing extra to do: pending width/height were already reset by `ack`.
                        }
                        state.ack_configure(surface.clone(), configure);
                    }
                    Err(_) => {
                        data.wm_base.post_error(
                            xdg_wm_base::Error::InvalidSurfaceState,
                            format!("wrong configure serial: {}", u32::from(serial)),
                        );
                    }
                }
            }
            _ => unreachable!(),
        }
    }
}
