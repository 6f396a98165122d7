use wayland_protocols::xdg::shell::server::{
    xdg_positioner::XdgPositioner,
    xdg_surface::XdgSurface,
    xdg_wm_base::{self, XdgWmBase},
};
use wayland_server::{
    DataInit, DelegateDispatch, DelegateGlobalDispatch, DestructionNotify, Dispatch, DisplayHandle, GlobalDispatch, New,
    Resource,
};

use crate::utils::Serial;
use crate::wayland::shell::xdg::{
    handlers::{XdgPositionerUserData, XdgSurfaceUserData},
    ShellClient, ShellHandler, ShellState, XdgWmBaseUserData,
};

impl<D> DelegateGlobalDispatch<XdgWmBase, (), D> for ShellState<D>
where
    D: GlobalDispatch<XdgWmBase, ()>
        + Dispatch<XdgWmBase, XdgWmBaseUserData>
        + Dispatch<XdgSurface, XdgSurfaceUserData>
        + Dispatch<XdgPositioner, XdgPositionerUserData>
        + ShellHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _handle: &DisplayHandle,
        _client: &wayland_server::Client,
        resource: New<XdgWmBase>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let wm_base = data_init.init(resource, XdgWmBaseUserData::default());
        state.new_client(ShellClient::new(&wm_base));
    }
}

impl<D> DelegateDispatch<XdgWmBase, XdgWmBaseUserData, D> for ShellState<D>
where
    D: Dispatch<XdgWmBase, XdgWmBaseUserData>
        + Dispatch<XdgSurface, XdgSurfaceUserData>
        + Dispatch<XdgPositioner, XdgPositionerUserData>
        + ShellHandler
        + 'static,
{
    fn request(
        state: &mut D,
        _client: &wayland_server::Client,
        wm_base: &XdgWmBase,
        request: xdg_wm_base::Request,
        _data: &XdgWmBaseUserData,
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            xdg_wm_base::Request::CreatePositioner { id } => {
                data_init.init(id, XdgPositionerUserData::default());
            }
            xdg_wm_base::Request::GetXdgSurface { id, surface } => {
                // xdg_surface is not a role by itself; the role is assigned once the client
                // requests get_toplevel or get_popup on it.
                data_init.init(
                    id,
                    XdgSurfaceUserData {
                        wl_surface: surface,
                        wm_base: wm_base.clone(),
                        has_role: std::sync::atomic::AtomicBool::new(false),
                    },
                );
            }
            xdg_wm_base::Request::Pong { serial } => {
                ShellClient::handle_pong(state, wm_base, Serial::from(serial));
            }
            xdg_wm_base::Request::Destroy => {
                state.client_destroyed(ShellClient::new(wm_base));
            }
            _ => unreachable!(),
        }
    }
}

impl DestructionNotify for XdgWmBaseUserData {
    fn object_destroyed(
        &self,
        _client_id: wayland_server::backend::ClientId,
        _object_id: wayland_server::backend::ObjectId,
    ) {
    }
}
