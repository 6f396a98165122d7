use std::sync::Mutex;

use wayland_protocols::xdg::shell::server::xdg_positioner::{self, XdgPositioner};
use wayland_server::{DataInit, DelegateDispatch, DestructionNotify, Dispatch, DisplayHandle, Resource, WEnum};

use crate::utils::Rectangle;
use crate::wayland::shell::xdg::{PositionerState, ShellHandler, ShellState};

/// User data for `xdg_positioner`.
#[derive(Debug, Default)]
pub struct XdgPositionerUserData {
    pub(crate) inner: Mutex<PositionerState>,
}

impl DestructionNotify for XdgPositionerUserData {
    fn object_destroyed(&self, _client_id: wayland_server::backend::ClientId, _object_id: wayland_server::backend::ObjectId) {}
}

impl<D> DelegateDispatch<XdgPositioner, XdgPositionerUserData, D> for ShellState<D>
where
    D: Dispatch<XdgPositioner, XdgPositionerUserData> + ShellHandler + 'static,
{
    fn request(
        _state: &mut D,
        _client: &wayland_server::Client,
        positioner: &XdgPositioner,
        request: xdg_positioner::Request,
        data: &XdgPositionerUserData,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        let mut state = data.inner.lock().unwrap();
        match request {
            xdg_positioner::Request::SetSize { width, height } => {
                if width < 1 || height < 1 {
                    positioner.post_error(xdg_positioner::Error::InvalidInput, "invalid size for positioner");
                } else {
                    state.size = (width, height).into();
                }
            }
            xdg_positioner::Request::SetAnchorRect { x, y, width, height } => {
                if width < 1 || height < 1 {
                    positioner.post_error(
                        xdg_positioner::Error::InvalidInput,
                        "invalid size for positioner's anchor rectangle",
                    );
                } else {
                    state.anchor_rect = Rectangle::from_loc_and_size((x, y), (width, height));
                }
            }
            xdg_positioner::Request::SetAnchor { anchor } => {
                if let WEnum::Value(anchor) = anchor {
                    state.anchor = anchor;
                } else {
                    positioner.post_error(xdg_positioner::Error::InvalidInput, "invalid anchor for positioner");
                }
            }
            xdg_positioner::Request::SetGravity { gravity } => {
                if let WEnum::Value(gravity) = gravity {
                    state.gravity = gravity;
                } else {
                    positioner.post_error(xdg_positioner::Error::InvalidInput, "invalid gravity for positioner");
                }
            }
            xdg_positioner::Request::SetConstraintAdjustment {
                constraint_adjustment,
            } => {
                state.constraint_adjustment =
                    xdg_positioner::ConstraintAdjustment::from_bits_truncate(constraint_adjustment);
            }
            xdg_positioner::Request::SetOffset { x, y } => {
                state.offset = (x, y).into();
            }
            // Reactive repositioning (v3+) is out of scope: the unconstrained geometry this
            // crate computes is always returned, so these requests are accepted but ignored.
            xdg_positioner::Request::SetReactive => {}
            xdg_positioner::Request::SetParentSize { .. } => {}
            xdg_positioner::Request::SetParentConfigure { .. } => {}
            xdg_positioner::Request::Destroy => {
                // handled by the destructor
            }
            _ => unreachable!(),
        }
    }
}
