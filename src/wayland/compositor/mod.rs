//! Utilities for handling surfaces, subsurfaces and regions
//!
//! This module provides automatic handling of core surface management
//! through implementation of the `wl_compositor`, `wl_subcompositor` and `wl_region`
//! globals.
//!
//! ## How to use it
//!
//! To get this handling, you need to instantiate a [`CompositorState`], store it in your
//! `State` struct and implement the [`CompositorHandler`] trait, as shown in this example:
//!
//! ```no_run
//! # extern crate wayland_server;
//! use wl_xdg_shell::wayland::compositor::{CompositorState, CompositorHandler, CompositorClientState};
//! use wl_xdg_shell::delegate_compositor;
//! use wayland_server::protocol::wl_surface::WlSurface;
//!
//! # struct State { compositor_state: CompositorState }
//! # let mut display = wayland_server::Display::<State>::new().unwrap();
//! let compositor_state = CompositorState::new::<State>(&display.handle());
//!
//! impl CompositorHandler for State {
//!     fn compositor_state(&mut self) -> &mut CompositorState {
//!         &mut self.compositor_state
//!     }
//!
//!     fn commit(&mut self, surface: &WlSurface) {
//!         // handle buffer attachments, damage, etc.
//!     }
//! }
//!
//! delegate_compositor!(State);
//! ```
//!
//! ## Surface data and roles
//!
//! Surfaces accumulate client-set state in a double-buffered fashion: new values are written
//! to a pending instance on every request, and only become visible in [`with_states`] once the
//! client sends `wl_surface.commit`. The buffering logic itself lives in [`cache`], and is exposed
//! to other protocol implementations (like `xdg_shell`) through the [`Cacheable`] trait and the
//! [`MultiCache`] type stored in [`SurfaceData::cached_state`].
//!
//! A surface can be given a role (such as `"xdg_toplevel"` or `"subsurface"`) exactly once,
//! using [`give_role`]. Protocol extensions that define their own roles should use this function
//! rather than manipulating [`SurfaceData`] directly, so that role conflicts are properly detected.

use std::any::Any;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use wayland_server::{
    backend::{ClientId, GlobalId, ObjectId},
    protocol::{
        wl_buffer::WlBuffer,
        wl_callback::WlCallback,
        wl_compositor::{self, WlCompositor},
        wl_output,
        wl_region::{self, WlRegion},
        wl_subcompositor::{self, WlSubcompositor},
        wl_subsurface::{self, WlSubsurface},
        wl_surface::{self, WlSurface},
    },
    DataInit, DelegateDispatch, DelegateGlobalDispatch, DestructionNotify, Dispatch, DisplayHandle,
    GlobalDispatch, New, Resource, WEnum,
};

use crate::utils::user_data::UserDataMap;
use crate::utils::{Buffer as BufferCoord, Logical, Point, Rectangle};

mod cache;
mod hook;
mod transaction;
mod tree;

pub use cache::{Cacheable, MultiCache};
pub use tree::{AlreadyHasRole, Location, TraversalAction};

use hook::Hook;
use tree::PrivateSurfaceData;

/// The state container associated with a surface
///
/// This is what [`with_states`] gives you access to.
#[derive(Debug)]
pub struct SurfaceData {
    /// The role of the surface, if any has been assigned
    pub role: Option<&'static str>,
    /// A map of arbitrary data that protocol implementations and compositors can use to
    /// associate state with this surface
    pub data_map: UserDataMap,
    /// The double-buffered state cache of this surface
    pub cached_state: MultiCache,
}

type PreCommitHookFn = dyn Fn(&mut dyn Any, &DisplayHandle, &WlSurface) + Send + Sync + 'static;

/// Access the states associated with this surface
pub fn with_states<T, F: FnOnce(&SurfaceData) -> T>(surface: &WlSurface, f: F) -> T {
    PrivateSurfaceData::with_states(surface, f)
}

/// Register that this surface has a given role
///
/// Fails if the surface already has a role (the same, or a different one)
pub fn give_role(surface: &WlSurface, role: &'static str) -> Result<(), AlreadyHasRole> {
    PrivateSurfaceData::set_role(surface, role)
}

/// Retrieve the role of a surface, if any
pub fn get_role(surface: &WlSurface) -> Option<&'static str> {
    PrivateSurfaceData::get_role(surface)
}

/// Register a pre-commit hook to be invoked before a surface's pending state is committed
///
/// Pre-commit hooks run after the client requested a `wl_surface.commit`, but before the
/// pending cached state is swapped in, giving the implementor a chance to validate the
/// surface's role-specific invariants (for example, that a popup still has a parent) with `D`
/// in scope.
pub fn add_pre_commit_hook<D, F>(surface: &WlSurface, hook: F)
where
    D: 'static,
    F: Fn(&mut D, &DisplayHandle, &WlSurface) + Send + Sync + 'static,
{
    let wrapped = move |state: &mut dyn Any, dh: &DisplayHandle, surface: &WlSurface| {
        let state = state
            .downcast_mut::<D>()
            .expect("add_pre_commit_hook invoked with mismatched state type");
        hook(state, dh, surface);
    };
    PrivateSurfaceData::add_pre_commit_hook(surface, Hook::new(Arc::new(wrapped) as Arc<PreCommitHookFn>));
}

/// Check whether a (sub)surface is effectively synchronized, either because it is itself set to
/// sync, or because one of its ancestors is
pub fn is_effectively_sync(surface: &WlSurface) -> bool {
    let is_direct_sync = PrivateSurfaceData::with_states(surface, |state| {
        state
            .data_map
            .get::<SubsurfaceState>()
            .map(|s| s.sync.load(Ordering::Acquire))
            .unwrap_or(false)
    });
    if is_direct_sync {
        return true;
    }
    match PrivateSurfaceData::get_parent(surface) {
        Some(parent) => is_effectively_sync(&parent),
        None => false,
    }
}

/// The state of the `wl_compositor`/`wl_subcompositor` globals
#[derive(Debug)]
pub struct CompositorState {
    global: GlobalId,
    subcompositor_global: GlobalId,
}

impl CompositorState {
    /// Register new [`WlCompositor`] and [`WlSubcompositor`] globals
    pub fn new<D>(display: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<WlCompositor, ()>
            + GlobalDispatch<WlSubcompositor, ()>
            + Dispatch<WlCompositor, ()>
            + Dispatch<WlSubcompositor, ()>
            + Dispatch<WlSurface, SurfaceUserData>
            + Dispatch<WlRegion, RegionUserData>
            + Dispatch<WlSubsurface, SubsurfaceUserData>
            + CompositorHandler
            + 'static,
    {
        let global = display.create_global::<D, WlCompositor, _>(6, ());
        let subcompositor_global = display.create_global::<D, WlSubcompositor, _>(1, ());
        Self {
            global,
            subcompositor_global,
        }
    }

    /// The [`GlobalId`] of the `wl_compositor` global
    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    /// The [`GlobalId`] of the `wl_subcompositor` global
    pub fn subcompositor_global(&self) -> GlobalId {
        self.subcompositor_global.clone()
    }
}

/// Handler trait for the `wl_compositor`/`wl_subcompositor` globals
#[allow(unused_variables)]
pub trait CompositorHandler {
    /// [`CompositorState`] getter
    fn compositor_state(&mut self) -> &mut CompositorState;

    /// A surface has committed new state
    ///
    /// This is invoked after the pending state of this surface (and, if it is a synchronized
    /// subsurface, of its children) has been merged into its current state.
    fn commit(&mut self, surface: &WlSurface) {}
}

/// Per-client compositor state
///
/// This crate's compositor handling does not track any client-wide state today; this type exists so
/// compositors have a conventional, forward-compatible place to store a `ClientData` value.
#[derive(Debug, Default)]
pub struct CompositorClientState;

/*
 * wl_compositor
 */

impl<D> DelegateGlobalDispatch<WlCompositor, (), D> for CompositorState
where
    D: GlobalDispatch<WlCompositor, ()>
        + Dispatch<WlCompositor, ()>
        + Dispatch<WlSurface, SurfaceUserData>
        + Dispatch<WlRegion, RegionUserData>
        + CompositorHandler
        + 'static,
{
    fn bind(
        _state: &mut D,
        _handle: &DisplayHandle,
        _client: &wayland_server::Client,
        resource: New<WlCompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        data_init.init(resource, ());
    }
}

impl<D> DelegateDispatch<WlCompositor, (), D> for CompositorState
where
    D: Dispatch<WlCompositor, ()> + Dispatch<WlSurface, SurfaceUserData> + Dispatch<WlRegion, RegionUserData>,
{
    fn request(
        _state: &mut D,
        _client: &wayland_server::Client,
        _resource: &WlCompositor,
        request: wl_compositor::Request,
        _data: &(),
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            wl_compositor::Request::CreateSurface { id } => {
                let surface = data_init.init(
                    id,
                    SurfaceUserData {
                        inner: PrivateSurfaceData::new(),
                    },
                );
                PrivateSurfaceData::init(&surface);
            }
            wl_compositor::Request::CreateRegion { id } => {
                data_init.init(
                    id,
                    RegionUserData {
                        inner: Mutex::new(RegionAttributes::default()),
                    },
                );
            }
            _ => unreachable!(),
        }
    }
}

/*
 * wl_surface
 */

impl Cacheable for SurfaceAttributes {
    fn commit(&mut self, _dh: &DisplayHandle) -> Self {
        SurfaceAttributes {
            buffer: self.buffer.take(),
            buffer_scale: self.buffer_scale,
            buffer_transform: self.buffer_transform,
            damage: std::mem::take(&mut self.damage),
            opaque_region: self.opaque_region.clone(),
            input_region: self.input_region.clone(),
            frame_callbacks: std::mem::take(&mut self.frame_callbacks),
        }
    }

    fn merge_into(self, into: &mut Self, _dh: &DisplayHandle) {
        if self.buffer.is_some() {
            into.buffer = self.buffer;
        }
        into.buffer_scale = self.buffer_scale;
        into.buffer_transform = self.buffer_transform;
        into.damage.extend(self.damage);
        if self.opaque_region.is_some() {
            into.opaque_region = self.opaque_region;
        }
        if self.input_region.is_some() {
            into.input_region = self.input_region;
        }
        into.frame_callbacks.extend(self.frame_callbacks);
    }
}

/// The client-set attributes of a `wl_surface`, double-buffered through [`Cacheable`]
#[derive(Debug, Clone)]
pub struct SurfaceAttributes {
    /// The buffer attached by the client on its last `wl_surface.attach`, if any
    pub buffer: Option<BufferAssignment>,
    /// The scale of the attached buffer
    pub buffer_scale: i32,
    /// The transform applied to the attached buffer
    pub buffer_transform: wl_output::Transform,
    /// Pending damage, in surface or buffer coordinates
    pub damage: Vec<Damage>,
    /// The opaque region set by the client, if any
    pub opaque_region: Option<RegionAttributes>,
    /// The input region set by the client, if any
    pub input_region: Option<RegionAttributes>,
    /// `wl_callback`s registered through `wl_surface.frame`, to be fired on the next output
    /// refresh after this state becomes current
    pub frame_callbacks: Vec<WlCallback>,
}

impl Default for SurfaceAttributes {
    fn default() -> Self {
        SurfaceAttributes {
            buffer: None,
            buffer_scale: 1,
            buffer_transform: wl_output::Transform::Normal,
            damage: Vec::new(),
            opaque_region: None,
            input_region: None,
            frame_callbacks: Vec::new(),
        }
    }
}

/// A pending buffer assignment for a surface
#[derive(Debug, Clone)]
pub enum BufferAssignment {
    /// The buffer was removed (a `null` buffer was attached)
    Removed,
    /// A new buffer was attached, with the given offset relative to the previous buffer
    NewBuffer {
        /// The new buffer
        buffer: WlBuffer,
        /// Offset of the new buffer relative to the previous one
        delta: Point<i32, Logical>,
    },
}

/// A region of damage, either in surface-local or buffer-local coordinates
#[derive(Debug, Clone)]
pub enum Damage {
    /// Damage in surface coordinates
    Surface(Rectangle<i32, Logical>),
    /// Damage in buffer coordinates
    Buffer(Rectangle<i32, BufferCoord>),
}

/// Whether a region rectangle should be added to or subtracted from the region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectangleKind {
    /// The rectangle should be added to the region
    Add,
    /// The rectangle should be subtracted from the region
    Subtract,
}

/// The accumulated state of a `wl_region`
#[derive(Debug, Default, Clone)]
pub struct RegionAttributes {
    /// The list of rectangles defining this region, in the order they were submitted
    pub rects: Vec<(RectangleKind, Rectangle<i32, Logical>)>,
}

/// User data for `wl_surface`
#[derive(Debug)]
pub struct SurfaceUserData {
    pub(crate) inner: Mutex<PrivateSurfaceData>,
}

impl DestructionNotify for SurfaceUserData {
    fn object_destroyed(&self, _client_id: ClientId, object_id: ObjectId) {
        PrivateSurfaceData::cleanup(self, object_id);
    }
}

impl<D> DelegateDispatch<WlSurface, SurfaceUserData, D> for CompositorState
where
    D: Dispatch<WlSurface, SurfaceUserData> + Dispatch<WlCallback, ()> + CompositorHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &wayland_server::Client,
        surface: &WlSurface,
        request: wl_surface::Request,
        _data: &SurfaceUserData,
        dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            wl_surface::Request::Attach { buffer, x, y } => {
                PrivateSurfaceData::with_states(surface, |states| {
                    states.cached_state.pending::<SurfaceAttributes>().buffer = Some(match buffer {
                        Some(buffer) => BufferAssignment::NewBuffer {
                            buffer,
                            delta: (x, y).into(),
                        },
                        None => BufferAssignment::Removed,
                    })
                });
            }
            wl_surface::Request::Damage { x, y, width, height } => {
                PrivateSurfaceData::with_states(surface, |states| {
                    states
                        .cached_state
                        .pending::<SurfaceAttributes>()
                        .damage
                        .push(Damage::Surface(Rectangle::from_loc_and_size((x, y), (width, height))));
                });
            }
            wl_surface::Request::Frame { callback } => {
                let callback = data_init.init(callback, ());
                PrivateSurfaceData::with_states(surface, |states| {
                    states
                        .cached_state
                        .pending::<SurfaceAttributes>()
                        .frame_callbacks
                        .push(callback.clone());
                });
            }
            wl_surface::Request::SetOpaqueRegion { region } => {
                let attributes = region.map(|r| r.data::<RegionUserData>().unwrap().inner.lock().unwrap().clone());
                PrivateSurfaceData::with_states(surface, |states| {
                    states.cached_state.pending::<SurfaceAttributes>().opaque_region = attributes;
                });
            }
            wl_surface::Request::SetInputRegion { region } => {
                let attributes = region.map(|r| r.data::<RegionUserData>().unwrap().inner.lock().unwrap().clone());
                PrivateSurfaceData::with_states(surface, |states| {
                    states.cached_state.pending::<SurfaceAttributes>().input_region = attributes;
                });
            }
            wl_surface::Request::Commit => {
                PrivateSurfaceData::invoke_pre_commit_hooks(state, dh, surface);

                if !surface.is_alive() {
                    // a pre-commit hook may have destroyed the client's connection
                    return;
                }

                PrivateSurfaceData::commit(surface, dh);
                tracing::trace!(surface = ?surface.id(), "surface committed");

                state.commit(surface);
            }
            wl_surface::Request::SetBufferTransform { transform } => {
                if let WEnum::Value(transform) = transform {
                    PrivateSurfaceData::with_states(surface, |states| {
                        states.cached_state.pending::<SurfaceAttributes>().buffer_transform = transform;
                    });
                }
            }
            wl_surface::Request::SetBufferScale { scale } => {
                PrivateSurfaceData::with_states(surface, |states| {
                    states.cached_state.pending::<SurfaceAttributes>().buffer_scale = scale;
                });
            }
            wl_surface::Request::DamageBuffer { x, y, width, height } => {
                PrivateSurfaceData::with_states(surface, |states| {
                    states
                        .cached_state
                        .pending::<SurfaceAttributes>()
                        .damage
                        .push(Damage::Buffer(Rectangle::from_loc_and_size((x, y), (width, height))))
                });
            }
            wl_surface::Request::Destroy => {
                // handled by our destructor
            }
            _ => unreachable!(),
        }
    }
}

/*
 * wl_region
 */

/// User data of a `wl_region`
#[derive(Debug)]
pub struct RegionUserData {
    pub(crate) inner: Mutex<RegionAttributes>,
}

impl DestructionNotify for RegionUserData {
    fn object_destroyed(&self, _client_id: ClientId, _object_id: ObjectId) {}
}

impl<D> DelegateDispatch<WlRegion, RegionUserData, D> for CompositorState
where
    D: Dispatch<WlRegion, RegionUserData>,
{
    fn request(
        _state: &mut D,
        _client: &wayland_server::Client,
        _resource: &WlRegion,
        request: wl_region::Request,
        data: &RegionUserData,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        let mut guard = data.inner.lock().unwrap();
        match request {
            wl_region::Request::Add { x, y, width, height } => guard
                .rects
                .push((RectangleKind::Add, Rectangle::from_loc_and_size((x, y), (width, height)))),
            wl_region::Request::Subtract { x, y, width, height } => guard.rects.push((
                RectangleKind::Subtract,
                Rectangle::from_loc_and_size((x, y), (width, height)),
            )),
            wl_region::Request::Destroy => {
                // handled by our destructor
            }
            _ => unreachable!(),
        }
    }
}

/*
 * wl_subcompositor
 */

impl<D> DelegateGlobalDispatch<WlSubcompositor, (), D> for CompositorState
where
    D: GlobalDispatch<WlSubcompositor, ()>
        + Dispatch<WlSubcompositor, ()>
        + Dispatch<WlSubsurface, SubsurfaceUserData>
        + 'static,
{
    fn bind(
        _state: &mut D,
        _handle: &DisplayHandle,
        _client: &wayland_server::Client,
        resource: New<WlSubcompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        data_init.init(resource, ());
    }
}

impl<D> DelegateDispatch<WlSubcompositor, (), D> for CompositorState
where
    D: Dispatch<WlSubcompositor, ()> + Dispatch<WlSubsurface, SubsurfaceUserData>,
{
    fn request(
        _state: &mut D,
        _client: &wayland_server::Client,
        subcompositor: &WlSubcompositor,
        request: wl_subcompositor::Request,
        _data: &(),
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            wl_subcompositor::Request::GetSubsurface { id, surface, parent } => {
                if PrivateSurfaceData::set_parent(&surface, &parent).is_err() {
                    subcompositor.post_error(wl_subcompositor::Error::BadSurface, "Surface already has a role.");
                    return;
                }

                data_init.init(
                    id,
                    SubsurfaceUserData {
                        surface: surface.clone(),
                    },
                );

                PrivateSurfaceData::with_states(&surface, |states| {
                    states.data_map.insert_if_missing_threadsafe(SubsurfaceState::new)
                });
            }
            wl_subcompositor::Request::Destroy => {}
            _ => unreachable!(),
        }
    }
}

/*
 * wl_subsurface
 */

/// User data of a `wl_subsurface`
#[derive(Debug)]
pub struct SubsurfaceUserData {
    surface: WlSurface,
}

impl DestructionNotify for SubsurfaceUserData {
    fn object_destroyed(&self, _client_id: ClientId, _object_id: ObjectId) {
        if self.surface.is_alive() {
            PrivateSurfaceData::unset_parent(&self.surface);
        }
    }
}

/// The cached state associated with a subsurface
#[derive(Debug, Clone, Copy)]
pub struct SubsurfaceCachedState {
    /// Location of the top-left corner of this subsurface relative to its parent
    pub location: Point<i32, Logical>,
}

impl Default for SubsurfaceCachedState {
    fn default() -> Self {
        SubsurfaceCachedState {
            location: (0, 0).into(),
        }
    }
}

impl Cacheable for SubsurfaceCachedState {
    fn commit(&mut self, _dh: &DisplayHandle) -> Self {
        *self
    }

    fn merge_into(self, into: &mut Self, _dh: &DisplayHandle) {
        into.location = self.location;
    }
}

pub(crate) struct SubsurfaceState {
    pub(crate) sync: AtomicBool,
}

impl SubsurfaceState {
    fn new() -> SubsurfaceState {
        SubsurfaceState {
            sync: AtomicBool::new(true),
        }
    }
}

impl<D> DelegateDispatch<WlSubsurface, SubsurfaceUserData, D> for CompositorState
where
    D: Dispatch<WlSubsurface, SubsurfaceUserData>,
{
    fn request(
        _state: &mut D,
        _client: &wayland_server::Client,
        subsurface: &WlSubsurface,
        request: wl_subsurface::Request,
        data: &SubsurfaceUserData,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            wl_subsurface::Request::SetPosition { x, y } => {
                PrivateSurfaceData::with_states(&data.surface, |state| {
                    state.cached_state.pending::<SubsurfaceCachedState>().location = (x, y).into();
                })
            }
            wl_subsurface::Request::PlaceAbove { sibling } => {
                if PrivateSurfaceData::reorder(&data.surface, Location::After, &sibling).is_err() {
                    subsurface.post_error(
                        wl_subsurface::Error::BadSurface,
                        "Provided surface is not a sibling or parent.",
                    )
                }
            }
            wl_subsurface::Request::PlaceBelow { sibling } => {
                if PrivateSurfaceData::reorder(&data.surface, Location::Before, &sibling).is_err() {
                    subsurface.post_error(
                        wl_subsurface::Error::BadSurface,
                        "Provided surface is not a sibling or parent.",
                    )
                }
            }
            wl_subsurface::Request::SetSync => PrivateSurfaceData::with_states(&data.surface, |state| {
                state
                    .data_map
                    .get::<SubsurfaceState>()
                    .unwrap()
                    .sync
                    .store(true, Ordering::Release);
            }),
            wl_subsurface::Request::SetDesync => PrivateSurfaceData::with_states(&data.surface, |state| {
                state
                    .data_map
                    .get::<SubsurfaceState>()
                    .unwrap()
                    .sync
                    .store(false, Ordering::Release);
            }),
            wl_subsurface::Request::Destroy => {
                // handled by our destructor
            }
            _ => unreachable!(),
        }
    }
}

/// Delegate implementation of the `wl_compositor`/`wl_subcompositor` handling to [`CompositorState`]
#[macro_export]
macro_rules! delegate_compositor {
    ($(@<$( $lt:tt $( : $clt:tt $(+ $dlt:tt )* )? ),+>)? $ty: ty) => {
        $crate::reexports::wayland_server::delegate_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_server::protocol::wl_compositor::WlCompositor: ()
        ] => $crate::wayland::compositor::CompositorState);
        $crate::reexports::wayland_server::delegate_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_server::protocol::wl_surface::WlSurface: $crate::wayland::compositor::SurfaceUserData
        ] => $crate::wayland::compositor::CompositorState);
        $crate::reexports::wayland_server::delegate_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_server::protocol::wl_region::WlRegion: $crate::wayland::compositor::RegionUserData
        ] => $crate::wayland::compositor::CompositorState);
        $crate::reexports::wayland_server::delegate_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_server::protocol::wl_subcompositor::WlSubcompositor: ()
        ] => $crate::wayland::compositor::CompositorState);
        $crate::reexports::wayland_server::delegate_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_server::protocol::wl_subsurface::WlSubsurface: $crate::wayland::compositor::SubsurfaceUserData
        ] => $crate::wayland::compositor::CompositorState);

        $crate::reexports::wayland_server::delegate_global_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_server::protocol::wl_compositor::WlCompositor: ()
        ] => $crate::wayland::compositor::CompositorState);
        $crate::reexports::wayland_server::delegate_global_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_server::protocol::wl_subcompositor::WlSubcompositor: ()
        ] => $crate::wayland::compositor::CompositorState);
    };
}
