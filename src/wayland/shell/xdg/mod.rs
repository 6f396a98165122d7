//! The `xdg_shell` protocol: turning plain surfaces into windows and popups.
//!
//! This is the entry point of the crate. [`ShellState`] registers the `xdg_wm_base` global and
//! owns everything the protocol needs beyond what lives on individual surfaces: the calloop loop
//! handle used to coalesce configures and arm ping timers, and the table of active popup grabs.
//! [`ShellHandler`] is the trait the compositor implements on its own state type to learn about
//! new toplevels and popups and to answer the requests ([`ShellHandler::request_move`] and
//! friends) that this crate cannot itself act on.
//!
//! ## Roles
//!
//! A plain `xdg_surface` has no role and cannot be mapped. Calling `get_toplevel` or `get_popup`
//! assigns it the `xdg_toplevel` or `xdg_popup` role (mirroring [`compositor::give_role`]) and
//! attaches the bookkeeping this module needs: [`ToplevelSurface`] and [`PopupSurface`] are cheap
//! handles onto that bookkeeping, not owners of it — the real state lives in the surface's
//! [`compositor::SurfaceData::data_map`], keyed on `Mutex<SurfaceState>`.
//!
//! ## Configure life cycle
//!
//! Mutating a toplevel's pending state (`set_title`, `set_maximized`, ...) never sends a
//! `configure` event by itself. Instead it schedules one on an idle callback, coalescing any
//! number of pending changes made within the same iteration of the event loop into a single
//! configure, and cancelling that configure if the pending state reverts to whatever was last
//! sent. [`PopupSurface`] is simpler: it has exactly one configure, sent on the popup's first
//! commit.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use calloop::timer::{TimeoutAction, Timer};
use calloop::LoopHandle;
use tracing::{debug, trace, warn};

use wayland_protocols::xdg::shell::server::{
    xdg_popup::XdgPopup,
    xdg_positioner::XdgPositioner,
    xdg_surface::XdgSurface,
    xdg_toplevel::{self, XdgToplevel},
    xdg_wm_base::XdgWmBase,
};
use wayland_server::{
    backend::{ClientId, GlobalId, ObjectId},
    protocol::{wl_output::WlOutput, wl_seat::WlSeat, wl_surface::WlSurface},
    DisplayHandle, Dispatch, GlobalDispatch, Resource,
};

use crate::utils::alive_tracker::{AliveTracker, IsAlive};
use crate::utils::{Logical, Point, Rectangle, Serial, SERIAL_COUNTER};
use crate::wayland::compositor;

mod grab;
mod handlers;
mod positioner;

pub use grab::{GrabError, PopupGrab, PopupGrabSeat, PopupGrabs};
pub use positioner::PositionerState;

pub use handlers::{XdgPopupUserData, XdgPositionerUserData, XdgSurfaceUserData, XdgToplevelUserData};

/// The role string assigned to surfaces that become `xdg_toplevel`s.
pub const XDG_TOPLEVEL_ROLE: &str = "xdg_toplevel";
/// The role string assigned to surfaces that become `xdg_popup`s.
pub const XDG_POPUP_ROLE: &str = "xdg_popup";

/// Tunables for a [`ShellState`].
#[derive(Debug, Clone, Copy)]
pub struct ShellConfig {
    /// How long to wait for a client to answer a `ping` before treating it as unresponsive.
    pub ping_timeout: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            ping_timeout: Duration::from_secs(10),
        }
    }
}

/// The state of the `xdg_wm_base` global.
pub struct ShellState<D> {
    global: GlobalId,
    config: ShellConfig,
    loop_handle: LoopHandle<'static, D>,
    grabs: PopupGrabs<D>,
    toplevels: Vec<ToplevelSurface>,
    popups: Vec<PopupSurface>,
}

impl<D> fmt::Debug for ShellState<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellState")
            .field("global", &self.global)
            .field("config", &self.config)
            .field("toplevels", &self.toplevels)
            .field("popups", &self.popups)
            .finish_non_exhaustive()
    }
}

impl<D> ShellState<D>
where
    D: ShellHandler + 'static,
{
    /// Register the `xdg_wm_base` global with the default [`ShellConfig`].
    pub fn new(display: &DisplayHandle, loop_handle: LoopHandle<'static, D>) -> Self
    where
        D: GlobalDispatch<XdgWmBase, ()>
            + Dispatch<XdgWmBase, XdgWmBaseUserData>
            + Dispatch<XdgPositioner, XdgPositionerUserData>
            + Dispatch<XdgSurface, XdgSurfaceUserData>
            + Dispatch<XdgToplevel, XdgToplevelUserData>
            + Dispatch<XdgPopup, XdgPopupUserData>
            + 'static,
    {
        Self::with_config(display, loop_handle, ShellConfig::default())
    }

    /// Register the `xdg_wm_base` global with a custom [`ShellConfig`].
    pub fn with_config(display: &DisplayHandle, loop_handle: LoopHandle<'static, D>, config: ShellConfig) -> Self
    where
        D: GlobalDispatch<XdgWmBase, ()>
            + Dispatch<XdgWmBase, XdgWmBaseUserData>
            + Dispatch<XdgPositioner, XdgPositionerUserData>
            + Dispatch<XdgSurface, XdgSurfaceUserData>
            + Dispatch<XdgToplevel, XdgToplevelUserData>
            + Dispatch<XdgPopup, XdgPopupUserData>
            + 'static,
    {
        let global = display.create_global::<D, XdgWmBase, _>(1, ());
        ShellState {
            global,
            config,
            loop_handle,
            grabs: PopupGrabs::default(),
            toplevels: Vec::new(),
            popups: Vec::new(),
        }
    }

    /// The [`GlobalId`] of the `xdg_wm_base` global.
    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    /// The configuration this shell was created with.
    pub fn config(&self) -> ShellConfig {
        self.config
    }

    /// All toplevels currently known to the shell, in creation order.
    pub fn toplevel_surfaces(&self) -> &[ToplevelSurface] {
        &self.toplevels
    }

    /// All popups currently known to the shell, in creation order.
    pub fn popup_surfaces(&self) -> &[PopupSurface] {
        &self.popups
    }

    /// Find the topmost popup (and the point within it, in its own surface-local coordinates)
    /// under `(x, y)` in `surface`'s coordinate space, recursing through nested popup chains.
    ///
    /// `surface` is typically a toplevel's [`WlSurface`], but may also be a popup's, to continue
    /// a search that has already descended one level.
    pub fn popup_at(&self, surface: &WlSurface, x: f64, y: f64) -> Option<(PopupSurface, f64, f64)> {
        for popup in self.popups.iter().rev() {
            if popup.parent_surface().as_ref() != Some(surface) {
                continue;
            }
            let geo = popup.current_geometry();
            let local_x = x - geo.loc.x as f64;
            let local_y = y - geo.loc.y as f64;
            if local_x < 0.0 || local_y < 0.0 || local_x >= geo.size.w as f64 || local_y >= geo.size.h as f64 {
                continue;
            }
            if !point_in_input_region(&popup.wl_surface, local_x, local_y) {
                continue;
            }
            if let Some(deeper) = self.popup_at(&popup.wl_surface, local_x, local_y) {
                return Some(deeper);
            }
            return Some((popup.clone(), local_x, local_y));
        }
        None
    }

    pub(crate) fn loop_handle(&self) -> LoopHandle<'static, D> {
        self.loop_handle.clone()
    }

    pub(crate) fn grabs(&mut self) -> &mut PopupGrabs<D> {
        &mut self.grabs
    }

    /// Run `f` against the popup grab table with full `&mut D` access.
    ///
    /// [`PopupGrabs::request_grab`] and [`PopupGrabs::popup_destroyed`] need `&mut D` themselves
    /// (to reach the seat through [`PopupGrabSeat`]), which a plain `&mut self.grabs` borrow of
    /// `state.shell_state()` would conflict with. Swapping the table out for the duration of `f`
    /// sidesteps that: the table is `Default`, so the swap is a cheap `HashMap::new()`.
    pub(crate) fn with_grabs<R>(state: &mut D, f: impl FnOnce(&mut D, &mut PopupGrabs<D>) -> R) -> R {
        let mut grabs = std::mem::take(&mut state.shell_state().grabs);
        let result = f(state, &mut grabs);
        state.shell_state().grabs = grabs;
        result
    }

    fn track_toplevel(&mut self, surface: ToplevelSurface) {
        self.toplevels.push(surface);
    }

    fn untrack_toplevel(&mut self, surface: &ToplevelSurface) {
        self.toplevels.retain(|t| t.xdg_toplevel != surface.xdg_toplevel);
    }

    fn track_popup(&mut self, surface: PopupSurface) {
        self.popups.push(surface);
    }

    fn untrack_popup(&mut self, surface: &PopupSurface) {
        self.popups.retain(|p| p.xdg_popup != surface.xdg_popup);
    }
}

fn point_in_input_region(surface: &WlSurface, x: f64, y: f64) -> bool {
    compositor::with_states(surface, |states| {
        let attrs = states.cached_state.current::<compositor::SurfaceAttributes>();
        match &attrs.input_region {
            None => true,
            Some(region) => {
                let mut inside = false;
                for (kind, rect) in &region.rects {
                    let contains = (x as i32) >= rect.loc.x
                        && (y as i32) >= rect.loc.y
                        && (x as i32) < rect.loc.x + rect.size.w
                        && (y as i32) < rect.loc.y + rect.size.h;
                    match kind {
                        compositor::RectangleKind::Add => inside |= contains,
                        compositor::RectangleKind::Subtract => {
                            if contains {
                                inside = false;
                            }
                        }
                    }
                }
                inside
            }
        }
    })
}

/// The role-specific payload of an acknowledged configure, passed to [`ShellHandler::ack_configure`].
#[derive(Debug, Clone)]
pub enum Configure {
    /// The acknowledged configure was sent to a toplevel.
    Toplevel(ToplevelConfigure),
    /// The acknowledged configure was sent to a popup.
    Popup(PopupConfigure),
}

/// A toplevel configure that has just been acknowledged by the client.
#[derive(Debug, Clone)]
pub struct ToplevelConfigure {
    /// The serial of the acknowledged configure.
    pub serial: Serial,
    /// The toplevel state this configure carried.
    pub state: ToplevelState,
}

/// A popup configure that has just been acknowledged by the client.
#[derive(Debug, Clone)]
pub struct PopupConfigure {
    /// The serial of the acknowledged configure.
    pub serial: Serial,
    /// The popup geometry this configure carried.
    pub geometry: Rectangle<i32, Logical>,
}

/// A toplevel or a popup, used where either can appear (ping timeouts, client-wide bookkeeping).
#[derive(Debug, Clone)]
pub enum ShellSurface {
    /// A toplevel window.
    Toplevel(ToplevelSurface),
    /// A popup.
    Popup(PopupSurface),
}

impl ShellSurface {
    /// The underlying `wl_surface`.
    pub fn wl_surface(&self) -> &WlSurface {
        match self {
            ShellSurface::Toplevel(t) => &t.wl_surface,
            ShellSurface::Popup(p) => &p.wl_surface,
        }
    }
}

/// Handler trait for the `xdg_shell` protocol.
///
/// Only [`new_toplevel`](ShellHandler::new_toplevel) and [`new_popup`](ShellHandler::new_popup)
/// are required; every other method has a no-op default and exists so the crate can forward a
/// request it cannot itself act on (moving or resizing a window has no meaning without a seat and
/// a renderer, both outside this crate's scope).
#[allow(unused_variables)]
pub trait ShellHandler: Sized {
    /// [`ShellState`] getter.
    fn shell_state(&mut self) -> &mut ShellState<Self>;

    /// A new shell client connected (its first `xdg_wm_base` object was bound).
    fn new_client(&mut self, client: ShellClient) {}

    /// A client answered a pending ping in time.
    fn client_pong(&mut self, client: ShellClient) {}

    /// A client's `xdg_wm_base` object was destroyed.
    fn client_destroyed(&mut self, client: ShellClient) {}

    /// A client failed to answer a ping before [`ShellConfig::ping_timeout`] elapsed. `surface`
    /// is one of possibly several surfaces belonging to that client; this is called once per
    /// surface it owns.
    fn ping_timeout(&mut self, surface: ShellSurface) {}

    /// A surface was just given the `xdg_toplevel` role.
    fn new_toplevel(&mut self, surface: ToplevelSurface);

    /// A surface was just given the `xdg_popup` role.
    fn new_popup(&mut self, surface: PopupSurface, positioner: PositionerState);

    /// A surface completed its first configure/ack/commit-with-buffer cycle and is now mapped.
    fn surface_mapped(&mut self, surface: ShellSurface) {}

    /// The client acknowledged a configure.
    fn ack_configure(&mut self, surface: WlSurface, configure: Configure) {}

    /// A toplevel's role object was destroyed.
    fn toplevel_destroyed(&mut self, surface: ToplevelSurface) {}

    /// A popup's role object was destroyed. `topmost` is `false` if the popup was destroyed out
    /// of order (it was not the topmost popup of its grab chain); the caller already posted the
    /// corresponding protocol error.
    fn popup_destroyed(&mut self, surface: PopupSurface) {}

    /// The client requested an interactive move, started from `serial`.
    fn request_move(&mut self, surface: ToplevelSurface, seat: WlSeat, serial: Serial) {}

    /// The client requested an interactive resize, started from `serial`.
    fn request_resize(&mut self, surface: ToplevelSurface, seat: WlSeat, serial: Serial, edges: xdg_toplevel::ResizeEdge) {}

    /// The client requested the window menu be shown at `(x, y)` relative to the window.
    fn request_show_window_menu(&mut self, surface: ToplevelSurface, seat: WlSeat, serial: Serial, x: i32, y: i32) {}

    /// The client requested (or unrequested) maximized state. Inspect
    /// `surface.pending_state().maximized` to tell which: both `set_maximized` and
    /// `unset_maximized` forward here.
    fn request_maximize(&mut self, surface: ToplevelSurface) {}

    /// The client requested fullscreen, optionally on a specific output.
    fn request_fullscreen(&mut self, surface: ToplevelSurface, output: Option<WlOutput>) {}

    /// The client requested to leave fullscreen.
    fn request_unfullscreen(&mut self, surface: ToplevelSurface) {}

    /// The client requested to be minimized.
    fn request_minimize(&mut self, surface: ToplevelSurface) {}
}

/// Per-client shell state, stored on the client's `xdg_wm_base` resource.
#[derive(Debug, Default)]
pub(crate) struct ShellClientData {
    pending_ping: Option<Serial>,
    ping_timer: Option<calloop::RegistrationToken>,
    surfaces: Vec<ShellSurface>,
    data: crate::utils::UserDataMap,
}

/// A handle to a client's `xdg_wm_base` object.
#[derive(Debug, Clone)]
pub struct ShellClient {
    wm_base: XdgWmBase,
}

impl PartialEq for ShellClient {
    fn eq(&self, other: &Self) -> bool {
        self.wm_base == other.wm_base
    }
}

impl ShellClient {
    pub(crate) fn new(wm_base: &XdgWmBase) -> Self {
        ShellClient { wm_base: wm_base.clone() }
    }

    /// Whether the underlying `xdg_wm_base` resource is still alive.
    pub fn alive(&self) -> bool {
        self.wm_base.alive()
    }

    pub(crate) fn id(&self) -> ObjectId {
        self.wm_base.id()
    }

    /// Access the client-scoped user data map for this shell client.
    pub fn with_data<T>(&self, f: impl FnOnce(&crate::utils::UserDataMap) -> T) -> Option<T> {
        let data: &XdgWmBaseUserData = self.wm_base.data()?;
        let guard = data.client_data.lock().unwrap();
        Some(f(&guard.data))
    }

    /// Send a `ping` to the client, arming a timer for [`ShellConfig::ping_timeout`]. A no-op if
    /// a ping is already pending or the client is dead.
    pub fn ping<D>(&self, state: &mut D)
    where
        D: ShellHandler + 'static,
    {
        if !self.alive() {
            return;
        }
        let Some(data) = self.wm_base.data::<XdgWmBaseUserData>() else {
            return;
        };

        let mut guard = data.client_data.lock().unwrap();
        if guard.pending_ping.is_some() {
            return;
        }
        let serial = SERIAL_COUNTER.next_serial();
        guard.pending_ping = Some(serial);

        let timeout = state.shell_state().config.ping_timeout;
        let client = self.clone();
        let token = state
            .shell_state()
            .loop_handle()
            .insert_source(Timer::from_duration(timeout), move |_, _, state: &mut D| {
                client.handle_ping_timeout(state);
                TimeoutAction::Drop
            })
            .ok();
        guard.ping_timer = token;
        drop(guard);

        self.wm_base.ping(serial.into());
        trace!(client = ?self.id(), ?serial, "sent ping");
    }

    fn handle_ping_timeout<D>(&self, state: &mut D)
    where
        D: ShellHandler + 'static,
    {
        let Some(data) = self.wm_base.data::<XdgWmBaseUserData>() else {
            return;
        };
        let surfaces = {
            let mut guard = data.client_data.lock().unwrap();
            guard.pending_ping = None;
            guard.ping_timer = None;
            guard.surfaces.clone()
        };
        warn!(client = ?self.id(), "client did not respond to ping in time");
        for surface in surfaces {
            state.ping_timeout(surface);
        }
    }

    pub(crate) fn handle_pong<D>(state: &mut D, wm_base: &XdgWmBase, serial: Serial)
    where
        D: ShellHandler + 'static,
    {
        let client = ShellClient::new(wm_base);
        let Some(data) = wm_base.data::<XdgWmBaseUserData>() else {
            return;
        };

        let token = {
            let mut guard = data.client_data.lock().unwrap();
            if guard.pending_ping != Some(serial) {
                return;
            }
            guard.pending_ping = None;
            guard.ping_timer.take()
        };
        if let Some(token) = token {
            state.shell_state().loop_handle().remove(token);
        }
        state.client_pong(client);
    }

    pub(crate) fn track_surface(&self, surface: ShellSurface) {
        if let Some(data) = self.wm_base.data::<XdgWmBaseUserData>() {
            data.client_data.lock().unwrap().surfaces.push(surface);
        }
    }

    pub(crate) fn untrack_surface(&self, wl_surface: &WlSurface) {
        if let Some(data) = self.wm_base.data::<XdgWmBaseUserData>() {
            data.client_data
                .lock()
                .unwrap()
                .surfaces
                .retain(|s| s.wl_surface() != wl_surface);
        }
    }
}

/// User data for `xdg_wm_base`.
#[derive(Debug, Default)]
pub struct XdgWmBaseUserData {
    pub(crate) client_data: Mutex<ShellClientData>,
}

/// The dimensioned, configure/ack-correlated state of a toplevel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToplevelState {
    /// Width in logical pixels, or `0` to let the client choose.
    pub width: i32,
    /// Height in logical pixels, or `0` to let the client choose.
    pub height: i32,
    /// Whether the toplevel is the active window.
    pub activated: bool,
    /// Whether the toplevel is maximized.
    pub maximized: bool,
    /// Whether the toplevel is fullscreen.
    pub fullscreen: bool,
    /// Whether the toplevel is in the middle of an interactive resize.
    pub resizing: bool,
}

fn toplevel_states_equal(pending: &ToplevelState, baseline: &ToplevelState) -> bool {
    let size_equal = if pending.width == 0 && pending.height == 0 {
        true
    } else {
        pending.width == baseline.width && pending.height == baseline.height
    };
    size_equal
        && pending.activated == baseline.activated
        && pending.maximized == baseline.maximized
        && pending.fullscreen == baseline.fullscreen
        && pending.resizing == baseline.resizing
}

/// Persistent, non-configure-correlated toplevel attributes.
#[derive(Debug, Default)]
struct ToplevelAttributes {
    title: Option<String>,
    app_id: Option<String>,
    parent: Option<WlSurface>,
    min_size: crate::utils::Size<i32, Logical>,
    max_size: crate::utils::Size<i32, Logical>,
    current: ToplevelState,
    pending: ToplevelState,
    next: ToplevelState,
    first_configure_scheduled: bool,
}

/// Persistent popup attributes.
#[derive(Debug)]
struct PopupAttributes {
    parent: Option<WlSurface>,
    parent_is_toplevel: bool,
    positioner: PositionerState,
    geometry: Rectangle<i32, Logical>,
    committed: bool,
    seat: Option<WlSeat>,
}

#[derive(Debug)]
enum Role {
    None,
    Toplevel(ToplevelAttributes),
    Popup(PopupAttributes),
}

/// One outstanding, not-yet-acknowledged configure.
#[derive(Debug, Clone)]
struct ConfigureRecord {
    serial: Serial,
    toplevel_state: Option<ToplevelState>,
}

/// The shared, role-agnostic bookkeeping stored in a surface's `data_map`.
#[derive(Debug)]
pub(crate) struct SurfaceState {
    wm_base: XdgWmBase,
    xdg_surface: XdgSurface,
    client: ShellClient,
    geometry: Rectangle<i32, Logical>,
    next_geometry: Option<Rectangle<i32, Logical>>,
    configure_list: Vec<ConfigureRecord>,
    configure_idle: Option<Arc<AtomicBool>>,
    configure_next_serial: Option<Serial>,
    configured: bool,
    added: bool,
    role: Role,
}

impl SurfaceState {
    fn new(wm_base: XdgWmBase, xdg_surface: XdgSurface, client: ShellClient) -> Self {
        SurfaceState {
            wm_base,
            xdg_surface,
            client,
            geometry: Rectangle::from_loc_and_size((0, 0), (0, 0)),
            next_geometry: None,
            configure_list: Vec::new(),
            configure_idle: None,
            configure_next_serial: None,
            configured: false,
            added: false,
            role: Role::None,
        }
    }

    fn toplevel_baseline(&self) -> ToplevelState {
        if let Some(last) = self.configure_list.last() {
            last.toplevel_state.clone().unwrap_or_default()
        } else if let Role::Toplevel(t) = &self.role {
            t.current.clone()
        } else {
            ToplevelState::default()
        }
    }

    fn ack(&mut self, serial: Serial) -> Result<Configure, AckError> {
        let mut found = None;
        self.configure_list.retain(|record| {
            if found.is_some() {
                return true;
            }
            if record.serial == serial {
                found = Some(record.clone());
                false
            } else if record.serial < serial {
                false
            } else {
                true
            }
        });
        let record = found.ok_or(AckError::InvalidSerial)?;

        self.configured = true;

        match &mut self.role {
            Role::Toplevel(t) => {
                let toplevel_state = record.toplevel_state.clone().unwrap_or_default();
                t.next = toplevel_state.clone();
                t.pending.width = 0;
                t.pending.height = 0;
                Ok(Configure::Toplevel(ToplevelConfigure {
                    serial,
                    state: toplevel_state,
                }))
            }
            Role::Popup(p) => Ok(Configure::Popup(PopupConfigure {
                serial,
                geometry: p.geometry,
            })),
            Role::None => Err(AckError::InvalidSerial),
        }
    }
}

#[derive(Debug)]
enum AckError {
    InvalidSerial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScheduleAction {
    /// Nothing is scheduled and the pending state matches the baseline: do nothing.
    NoOp,
    /// An idle is already scheduled and still matches: keep it, reuse its serial.
    KeepIdle,
    /// An idle is scheduled but the pending state reverted to the baseline: cancel it.
    CancelIdle,
    /// Nothing is scheduled and the pending state differs from the baseline: arm a new idle.
    Arm,
}

fn compute_schedule_action(pending_same: bool, idle_scheduled: bool) -> ScheduleAction {
    match (idle_scheduled, pending_same) {
        (true, true) => ScheduleAction::CancelIdle,
        (true, false) => ScheduleAction::KeepIdle,
        (false, true) => ScheduleAction::NoOp,
        (false, false) => ScheduleAction::Arm,
    }
}

fn encode_toplevel_states(state: &ToplevelState) -> Vec<u8> {
    let mut states = Vec::new();
    let mut push = |value: xdg_toplevel::State| states.extend_from_slice(&(value as u32).to_ne_bytes());
    if state.maximized {
        push(xdg_toplevel::State::Maximized);
    }
    if state.fullscreen {
        push(xdg_toplevel::State::Fullscreen);
    }
    if state.resizing {
        push(xdg_toplevel::State::Resizing);
    }
    if state.activated {
        push(xdg_toplevel::State::Activated);
    }
    states
}

/// Schedule (or cancel, or reuse) a toplevel configure, coalescing changes made within the same
/// iteration of the event loop into a single idle callback. Returns the serial that will be (or
/// already was) sent; `Serial::from(0)` if nothing is scheduled.
fn schedule_toplevel_configure<D>(state: &mut D, wl_surface: &WlSurface) -> Serial
where
    D: ShellHandler + 'static,
{
    let (action, existing_serial) = compositor::with_states(wl_surface, |states| {
        let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
        let data = cell.lock().unwrap();
        let baseline = data.toplevel_baseline();
        let pending = match &data.role {
            Role::Toplevel(t) => t.pending.clone(),
            _ => unreachable!("schedule_toplevel_configure called on a non-toplevel surface"),
        };
        let pending_same = toplevel_states_equal(&pending, &baseline);
        let idle_scheduled = data.configure_idle.is_some();
        (
            compute_schedule_action(pending_same, idle_scheduled),
            data.configure_next_serial,
        )
    });

    match action {
        ScheduleAction::NoOp => Serial::from(0),
        ScheduleAction::KeepIdle => existing_serial.unwrap_or(Serial::from(0)),
        ScheduleAction::CancelIdle => {
            compositor::with_states(wl_surface, |states| {
                let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
                let mut data = cell.lock().unwrap();
                if let Some(flag) = data.configure_idle.take() {
                    flag.store(true, Ordering::SeqCst);
                }
                data.configure_next_serial = None;
            });
            Serial::from(0)
        }
        ScheduleAction::Arm => {
            let serial = SERIAL_COUNTER.next_serial();
            let cancelled = Arc::new(AtomicBool::new(false));
            compositor::with_states(wl_surface, |states| {
                let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
                let mut data = cell.lock().unwrap();
                data.configure_idle = Some(cancelled.clone());
                data.configure_next_serial = Some(serial);
            });

            let surface = wl_surface.clone();
            state.shell_state().loop_handle().insert_idle(move |state: &mut D| {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                send_toplevel_configure(state, &surface, serial);
            });

            serial
        }
    }
}

fn send_toplevel_configure<D>(state: &mut D, wl_surface: &WlSurface, serial: Serial)
where
    D: ShellHandler + 'static,
{
    let (xdg_surface, width, height, wire_states) = compositor::with_states(wl_surface, |states| {
        let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
        let mut data = cell.lock().unwrap();
        data.configure_idle = None;
        data.configure_next_serial = None;

        let toplevel_state = match &data.role {
            Role::Toplevel(t) => {
                let mut pending = t.pending.clone();
                if pending.width == 0 {
                    pending.width = data.geometry.size.w;
                }
                if pending.height == 0 {
                    pending.height = data.geometry.size.h;
                }
                pending
            }
            _ => unreachable!(),
        };
        let wire_states = encode_toplevel_states(&toplevel_state);
        let xdg_surface = data.xdg_surface.clone();
        data.configure_list.push(ConfigureRecord {
            serial,
            toplevel_state: Some(toplevel_state.clone()),
        });
        (xdg_surface, toplevel_state.width, toplevel_state.height, wire_states)
    });

    let Some(xdg_toplevel) = find_xdg_toplevel(wl_surface) else {
        return;
    };
    xdg_toplevel.configure(width, height, wire_states);
    xdg_surface.configure(serial.into());
    debug!(?serial, width, height, "sent toplevel configure");
    maybe_emit_mapped(state, wl_surface);
}

fn find_xdg_toplevel(wl_surface: &WlSurface) -> Option<XdgToplevel> {
    compositor::with_states(wl_surface, |states| {
        states
            .data_map
            .get::<XdgToplevelUserData>()
            .map(|data| data.xdg_toplevel.clone())
    })
}

fn send_popup_configure<D>(state: &mut D, wl_surface: &WlSurface)
where
    D: ShellHandler + 'static,
{
    let serial = SERIAL_COUNTER.next_serial();
    let (xdg_surface, geometry) = compositor::with_states(wl_surface, |states| {
        let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
        let mut data = cell.lock().unwrap();
        let geometry = match &data.role {
            Role::Popup(p) => p.geometry,
            _ => unreachable!(),
        };
        data.configure_list.push(ConfigureRecord {
            serial,
            toplevel_state: None,
        });
        (data.xdg_surface.clone(), geometry)
    });

    if let Some(xdg_popup) = compositor::with_states(wl_surface, |states| {
        states.data_map.get::<XdgPopupUserData>().map(|d| d.xdg_popup.clone())
    }) {
        xdg_popup.configure(geometry.loc.x, geometry.loc.y, geometry.size.w, geometry.size.h);
        xdg_surface.configure(serial.into());
        debug!(?serial, ?geometry, "sent popup configure");
    }
    maybe_emit_mapped(state, wl_surface);
}

fn maybe_emit_mapped<D>(state: &mut D, wl_surface: &WlSurface)
where
    D: ShellHandler + 'static,
{
    let surface = compositor::with_states(wl_surface, |states| {
        let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
        let mut data = cell.lock().unwrap();
        if data.configured && !data.added {
            data.added = true;
            match &data.role {
                Role::Toplevel(_) => find_xdg_toplevel(wl_surface).map(|xdg_toplevel| {
                    ShellSurface::Toplevel(ToplevelSurface {
                        xdg_surface: data.xdg_surface.clone(),
                        xdg_toplevel,
                        wl_surface: wl_surface.clone(),
                    })
                }),
                Role::Popup(_) => states.data_map.get::<XdgPopupUserData>().map(|d| {
                    ShellSurface::Popup(PopupSurface {
                        xdg_surface: data.xdg_surface.clone(),
                        xdg_popup: d.xdg_popup.clone(),
                        wl_surface: wl_surface.clone(),
                    })
                }),
                Role::None => None,
            }
        } else {
            None
        }
    });
    if let Some(surface) = surface {
        state.surface_mapped(surface);
    }
}

/// Buffer-attachment prediction used by the pre-commit hook: whether, after this commit is
/// applied, the surface will have a buffer attached. Computed from the still-pending buffer
/// assignment (peeked, not consumed) together with the already-committed buffer state.
fn buffer_will_be_attached(states: &compositor::SurfaceData) -> bool {
    let pending = states.cached_state.pending::<compositor::SurfaceAttributes>();
    match &pending.buffer {
        Some(compositor::BufferAssignment::NewBuffer { .. }) => true,
        Some(compositor::BufferAssignment::Removed) => false,
        None => states
            .cached_state
            .current::<compositor::SurfaceAttributes>()
            .buffer
            .is_some(),
    }
}

enum CommitAction {
    None,
    UnconfiguredBuffer,
    ScheduleFirstToplevelConfigure,
    SendFirstPopupConfigure,
}

fn commit_hook<D>(state: &mut D, _dh: &DisplayHandle, wl_surface: &WlSurface)
where
    D: ShellHandler + 'static,
{
    let action = compositor::with_states(wl_surface, |states| {
        let Some(cell) = states.data_map.get::<Mutex<SurfaceState>>() else {
            return CommitAction::None;
        };
        let mut data = cell.lock().unwrap();

        let has_buffer = buffer_will_be_attached(states);

        if has_buffer && !data.configured {
            return CommitAction::UnconfiguredBuffer;
        }

        if let Some(next) = data.next_geometry.take() {
            data.geometry = next;
        }

        match &mut data.role {
            Role::None => CommitAction::None,
            Role::Toplevel(t) => {
                if has_buffer {
                    t.current = t.next.clone();
                    CommitAction::None
                } else if !t.first_configure_scheduled {
                    t.first_configure_scheduled = true;
                    CommitAction::ScheduleFirstToplevelConfigure
                } else {
                    CommitAction::None
                }
            }
            Role::Popup(p) => {
                if !p.committed {
                    p.committed = true;
                    CommitAction::SendFirstPopupConfigure
                } else {
                    CommitAction::None
                }
            }
        }
    });

    match action {
        CommitAction::None => {}
        CommitAction::UnconfiguredBuffer => {
            if let Some(xdg_surface) = compositor::with_states(wl_surface, |states| {
                states
                    .data_map
                    .get::<Mutex<SurfaceState>>()
                    .map(|cell| cell.lock().unwrap().xdg_surface.clone())
            }) {
                xdg_surface.post_error(
                    wayland_protocols::xdg::shell::server::xdg_surface::Error::UnconfiguredBuffer,
                    "buffer attached to an xdg_surface before it was configured",
                );
            }
        }
        CommitAction::ScheduleFirstToplevelConfigure => {
            schedule_toplevel_configure(state, wl_surface);
        }
        CommitAction::SendFirstPopupConfigure => {
            send_popup_configure(state, wl_surface);
        }
    }
}

/// A surface that has been given the `xdg_toplevel` role: an application window.
#[derive(Debug, Clone)]
pub struct ToplevelSurface {
    xdg_surface: XdgSurface,
    xdg_toplevel: XdgToplevel,
    wl_surface: WlSurface,
}

impl IsAlive for ToplevelSurface {
    fn alive(&self) -> bool {
        self.xdg_toplevel.alive() && self.wl_surface.alive()
    }
}

impl ToplevelSurface {
    pub(crate) fn from_parts(xdg_surface: XdgSurface, xdg_toplevel: XdgToplevel, wl_surface: WlSurface) -> Self {
        ToplevelSurface {
            xdg_surface,
            xdg_toplevel,
            wl_surface,
        }
    }

    /// The underlying `wl_surface`.
    pub fn wl_surface(&self) -> &WlSurface {
        &self.wl_surface
    }

    /// The `xdg_toplevel` resource.
    pub fn xdg_toplevel(&self) -> &XdgToplevel {
        &self.xdg_toplevel
    }

    /// The id of the client that owns this toplevel.
    pub fn client_id(&self) -> Option<ClientId> {
        self.wl_surface.client().map(|c| c.id())
    }

    /// The window-geometry last committed by the client (or a zero-sized rectangle if none has
    /// been set yet).
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        compositor::with_states(&self.wl_surface, |states| {
            states
                .data_map
                .get::<Mutex<SurfaceState>>()
                .map(|cell| cell.lock().unwrap().geometry)
                .unwrap_or_else(|| Rectangle::from_loc_and_size((0, 0), (0, 0)))
        })
    }

    /// The toplevel state last promoted to `current` (i.e. acked and then committed-with-buffer).
    pub fn current_state(&self) -> ToplevelState {
        compositor::with_states(&self.wl_surface, |states| match &states
            .data_map
            .get::<Mutex<SurfaceState>>()
            .unwrap()
            .lock()
            .unwrap()
            .role
        {
            Role::Toplevel(t) => t.current.clone(),
            _ => unreachable!(),
        })
    }

    /// The toplevel state requested by the client but not yet acknowledged.
    pub fn pending_state(&self) -> ToplevelState {
        self.with_attributes(|t| t.pending.clone())
    }

    /// Mutate the pending toplevel state. Does not by itself send a configure: call
    /// [`ToplevelSurface::send_configure`] afterwards.
    pub fn with_pending_state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut ToplevelState) -> T,
    {
        compositor::with_states(&self.wl_surface, |states| {
            let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
            let mut data = cell.lock().unwrap();
            match &mut data.role {
                Role::Toplevel(t) => f(&mut t.pending),
                _ => unreachable!(),
            }
        })
    }

    /// Schedule a configure for the current pending state. A no-op unless something about the
    /// pending state actually differs from the last configure sent.
    pub fn send_configure<D>(&self, state: &mut D) -> Serial
    where
        D: ShellHandler + 'static,
    {
        schedule_toplevel_configure(state, &self.wl_surface)
    }

    /// Set the window title. Takes effect immediately; unlike size and state flags, the title is
    /// not gated behind a configure/ack round trip.
    pub fn set_title(&self, title: String) {
        self.with_attributes(|t| t.title = Some(title));
    }

    /// The last title set by the client.
    pub fn title(&self) -> Option<String> {
        self.with_attributes(|t| t.title.clone())
    }

    /// Set the application id. Takes effect immediately, like [`ToplevelSurface::set_title`].
    pub fn set_app_id(&self, app_id: String) {
        self.with_attributes(|t| t.app_id = Some(app_id));
    }

    /// The last application id set by the client.
    pub fn app_id(&self) -> Option<String> {
        self.with_attributes(|t| t.app_id.clone())
    }

    pub(crate) fn set_parent(&self, parent: Option<WlSurface>) {
        self.with_attributes(|t| t.parent = parent);
    }

    /// The toplevel's parent, if any (`set_parent`).
    pub fn parent(&self) -> Option<WlSurface> {
        self.with_attributes(|t| t.parent.clone())
    }

    pub(crate) fn set_min_size(&self, size: crate::utils::Size<i32, Logical>) {
        self.with_attributes(|t| t.min_size = size);
    }

    pub(crate) fn set_max_size(&self, size: crate::utils::Size<i32, Logical>) {
        self.with_attributes(|t| t.max_size = size);
    }

    /// The minimum size hint last set by the client (`(0, 0)` means unconstrained).
    pub fn min_size(&self) -> crate::utils::Size<i32, Logical> {
        self.with_attributes(|t| t.min_size)
    }

    /// The maximum size hint last set by the client (`(0, 0)` means unconstrained).
    pub fn max_size(&self) -> crate::utils::Size<i32, Logical> {
        self.with_attributes(|t| t.max_size)
    }

    fn with_attributes<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut ToplevelAttributes) -> T,
    {
        compositor::with_states(&self.wl_surface, |states| {
            let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
            let mut data = cell.lock().unwrap();
            match &mut data.role {
                Role::Toplevel(t) => f(t),
                _ => unreachable!(),
            }
        })
    }

    /// Ask the client to close this toplevel (`xdg_toplevel.close`).
    pub fn send_close(&self) {
        self.xdg_toplevel.close();
    }

    pub(crate) fn commit_hook<D: ShellHandler + 'static>(state: &mut D, dh: &DisplayHandle, surface: &WlSurface) {
        commit_hook::<D>(state, dh, surface);
    }
}

/// A surface that has been given the `xdg_popup` role: a transient, positioner-placed surface.
#[derive(Debug, Clone)]
pub struct PopupSurface {
    xdg_surface: XdgSurface,
    xdg_popup: XdgPopup,
    wl_surface: WlSurface,
}

impl IsAlive for PopupSurface {
    fn alive(&self) -> bool {
        self.xdg_popup.alive() && self.wl_surface.alive()
    }
}

impl PopupSurface {
    pub(crate) fn from_parts(xdg_surface: XdgSurface, xdg_popup: XdgPopup, wl_surface: WlSurface) -> Self {
        PopupSurface {
            xdg_surface,
            xdg_popup,
            wl_surface,
        }
    }

    /// The underlying `wl_surface`.
    pub fn wl_surface(&self) -> &WlSurface {
        &self.wl_surface
    }

    /// The `xdg_popup` resource.
    pub fn xdg_popup(&self) -> &XdgPopup {
        &self.xdg_popup
    }

    /// The id of the client that owns this popup.
    pub fn client_id(&self) -> ClientId {
        self.wl_surface
            .client()
            .map(|c| c.id())
            .expect("popup surface outlived its client")
    }

    /// The positioner-derived geometry this popup was created (and configured) with.
    pub fn current_geometry(&self) -> Rectangle<i32, Logical> {
        self.with_attributes(|p| p.geometry)
    }

    /// The positioner the popup was created with.
    pub fn positioner(&self) -> PositionerState {
        self.with_attributes(|p| p.positioner)
    }

    /// The popup's parent surface, if it is still alive.
    pub fn parent_surface(&self) -> Option<WlSurface> {
        self.with_attributes(|p| p.parent.clone())
    }

    /// Whether the popup's parent is a toplevel (as opposed to another popup).
    pub fn parent_is_toplevel(&self) -> bool {
        self.with_attributes(|p| p.parent_is_toplevel)
    }

    /// Whether the popup has received its first commit (and so its single configure has already
    /// been scheduled).
    pub fn has_committed(&self) -> bool {
        self.with_attributes(|p| p.committed)
    }

    pub(crate) fn set_seat(&self, seat: WlSeat) {
        self.with_attributes(|p| p.seat = Some(seat));
    }

    /// The seat this popup's grab (if any) is bound to.
    pub fn seat(&self) -> Option<WlSeat> {
        self.with_attributes(|p| p.seat.clone())
    }

    fn with_attributes<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut PopupAttributes) -> T,
    {
        compositor::with_states(&self.wl_surface, |states| {
            let cell = states.data_map.get::<Mutex<SurfaceState>>().unwrap();
            let mut data = cell.lock().unwrap();
            match &mut data.role {
                Role::Popup(p) => f(p),
                _ => unreachable!(),
            }
        })
    }

    /// Dismiss the popup (`xdg_popup.popup_done`), e.g. because its parent closed or a grab
    /// ended the whole chain.
    pub fn send_popup_done(&self) {
        self.xdg_popup.popup_done();
    }

    pub(crate) fn commit_hook<D: ShellHandler + 'static>(state: &mut D, dh: &DisplayHandle, surface: &WlSurface) {
        commit_hook::<D>(state, dh, surface);
    }
}

/// Implement the `wayland_server` dispatch traits needed to run an [`ShellState`] on `$ty`.
#[macro_export]
macro_rules! delegate_xdg_shell {
    ($(@<$( $lt:tt $( : $clt:tt $(+ $dlt:tt )* )? ),+>)? $ty: ty) => {
        $crate::reexports::wayland_server::delegate_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_protocols::xdg::shell::server::xdg_wm_base::XdgWmBase: $crate::wayland::shell::xdg::XdgWmBaseUserData
        ] => $crate::wayland::shell::xdg::ShellState<$ty>);
        $crate::reexports::wayland_server::delegate_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_protocols::xdg::shell::server::xdg_positioner::XdgPositioner: $crate::wayland::shell::xdg::XdgPositionerUserData
        ] => $crate::wayland::shell::xdg::ShellState<$ty>);
        $crate::reexports::wayland_server::delegate_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_protocols::xdg::shell::server::xdg_surface::XdgSurface: $crate::wayland::shell::xdg::XdgSurfaceUserData
        ] => $crate::wayland::shell::xdg::ShellState<$ty>);
        $crate::reexports::wayland_server::delegate_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_protocols::xdg::shell::server::xdg_toplevel::XdgToplevel: $crate::wayland::shell::xdg::XdgToplevelUserData
        ] => $crate::wayland::shell::xdg::ShellState<$ty>);
        $crate::reexports::wayland_server::delegate_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_protocols::xdg::shell::server::xdg_popup::XdgPopup: $crate::wayland::shell::xdg::XdgPopupUserData
        ] => $crate::wayland::shell::xdg::ShellState<$ty>);

        $crate::reexports::wayland_server::delegate_global_dispatch!($(@< $( $lt $( : $clt $(+ $dlt )* )? ),+ >)? $ty: [
            $crate::reexports::wayland_protocols::xdg::shell::server::xdg_wm_base::XdgWmBase: ()
        ] => $crate::wayland::shell::xdg::ShellState<$ty>);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(width: i32, height: i32, activated: bool, maximized: bool, fullscreen: bool, resizing: bool) -> ToplevelState {
        ToplevelState {
            width,
            height,
            activated,
            maximized,
            fullscreen,
            resizing,
        }
    }

    #[test]
    fn zero_size_pending_is_always_equal_on_size() {
        let baseline = state(800, 600, true, false, false, false);
        let pending = state(0, 0, true, false, false, false);
        assert!(toplevel_states_equal(&pending, &baseline));
    }

    #[test]
    fn differing_size_is_not_equal() {
        let baseline = state(800, 600, true, false, false, false);
        let pending = state(801, 600, true, false, false, false);
        assert!(!toplevel_states_equal(&pending, &baseline));
    }

    #[test]
    fn differing_flags_are_not_equal() {
        let baseline = state(800, 600, true, false, false, false);
        let pending = state(0, 0, true, true, false, false);
        assert!(!toplevel_states_equal(&pending, &baseline));
    }

    #[test]
    fn schedule_decision_matrix() {
        assert_eq!(compute_schedule_action(true, false), ScheduleAction::NoOp);
        assert_eq!(compute_schedule_action(false, false), ScheduleAction::Arm);
        assert_eq!(compute_schedule_action(false, true), ScheduleAction::KeepIdle);
        assert_eq!(compute_schedule_action(true, true), ScheduleAction::CancelIdle);
    }

    #[test]
    fn encode_states_packs_only_set_flags() {
        let none = encode_toplevel_states(&ToplevelState::default());
        assert!(none.is_empty());

        let activated = encode_toplevel_states(&state(0, 0, true, false, false, false));
        assert_eq!(activated.len(), 4);
    }
}
