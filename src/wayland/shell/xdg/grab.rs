//! The popup grab manager.
//!
//! A popup grab is a cooperative, exclusive-input session bound to a chain of nested popups
//! belonging to one client on one input seat. [`PopupGrab`] is the object the seat dispatches
//! pointer and keyboard events into while the grab is active; [`PopupGrabSeat`] is the capability
//! the owning compositor state must provide so that this crate can forward those events (and
//! start/end the underlying seat-level grabs) without depending on a concrete seat
//! implementation.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use wayland_protocols::xdg::shell::server::xdg_popup::XdgPopup;
use wayland_server::{backend::ObjectId, protocol::wl_seat::WlSeat, protocol::wl_surface::WlSurface, Resource};

use crate::utils::Serial;

use super::PopupSurface;

/// Capabilities a compositor's input seat must expose for this crate's popup grabs to operate.
///
/// Implemented directly on the compositor's global state type `D`; a [`PopupGrab<D>`] never
/// touches the seat itself, it only calls back through these methods with `&mut D` in scope,
/// mirroring how [`super::ShellHandler`] is implemented on `D` rather than on some intermediate
/// object.
#[allow(unused_variables)]
pub trait PopupGrabSeat: Sized {
    /// Start a pointer grab on `seat`, routing subsequent pointer events to `grab`.
    fn start_pointer_grab(&mut self, seat: &WlSeat, grab: PopupGrab<Self>);
    /// Start a keyboard grab on `seat`, routing subsequent keyboard events to `grab`.
    fn start_keyboard_grab(&mut self, seat: &WlSeat, grab: PopupGrab<Self>);
    /// End whatever pointer grab is currently active on `seat`.
    fn end_pointer_grab(&mut self, seat: &WlSeat);
    /// End whatever keyboard grab is currently active on `seat`.
    fn end_keyboard_grab(&mut self, seat: &WlSeat);
    /// Forward a pointer enter to `surface` as if no grab were active.
    fn send_enter(&mut self, seat: &WlSeat, surface: &WlSurface, sx: f64, sy: f64);
    /// Clear the seat's pointer focus without entering any surface.
    fn clear_pointer_focus(&mut self, seat: &WlSeat);
    /// Forward a pointer motion event.
    fn send_motion(&mut self, seat: &WlSeat, time: u32, sx: f64, sy: f64);
    /// Forward a pointer button event. Returns the serial the seat assigned to it, or a nil
    /// serial (`Serial::from(0)`) if the seat had no focus or listener to send it to.
    fn send_button(&mut self, seat: &WlSeat, time: u32, button: u32, pressed: bool) -> Serial;
    /// Forward a pointer axis event.
    fn send_axis(&mut self, seat: &WlSeat, time: u32, axis: u32, value: f64);
    /// Forward a keyboard key event.
    fn send_key(&mut self, seat: &WlSeat, time: u32, key: u32, pressed: bool);
    /// Forward a keyboard modifiers event.
    fn send_modifiers(&mut self, seat: &WlSeat, mods_depressed: u32, mods_latched: u32, mods_locked: u32, group: u32);
    /// Validate that `serial` is a serial the seat actually produced (e.g. the serial of the
    /// button/key press that is supposed to authorize this grab request). A rejection here is
    /// logged and turns the request into a no-op; it is not a protocol error (§7).
    fn validate_grab_serial(&mut self, seat: &WlSeat, serial: Serial) -> bool;
}

#[derive(Debug)]
struct Inner {
    client: wayland_server::backend::ClientId,
    popups: Vec<PopupSurface>,
}

/// A popup grab: an ordered chain of popups from one client, bound to one seat.
///
/// Cloning a [`PopupGrab`] is cheap and yields a handle to the same underlying chain; this is
/// what is handed to a [`PopupGrabSeat`] implementation when a pointer or keyboard grab starts.
pub struct PopupGrab<D> {
    seat: WlSeat,
    inner: Arc<Mutex<Inner>>,
    _marker: PhantomData<fn(&mut D)>,
}

impl<D> fmt::Debug for PopupGrab<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupGrab")
            .field("seat", &self.seat.id())
            .field("inner", &self.inner)
            .finish()
    }
}

impl<D> Clone for PopupGrab<D> {
    fn clone(&self) -> Self {
        PopupGrab {
            seat: self.seat.clone(),
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

/// Error returned when a popup grab cannot be granted.
#[derive(Debug, thiserror::Error)]
pub enum GrabError {
    /// The popup already received its first commit; a grab may only be requested beforehand.
    #[error("a grab can only be requested before the popup's first commit")]
    AlreadyCommitted,
    /// The popup is not the topmost popup in the seat's current grab chain (or, when the chain
    /// is empty, its parent is not a toplevel).
    #[error("the popup is not the topmost popup in the grab chain")]
    NotTopmost,
}

impl<D: PopupGrabSeat + 'static> PopupGrab<D> {
    fn new(seat: WlSeat, client: wayland_server::backend::ClientId) -> Self {
        PopupGrab {
            seat,
            inner: Arc::new(Mutex::new(Inner {
                client,
                popups: Vec::new(),
            })),
            _marker: PhantomData,
        }
    }

    /// The client whose popups may participate in this grab.
    pub fn client(&self) -> wayland_server::backend::ClientId {
        self.inner.lock().unwrap().client.clone()
    }

    /// The current chain, topmost popup first.
    pub fn popups(&self) -> Vec<PopupSurface> {
        self.inner.lock().unwrap().popups.clone()
    }

    fn topmost(&self) -> Option<PopupSurface> {
        self.inner.lock().unwrap().popups.first().cloned()
    }

    fn is_topmost(&self, popup: &XdgPopup) -> bool {
        self.inner
            .lock()
            .unwrap()
            .popups
            .first()
            .map(|p| p.xdg_popup() == popup)
            .unwrap_or(false)
    }

    /// Pointer enter: forward to the seat if `surface` belongs to this grab's client, otherwise
    /// clear pointer focus.
    pub fn pointer_enter(&self, data: &mut D, surface: &WlSurface, sx: f64, sy: f64) {
        let owner = surface.client().map(|c| c.id());
        if owner.as_ref() == Some(&self.client()) {
            data.send_enter(&self.seat, surface, sx, sy);
        } else {
            data.clear_pointer_focus(&self.seat);
        }
    }

    /// Pointer motion: always forwarded to the seat.
    pub fn pointer_motion(&self, data: &mut D, time: u32, sx: f64, sy: f64) {
        data.send_motion(&self.seat, time, sx, sy);
    }

    /// Pointer button: forwarded to the seat; ends the grab if the seat reports no listener.
    pub fn pointer_button(&self, data: &mut D, time: u32, button: u32, pressed: bool) {
        let serial = data.send_button(&self.seat, time, button, pressed);
        if serial == Serial::from(0) {
            self.end(data);
        }
    }

    /// Pointer axis: always forwarded to the seat.
    pub fn pointer_axis(&self, data: &mut D, time: u32, axis: u32, value: f64) {
        data.send_axis(&self.seat, time, axis, value);
    }

    /// Pointer grab cancelled by the seat: end the whole popup grab.
    pub fn pointer_cancel(&self, data: &mut D) {
        self.end(data);
    }

    /// Keyboard enter is a no-op: focus never changes while a popup grab is active.
    pub fn keyboard_enter(&self, _data: &mut D, _surface: &WlSurface) {}

    /// Keyboard key event: always forwarded to the seat.
    pub fn keyboard_key(&self, data: &mut D, time: u32, key: u32, pressed: bool) {
        data.send_key(&self.seat, time, key, pressed);
    }

    /// Keyboard modifiers event: always forwarded to the seat.
    pub fn keyboard_modifiers(&self, data: &mut D, mods_depressed: u32, mods_latched: u32, mods_locked: u32, group: u32) {
        data.send_modifiers(&self.seat, mods_depressed, mods_latched, mods_locked, group);
    }

    /// Keyboard grab cancelled by the seat: ends only the keyboard side; the pointer grab (if
    /// still active) is left alone.
    pub fn keyboard_cancel(&self, data: &mut D) {
        debug!(seat = ?self.seat.id(), "popup grab keyboard side cancelled");
        data.end_keyboard_grab(&self.seat);
    }

    /// Dismiss the grab: notify every popup in the chain with `popup_done`, then end the seat's
    /// pointer grab (the seat resolves the keyboard side on its own via `cancel`).
    fn end(&self, data: &mut D) {
        let popups = {
            let mut inner = self.inner.lock().unwrap();
            std::mem::take(&mut inner.popups)
        };
        for popup in &popups {
            popup.xdg_popup().popup_done();
        }
        data.end_pointer_grab(&self.seat);
    }
}

/// Per-`(shell, seat)` table of active popup grabs.
///
/// A grab is created lazily the first time a popup requests one for a given seat, and is dropped
/// once its chain becomes empty, per §5's "PopupGrab ... reused per seat" ownership rule.
pub struct PopupGrabs<D> {
    grabs: HashMap<ObjectId, PopupGrab<D>>,
}

impl<D> fmt::Debug for PopupGrabs<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupGrabs").finish_non_exhaustive()
    }
}

impl<D> Default for PopupGrabs<D> {
    fn default() -> Self {
        PopupGrabs { grabs: HashMap::new() }
    }
}

impl<D: PopupGrabSeat + 'static> PopupGrabs<D> {
    /// Request that `popup` join the grab chain for `seat`.
    ///
    /// Implements §4.3's preconditions (popup not yet committed, correct topology) and, on
    /// success, starts the seat's pointer and keyboard grabs bound to this popup's chain.
    pub fn request_grab(
        &mut self,
        data: &mut D,
        popup: &PopupSurface,
        seat: WlSeat,
        serial: Serial,
    ) -> Result<(), GrabError> {
        if popup.has_committed() {
            return Err(GrabError::AlreadyCommitted);
        }

        let seat_id = seat.id();
        let grab = self
            .grabs
            .entry(seat_id.clone())
            .or_insert_with(|| PopupGrab::new(seat.clone(), popup.client_id()))
            .clone();

        let topmost = grab.topmost();
        let topology_ok = match &topmost {
            None => popup.parent_is_toplevel(),
            Some(top) => popup.parent_surface().as_ref() == Some(top.wl_surface()),
        };
        if !topology_ok {
            return Err(GrabError::NotTopmost);
        }

        if !data.validate_grab_serial(&seat, serial) {
            warn!(?serial, "seat rejected popup grab serial, ignoring request");
            return Ok(());
        }

        {
            let mut inner = grab.inner.lock().unwrap();
            inner.client = popup.client_id();
            inner.popups.insert(0, popup.clone());
        }
        popup.set_seat(seat.clone());

        debug!(seat = ?seat_id, popup = ?popup.xdg_popup().id(), "popup grab started");

        if topmost.is_none() {
            data.start_pointer_grab(&seat, grab.clone());
            data.start_keyboard_grab(&seat, grab);
        }

        Ok(())
    }

    /// Handle the destruction of `popup`, unlinking it from whatever grab it participates in.
    ///
    /// Per §4.3: destroying a non-topmost popup is a protocol violation (the caller posts
    /// `not_the_topmost_popup`) but unlinking still proceeds; if the chain becomes empty the
    /// seat grabs bound to it are ended.
    pub fn popup_destroyed(&mut self, data: &mut D, popup: &PopupSurface) -> bool {
        let Some(seat) = popup.seat() else {
            return true;
        };
        let seat_id = seat.id();
        let Some(grab) = self.grabs.get(&seat_id).cloned() else {
            return true;
        };

        let was_topmost = grab.is_topmost(popup.xdg_popup());

        {
            let mut inner = grab.inner.lock().unwrap();
            inner.popups.retain(|p| p.xdg_popup() != popup.xdg_popup());
        }

        if grab.popups().is_empty() {
            data.end_pointer_grab(&seat);
            data.end_keyboard_grab(&seat);
            self.grabs.remove(&seat_id);
        }

        was_topmost
    }
}
