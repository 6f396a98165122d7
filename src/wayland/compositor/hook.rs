use std::sync::Arc;

crate::utils::ids::id_gen!(next_hook_id, HOOK_ID, HOOK_IDS);

/// Unique hook identifier used to unregister commit/destruction hooks
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HookId(usize);

pub(super) struct Hook<T: ?Sized> {
    pub id: HookId,
    pub cb: Arc<T>,
}

impl<T: ?Sized> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cb: self.cb.clone(),
        }
    }
}

impl<T: ?Sized> Hook<T> {
    pub fn new(cb: Arc<T>) -> Self {
        Self {
            id: HookId(next_hook_id()),
            cb,
        }
    }
}
