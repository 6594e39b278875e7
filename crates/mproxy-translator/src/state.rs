use std::any::Any;

/// Opaque per-request state threaded through streaming translator calls.
///
/// The dispatch side owns one of these per request and passes it to every
/// stream/non-stream call for the same request, so translators can reassemble
/// partial frames and keep message-id allocation stable. Translators downcast
/// to their own state type; a fresh slot starts empty.
#[derive(Default)]
pub struct StreamState {
    slot: Option<Box<dyn Any + Send>>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the typed state, initializing it on first use.
    ///
    /// If a previous translator stored a different type here (which would be
    /// a wiring bug), the slot is reset rather than poisoned.
    pub fn get_or_insert_with<T, F>(&mut self, init: F) -> &mut T
    where
        T: Any + Send,
        F: FnOnce() -> T,
    {
        let fresh = match &self.slot {
            Some(existing) => !existing.is::<T>(),
            None => true,
        };
        if fresh {
            self.slot = Some(Box::new(init()));
        }
        self.slot
            .as_mut()
            .and_then(|boxed| boxed.downcast_mut::<T>())
            .expect("stream state slot holds the type just stored")
    }
}

impl std::fmt::Debug for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamState")
            .field("occupied", &self.slot.is_some())
            .finish()
    }
}
