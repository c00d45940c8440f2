//! Synchronous event bus for renderer lifecycle notifications
//!
//! Decouples "the swapchain was rebuilt" from "every resource sized to the
//! old surface must rebuild" without an ownership cycle between the renderer
//! and its render-pass consumers. Delivery is immediate, on the sender's
//! call stack, in registration order; nothing is queued or deferred, and
//! there is no cross-thread dispatch.
//!
//! Listeners are identified by a typed [`ListenerKey`] rather than a string,
//! so sends to a specific listener are checked at compile time.

/// Events published by the render core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// The swapchain was destroyed and rebuilt; every resource sized to the
    /// old surface extent (depth buffers, framebuffers, pipelines) must be
    /// recreated before the next frame. Carries the new surface extent.
    SurfaceInvalidated {
        /// New surface width in pixels
        width: u32,
        /// New surface height in pixels
        height: u32,
    },
    /// The windowing system reported a new framebuffer size. Window-event
    /// glue forwards this so interested components can react before the
    /// renderer performs the rebuild on its next frame.
    WindowResized {
        /// New framebuffer width in pixels
        width: u32,
        /// New framebuffer height in pixels
        height: u32,
    },
}

/// Identity of a registered listener
///
/// Registration is idempotent per key: registering again under the same key
/// replaces the previous callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKey {
    /// Depth/stencil attachments sized to the surface
    DepthResources,
    /// Framebuffers referencing swapchain image views
    Framebuffers,
    /// Pipelines with fixed viewport/scissor state
    Pipelines,
    /// The scene render-pass sequencer
    SceneRenderer,
    /// Application-defined listener
    Custom(u32),
}

type Listener = Box<dyn FnMut(&EngineEvent)>;

/// Synchronous publish/subscribe registry
///
/// Single-writer: concurrent registration or dispatch from multiple threads
/// requires external synchronization, which matches the single CPU thread
/// driving recording and submission.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(ListenerKey, Listener)>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener under `key`, replacing any previous registration
    /// for that key
    ///
    /// Replacement keeps the original registration position so broadcast
    /// order stays stable across re-registrations.
    pub fn register_listener(&mut self, key: ListenerKey, callback: impl FnMut(&EngineEvent) + 'static) {
        if let Some(entry) = self.listeners.iter_mut().find(|(k, _)| *k == key) {
            log::warn!("EventBus: listener {:?} registered twice, replacing", key);
            entry.1 = Box::new(callback);
        } else {
            self.listeners.push((key, Box::new(callback)));
        }
    }

    /// Remove the listener registered under `key`, if any
    pub fn remove_listener(&mut self, key: ListenerKey) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(k, _)| *k != key);
        before != self.listeners.len()
    }

    /// Invoke only the listener registered under `key`
    ///
    /// An unknown key is a logged no-op, not an error.
    pub fn send(&mut self, key: ListenerKey, event: &EngineEvent) {
        match self.listeners.iter_mut().find(|(k, _)| *k == key) {
            Some((_, callback)) => callback(event),
            None => log::debug!("EventBus: no listener for {:?}, dropping {:?}", key, event),
        }
    }

    /// Invoke every registered listener, in registration order
    pub fn send_broadcast(&mut self, event: &EngineEvent) {
        for (_, callback) in &mut self.listeners {
            callback(event);
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const RESIZE: EngineEvent = EngineEvent::SurfaceInvalidated { width: 800, height: 600 };

    #[test]
    fn test_broadcast_reaches_all_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        for (key, tag) in [
            (ListenerKey::Framebuffers, "fb"),
            (ListenerKey::DepthResources, "depth"),
            (ListenerKey::Pipelines, "pipe"),
        ] {
            let order = Rc::clone(&order);
            bus.register_listener(key, move |_| order.borrow_mut().push(tag));
        }

        bus.send_broadcast(&RESIZE);
        assert_eq!(*order.borrow(), vec!["fb", "depth", "pipe"]);
    }

    #[test]
    fn test_keyed_send_hits_only_that_listener() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        for key in [ListenerKey::DepthResources, ListenerKey::Framebuffers] {
            let hits = Rc::clone(&hits);
            bus.register_listener(key, move |_| hits.borrow_mut().push(key));
        }

        bus.send(ListenerKey::Framebuffers, &RESIZE);
        assert_eq!(*hits.borrow(), vec![ListenerKey::Framebuffers]);
    }

    #[test]
    fn test_send_to_unknown_key_is_noop() {
        let mut bus = EventBus::new();
        bus.send(ListenerKey::Custom(7), &RESIZE); // must not panic
    }

    #[test]
    fn test_reregistration_replaces_and_keeps_position() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        let o = Rc::clone(&order);
        bus.register_listener(ListenerKey::DepthResources, move |_| o.borrow_mut().push("old"));
        let o = Rc::clone(&order);
        bus.register_listener(ListenerKey::Pipelines, move |_| o.borrow_mut().push("pipe"));

        // Replace the first listener; it must keep its slot at the front.
        let o = Rc::clone(&order);
        bus.register_listener(ListenerKey::DepthResources, move |_| o.borrow_mut().push("new"));
        assert_eq!(bus.listener_count(), 2);

        bus.send_broadcast(&RESIZE);
        assert_eq!(*order.borrow(), vec!["new", "pipe"]);
    }

    #[test]
    fn test_remove_listener() {
        let mut bus = EventBus::new();
        bus.register_listener(ListenerKey::Custom(1), |_| {});
        assert!(bus.remove_listener(ListenerKey::Custom(1)));
        assert!(!bus.remove_listener(ListenerKey::Custom(1)));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_event_payload_delivered() {
        let seen = Rc::new(RefCell::new(None));
        let mut bus = EventBus::new();

        let s = Rc::clone(&seen);
        bus.register_listener(ListenerKey::SceneRenderer, move |e| *s.borrow_mut() = Some(*e));

        bus.send_broadcast(&EngineEvent::WindowResized { width: 1920, height: 1080 });
        assert_eq!(
            *seen.borrow(),
            Some(EngineEvent::WindowResized { width: 1920, height: 1080 })
        );
    }
}
