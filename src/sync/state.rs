//! Mesh synchronization state with edge-triggered notifications.

/// Transition notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// Mesh caught up with the voxel data.
    Complete,
    /// Mesh fell behind the voxel data.
    Lost,
}

/// Whether the mirrored mesh currently matches the engine's data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    Synchronized,
    /// Initial state: nothing has been confirmed consistent yet
    #[default]
    Unsynchronized,
}

/// Two-state machine that reports only actual transitions.
#[derive(Debug, Default)]
pub struct MeshSyncState {
    state: SyncState,
}

impl MeshSyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_synchronized(&self) -> bool {
        self.state == SyncState::Synchronized
    }

    /// Move to `synchronized`, returning the event if the state changed.
    pub fn set(&mut self, synchronized: bool) -> Option<SyncEvent> {
        let next = if synchronized {
            SyncState::Synchronized
        } else {
            SyncState::Unsynchronized
        };

        if next == self.state {
            return None;
        }

        self.state = next;
        let event = match next {
            SyncState::Synchronized => SyncEvent::Complete,
            SyncState::Unsynchronized => SyncEvent::Lost,
        };
        log::debug!("Mesh sync {:?}", event);
        Some(event)
    }
}

/// Callback registry for sync events.
#[derive(Default)]
pub struct SyncListeners {
    listeners: Vec<Box<dyn FnMut(SyncEvent)>>,
}

impl SyncListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: impl FnMut(SyncEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn notify(&mut self, event: SyncEvent) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for SyncListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncListeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_initial_state() {
        let state = MeshSyncState::new();
        assert_eq!(state.state(), SyncState::Unsynchronized);
        assert!(!state.is_synchronized());
    }

    #[test]
    fn test_edge_triggered() {
        let mut state = MeshSyncState::new();

        // Staying unsynchronized fires nothing
        assert_eq!(state.set(false), None);

        assert_eq!(state.set(true), Some(SyncEvent::Complete));
        assert_eq!(state.set(true), None);
        assert_eq!(state.set(true), None);

        assert_eq!(state.set(false), Some(SyncEvent::Lost));
        assert_eq!(state.set(false), None);

        assert_eq!(state.set(true), Some(SyncEvent::Complete));
        assert!(state.is_synchronized());
    }

    #[test]
    fn test_listeners_receive_events() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = SyncListeners::new();
        assert!(listeners.is_empty());

        let sink = Rc::clone(&seen);
        listeners.add(move |event| sink.borrow_mut().push(event));
        let sink = Rc::clone(&seen);
        listeners.add(move |event| sink.borrow_mut().push(event));
        assert_eq!(listeners.len(), 2);

        listeners.notify(SyncEvent::Lost);
        assert_eq!(*seen.borrow(), vec![SyncEvent::Lost, SyncEvent::Lost]);
    }
}
