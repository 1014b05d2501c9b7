use bevy_ecs::prelude::Resource;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleEvent {
    /// A load request was accepted; nothing has been unloaded yet.
    LoadTriggered,
    AllUnloaded,
    AllLoaded,
}

impl fmt::Display for BundleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleEvent::LoadTriggered => f.write_str("LoadTriggered"),
            BundleEvent::AllUnloaded => f.write_str("AllUnloaded"),
            BundleEvent::AllLoaded => f.write_str("AllLoaded"),
        }
    }
}

/// Queue of loader events, insertable into an ECS world and drained per frame.
#[derive(Debug, Default, Resource)]
pub struct EventBus {
    events: Vec<BundleEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: BundleEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<BundleEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Listener = Arc<dyn Fn(BundleEvent) + Send + Sync>;

#[derive(Default)]
struct ObserverSlots {
    next_id: u64,
    listeners: Vec<(ObserverId, Listener)>,
}

/// Broadcast registry for loader notifications.
#[derive(Default)]
pub struct BundleObservers {
    slots: Mutex<ObserverSlots>,
}

impl BundleObservers {
    pub fn subscribe<F>(&self, listener: F) -> ObserverId
    where
        F: Fn(BundleEvent) + Send + Sync + 'static,
    {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let id = ObserverId(slots.next_id);
        slots.next_id += 1;
        slots.listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.listeners.len();
        slots.listeners.retain(|(existing, _)| *existing != id);
        slots.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.listeners.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every listener. The registry lock is released first so a
    /// listener may subscribe, unsubscribe, or call back into the loader.
    pub fn notify(&self, event: BundleEvent) {
        let listeners: Vec<Listener> = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect()
        };
        for listener in listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for BundleObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleObservers").field("listeners", &self.len()).finish()
    }
}
