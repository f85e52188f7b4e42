//! Typed change-notification bus.
//!
//! External consumers (tree views, status panels) subscribe here; the model
//! never depends on any presentation concept. The event set is closed:
//! every notification is one of the [`ModelEvent`] variants.

use berth_schema::{EnvironmentId, ProjectId};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A change notification published by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ModelEvent {
    /// The project's environment mapping or build directory changed.
    EnvironmentsChanged { project: ProjectId },
    /// The project's enabled flag flipped (compatibility gate transition).
    EnablementChanged { project: ProjectId, enabled: bool },
    /// An environment finished a successful generation run.
    EnvironmentGenerated { environment: EnvironmentId },
}

/// Receives model events. Implemented for any `Fn(&ModelEvent)` closure.
pub trait ModelObserver: Send + Sync {
    fn model_changed(&self, event: &ModelEvent);
}

impl<F> ModelObserver for F
where
    F: Fn(&ModelEvent) + Send + Sync,
{
    fn model_changed(&self, event: &ModelEvent) {
        self(event);
    }
}

/// Handle returned by [`EventBus::subscribe`]; pass it back to
/// [`EventBus::unsubscribe`] to stop receiving events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: Vec<(SubscriptionId, Arc<dyn ModelObserver>)>,
}

/// Observer registry with snapshot-then-notify dispatch: the registry lock
/// is never held while observer code runs, so observers may freely call
/// back into the model.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn ModelObserver>) -> SubscriptionId {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.observers.push((id, observer));
        id
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.observers.retain(|(sub, _)| *sub != id);
    }

    pub fn emit(&self, event: &ModelEvent) {
        let observers: Vec<Arc<dyn ModelObserver>> = {
            let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry
                .observers
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect()
        };
        debug!("dispatching {event:?} to {} observer(s)", observers.len());
        for observer in observers {
            observer.model_changed(event);
        }
    }
}
