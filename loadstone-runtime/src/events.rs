//! Lifecycle Event Broadcasting
//!
//! Mods and external observers (UI, tooling) can subscribe to lifecycle
//! notifications. Events are fire-and-forget: a listener observes state
//! transitions but can never fail or block the lifecycle that produced them.

use std::fmt;

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModEventKind {
    /// Persisted settings and saved data are about to be loaded
    DataLoaded,
    /// Persisted settings and saved data are about to be saved
    DataSaved,
    /// The mod's binary was loaded and its entry point invoked
    Loaded,
    /// The mod's binary is about to be torn down
    Unloaded,
    /// The mod finished enabling its hooks and patches
    Enabled,
    /// The mod is about to disable its hooks and patches
    Disabled,
}

impl fmt::Display for ModEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModEventKind::DataLoaded => "data-loaded",
            ModEventKind::DataSaved => "data-saved",
            ModEventKind::Loaded => "loaded",
            ModEventKind::Unloaded => "unloaded",
            ModEventKind::Enabled => "enabled",
            ModEventKind::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// A broadcast lifecycle event carrying the mod it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModEvent {
    /// Id of the mod the event concerns
    pub mod_id: String,
    /// What happened
    pub kind: ModEventKind,
}

/// Subscriber callback type.
pub type ModEventListener = Box<dyn Fn(&ModEvent) + Send>;

/// Fan-out bus for lifecycle events.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<ModEventListener>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners stay registered for the life of the bus.
    pub fn subscribe(&mut self, listener: ModEventListener) {
        self.listeners.push(listener);
    }

    /// Broadcast an event to every listener.
    pub fn post(&self, mod_id: &str, kind: ModEventKind) {
        let event = ModEvent {
            mod_id: mod_id.to_string(),
            kind,
        };
        log::debug!("Mod event: {} {}", event.mod_id, event.kind);
        for listener in &self.listeners {
            listener(&event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
