//! Mode-based adapter selection.

use std::sync::{Arc, PoisonError, RwLock};

use accord_core::message::Message;
use accord_core::security::ProtocolMode;

use crate::adapter::ProtocolAdapter;

#[derive(Default)]
struct Slots {
    plain: Option<Arc<dyn ProtocolAdapter>>,
    secure: Option<Arc<dyn ProtocolAdapter>>,
}

/// Picks the transport for each message.
///
/// In `plain` or `secure` mode the corresponding slot is returned
/// unconditionally. In `auto` mode a message whose security block
/// requests secure goes to the secure slot; everything else goes
/// plain. Mutations serialize with reads behind one lock.
pub struct ProtocolSelector {
    mode: RwLock<ProtocolMode>,
    slots: RwLock<Slots>,
}

impl ProtocolSelector {
    /// A selector starting in the given mode with empty slots.
    #[must_use]
    pub fn new(mode: ProtocolMode) -> Self {
        Self {
            mode: RwLock::new(mode),
            slots: RwLock::new(Slots::default()),
        }
    }

    /// The current selection mode.
    #[must_use]
    pub fn mode(&self) -> ProtocolMode {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the selection mode.
    pub fn set_mode(&self, mode: ProtocolMode) {
        *self.mode.write().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    /// Install the adapter serving a mode slot. `Auto` is not a slot;
    /// installing it is a no-op.
    pub fn register(&self, mode: ProtocolMode, adapter: Arc<dyn ProtocolAdapter>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        match mode {
            ProtocolMode::Plain => slots.plain = Some(adapter),
            ProtocolMode::Secure => slots.secure = Some(adapter),
            ProtocolMode::Auto => {},
        }
    }

    /// Pick the adapter for `message`, if one is installed.
    #[must_use]
    pub fn select(&self, message: &Message) -> Option<Arc<dyn ProtocolAdapter>> {
        let mode = self.mode();
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        match mode {
            ProtocolMode::Plain => slots.plain.clone(),
            ProtocolMode::Secure => slots.secure.clone(),
            ProtocolMode::Auto => {
                let wants_secure = message
                    .security
                    .as_ref()
                    .is_some_and(|security| security.mode == ProtocolMode::Secure);
                if wants_secure {
                    slots.secure.clone()
                } else {
                    slots.plain.clone()
                }
            },
        }
    }
}

impl std::fmt::Debug for ProtocolSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolSelector")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}
