//! The process-wide audio output session.
//!
//! Only one player may hold the session active at a time. Players built by
//! the same composition root share a [`SessionSlot`] and take it on
//! activation, give it back on deactivation.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tracing::{debug, warn};

use crate::{Result, error::Error};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

const FREE: u64 = 0;

/// Platform side of the session (category, activation, notifying others).
pub trait SessionBackend: Send {
    fn set_active(&mut self, active: bool) -> std::result::Result<(), String>;
}

/// Backend for hosts without an OS-level audio session.
#[derive(Debug, Default)]
pub struct NoopSession;

impl SessionBackend for NoopSession {
    fn set_active(&mut self, _active: bool) -> std::result::Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionSlot(Arc<AtomicU64>);

impl SessionSlot {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire) != FREE
    }
}

pub struct AudioSession {
    backend: Box<dyn SessionBackend>,
    slot: SessionSlot,
    owner: u64,
}

impl AudioSession {
    pub fn new(backend: Box<dyn SessionBackend>, slot: SessionSlot) -> Self {
        Self {
            backend,
            slot,
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot.0.load(Ordering::Acquire) == self.owner
    }

    pub fn activate(&mut self) -> Result<()> {
        match self
            .slot
            .0
            .compare_exchange(FREE, self.owner, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(holder) if holder == self.owner => {}
            Err(holder) => {
                warn!(holder, "audio session held by another player");
                return Err(Error::SessionActivation {
                    message: "session is held by another player".into(),
                });
            }
        }

        debug!("activating audio session");
        self.backend.set_active(true).map_err(|message| {
            self.release_slot();
            Error::SessionActivation { message }
        })
    }

    pub fn deactivate(&mut self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }

        debug!("deactivating audio session");
        let result = self
            .backend
            .set_active(false)
            .map_err(|message| Error::SessionActivation { message });
        self.release_slot();
        result
    }

    fn release_slot(&self) {
        let _ = self
            .slot
            .0
            .compare_exchange(self.owner, FREE, Ordering::AcqRel, Ordering::Acquire);
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        if self.is_active() {
            let _ = self.deactivate();
        }
    }
}
