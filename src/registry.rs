//! Process wide state shared with the engine: the single instance lease and
//! the synthetic descriptor table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::common::Protocol;
use crate::{Error, Result};

/// Integer handle standing in for a transport in the engine's API.
///
/// Never an OS file descriptor.
pub type Descriptor = i32;

/// Identifies the session owning a descriptor without borrowing it.
pub type SessionToken = u64;

static ACTIVE: AtomicBool = AtomicBool::new(false);
static NEXT_DESCRIPTOR: AtomicI32 = AtomicI32::new(1);
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

static DESCRIPTORS: OnceLock<Mutex<HashMap<Descriptor, (Protocol, SessionToken)>>> =
    OnceLock::new();

fn descriptors() -> MutexGuard<'static, HashMap<Descriptor, (Protocol, SessionToken)>> {
    DESCRIPTORS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Exclusive hold on the engine's global state, released on drop.
#[derive(Debug)]
pub struct EngineLease {
    token: SessionToken,
}

impl EngineLease {
    /// Fails with [Error::AlreadyActive] while another lease is alive.
    pub fn acquire() -> Result<Self> {
        ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyActive)?;

        Ok(Self {
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
        })
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::Release);
    }
}

/// Returns `true` while some session holds the engine.
pub fn is_active() -> bool {
    ACTIVE.load(Ordering::Acquire)
}

/// Allocate a fresh descriptor for `protocol` owned by `token`.
pub fn register(protocol: Protocol, token: SessionToken) -> Descriptor {
    let descriptor = NEXT_DESCRIPTOR.fetch_add(1, Ordering::Relaxed);
    descriptors().insert(descriptor, (protocol, token));
    descriptor
}

pub fn resolve(descriptor: Descriptor) -> Option<(Protocol, SessionToken)> {
    descriptors().get(&descriptor).copied()
}

/// Remove every descriptor owned by `token`.
pub fn unregister_all(token: SessionToken) {
    descriptors().retain(|_, (_, owner)| *owner != token);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn register_resolve_unregister() {
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        let other = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);

        let v4 = register(Protocol::V4, token);
        let v6 = register(Protocol::V6, token);
        let foreign = register(Protocol::V4, other);

        assert_ne!(v4, v6);
        assert_eq!(resolve(v4), Some((Protocol::V4, token)));
        assert_eq!(resolve(v6), Some((Protocol::V6, token)));

        unregister_all(token);

        assert_eq!(resolve(v4), None);
        assert_eq!(resolve(v6), None);
        assert_eq!(resolve(foreign), Some((Protocol::V4, other)));

        unregister_all(other);
    }
}
