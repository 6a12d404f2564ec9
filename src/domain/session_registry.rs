//! Robot-id → session mapping.
//!
//! [`SessionRegistry`] is the only state touched by more than one session
//! task. Every access goes through a single `std::sync::Mutex`, and no
//! lock is ever held across an `.await`, so admission check-and-insert is
//! one atomic critical section.
//!
//! A robot's slot is reserved from admission until the session reaches
//! `Disconnected`. Reservation hands out a [`SessionLease`]; dropping the
//! lease frees the slot, which also covers upgrades that never complete.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use utoipa::ToSchema;

use super::{DrivePayload, RobotId, SessionId, SessionState};
use crate::error::AdmissionError;

#[derive(Debug)]
struct RobotSlot {
    session_id: SessionId,
    state: SessionState,
    connected_at: DateTime<Utc>,
    last_published: Option<DrivePayload>,
    evict: Arc<Notify>,
}

/// Read-only view of one reserved robot slot.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SessionInfo {
    /// Controlled robot.
    #[schema(value_type = String)]
    pub robot_id: RobotId,
    /// Owning session.
    #[schema(value_type = String)]
    pub session_id: SessionId,
    /// Lifecycle state at the time of the snapshot.
    #[schema(value_type = String)]
    pub state: SessionState,
    /// Wall-clock admission time.
    pub connected_at: DateTime<Utc>,
    /// Last payload published to the robot, if any.
    #[schema(value_type = Option<Object>)]
    pub last_published: Option<DrivePayload>,
}

/// Central store of which session owns which robot.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<RobotId, RobotSlot>>,
    /// Set once by [`Self::close`]. Written and checked for admission
    /// under the `slots` lock.
    closed: AtomicBool,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<RobotId, RobotSlot>> {
        // A panic while holding the lock cannot leave a slot half-written.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves `robot_id` for a new session in [`SessionState::Connected`].
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::RobotBusy`] if any session already holds
    /// the robot. Nothing is queued and the holder is not preempted.
    /// Returns [`AdmissionError::ShuttingDown`] once [`Self::close`] has
    /// been called.
    pub fn reserve(self: &Arc<Self>, robot_id: RobotId) -> Result<SessionLease, AdmissionError> {
        let mut slots = self.slots();
        if self.closed.load(Ordering::Acquire) {
            return Err(AdmissionError::ShuttingDown);
        }
        if slots.contains_key(&robot_id) {
            return Err(AdmissionError::RobotBusy(robot_id));
        }
        let session_id = SessionId::new();
        let evict = Arc::new(Notify::new());
        slots.insert(
            robot_id.clone(),
            RobotSlot {
                session_id,
                state: SessionState::Connected,
                connected_at: Utc::now(),
                last_published: None,
                evict: Arc::clone(&evict),
            },
        );
        Ok(SessionLease {
            registry: Arc::clone(self),
            robot_id,
            session_id,
            evict,
        })
    }

    /// Asks the session holding `robot_id` to close. Returns `false` if
    /// the robot is free.
    pub fn evict(&self, robot_id: &RobotId) -> bool {
        match self.slots().get(robot_id) {
            Some(slot) => {
                slot.evict.notify_one();
                true
            }
            None => false,
        }
    }

    /// Refuses all further reservations and asks every live session to
    /// close. Returns how many were signalled.
    ///
    /// Both happen in one critical section, so no session can be admitted
    /// after the signal goes out.
    pub fn close(&self) -> usize {
        let slots = self.slots();
        self.closed.store(true, Ordering::Release);
        for slot in slots.values() {
            slot.evict.notify_one();
        }
        slots.len()
    }

    /// Returns `true` once [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// State of the session holding `robot_id`, if any.
    #[must_use]
    pub fn state_of(&self, robot_id: &RobotId) -> Option<SessionState> {
        self.slots().get(robot_id).map(|slot| slot.state)
    }

    /// Number of sessions currently in [`SessionState::Active`].
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| slot.state == SessionState::Active)
            .count()
    }

    /// Snapshot of every reserved slot, ordered by robot id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .slots()
            .iter()
            .map(|(robot_id, slot)| SessionInfo {
                robot_id: robot_id.clone(),
                session_id: slot.session_id,
                state: slot.state,
                connected_at: slot.connected_at,
                last_published: slot.last_published,
            })
            .collect();
        infos.sort_by(|a, b| a.robot_id.cmp(&b.robot_id));
        infos
    }

    /// Number of reserved robots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    /// Returns `true` if no robot is reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    fn update(&self, robot_id: &RobotId, session_id: SessionId, f: impl FnOnce(&mut RobotSlot)) {
        if let Some(slot) = self.slots().get_mut(robot_id)
            && slot.session_id == session_id
        {
            f(slot);
        }
    }

    fn release(&self, robot_id: &RobotId, session_id: SessionId) {
        let mut slots = self.slots();
        if slots
            .get(robot_id)
            .is_some_and(|slot| slot.session_id == session_id)
        {
            slots.remove(robot_id);
        }
    }
}

/// Exclusive claim on one robot, held by exactly one session.
///
/// Dropping the lease releases the robot.
#[derive(Debug)]
pub struct SessionLease {
    registry: Arc<SessionRegistry>,
    robot_id: RobotId,
    session_id: SessionId,
    evict: Arc<Notify>,
}

impl SessionLease {
    /// Session owning this lease.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Publishes the session's state to the registry.
    pub fn set_state(&self, state: SessionState) {
        self.registry
            .update(&self.robot_id, self.session_id, |slot| slot.state = state);
    }

    /// Records the last payload published for the robot.
    pub fn record_published(&self, payload: DrivePayload) {
        self.registry.update(&self.robot_id, self.session_id, |slot| {
            slot.last_published = Some(payload);
        });
    }

    /// Resolves once [`SessionRegistry::evict`] has been called for this
    /// robot. An eviction issued before the first poll is not lost.
    pub fn evicted(&self) -> Notified<'_> {
        self.evict.notified()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.release(&self.robot_id, self.session_id);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn robot(raw: &str) -> RobotId {
        let Ok(id) = RobotId::parse(raw) else {
            panic!("valid id");
        };
        id
    }

    #[test]
    fn reserve_then_busy() {
        let registry = Arc::new(SessionRegistry::new());
        let lease = registry.reserve(robot("r1"));
        assert!(lease.is_ok());
        let second = registry.reserve(robot("r1"));
        assert!(matches!(second, Err(AdmissionError::RobotBusy(_))));
        assert!(registry.reserve(robot("r2")).is_ok());
    }

    #[test]
    fn dropping_lease_frees_robot() {
        let registry = Arc::new(SessionRegistry::new());
        let Ok(lease) = registry.reserve(robot("r1")) else {
            panic!("first reservation");
        };
        assert_eq!(registry.len(), 1);
        drop(lease);
        assert!(registry.is_empty());
        assert!(registry.reserve(robot("r1")).is_ok());
    }

    #[test]
    fn state_updates_are_visible() {
        let registry = Arc::new(SessionRegistry::new());
        let Ok(lease) = registry.reserve(robot("r1")) else {
            panic!("reservation");
        };
        assert_eq!(registry.state_of(&robot("r1")), Some(SessionState::Connected));
        lease.set_state(SessionState::Active);
        lease.record_published(DrivePayload::STOP);
        assert_eq!(registry.active_count(), 1);

        let snap = registry.snapshot();
        let Some(info) = snap.first() else {
            panic!("one slot");
        };
        assert_eq!(info.session_id, lease.session_id());
        assert_eq!(info.state, SessionState::Active);
        assert_eq!(info.last_published, Some(DrivePayload::STOP));
    }

    #[tokio::test]
    async fn eviction_before_wait_is_not_lost() {
        let registry = Arc::new(SessionRegistry::new());
        let Ok(lease) = registry.reserve(robot("r1")) else {
            panic!("reservation");
        };
        assert!(registry.evict(&robot("r1")));
        assert!(!registry.evict(&robot("nobody")));
        let woke = tokio::time::timeout(Duration::from_millis(100), lease.evicted()).await;
        assert!(woke.is_ok());
    }

    #[tokio::test]
    async fn close_signals_holders_and_refuses_new_robots() {
        let registry = Arc::new(SessionRegistry::new());
        let Ok(lease) = registry.reserve(robot("r1")) else {
            panic!("reservation");
        };
        assert!(!registry.is_closed());
        assert_eq!(registry.close(), 1);
        assert!(registry.is_closed());
        assert!(matches!(
            registry.reserve(robot("r2")),
            Err(AdmissionError::ShuttingDown)
        ));
        let woke = tokio::time::timeout(Duration::from_millis(100), lease.evicted()).await;
        assert!(woke.is_ok());
        drop(lease);
        assert!(matches!(
            registry.reserve(robot("r1")),
            Err(AdmissionError::ShuttingDown)
        ));
    }

    #[test]
    fn concurrent_reservations_admit_exactly_one() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.reserve(robot("r1")).ok())
            })
            .collect();
        let mut leases = Vec::new();
        for handle in handles {
            let Ok(result) = handle.join() else {
                panic!("thread panicked");
            };
            leases.extend(result);
        }
        assert_eq!(leases.len(), 1);
        assert_eq!(registry.len(), 1);
    }
}
