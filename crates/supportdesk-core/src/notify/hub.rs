//! Notification hub fanning out change notices to admin and guest observers.
//!
//! Admins are keyed by their [`ObserverHandle`]; guests by session id, at most
//! one observer per session. Every fan-out snapshots the targets first, drops
//! the map guards, then invokes each observer in isolation: an error or a
//! panic from one observer is logged and the loop moves on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use supportdesk_types::chat::{ChatNotice, ObserverHandle};
use supportdesk_types::error::ObserverError;
use tracing::{debug, warn};

use super::observer::Observer;

/// Registry of live observers and the fan-out entry points.
#[derive(Default)]
pub struct NotificationHub {
    admins: DashMap<ObserverHandle, Arc<dyn Observer>>,
    guests: DashMap<String, Arc<dyn Observer>>,
}

/// Outcome of delivering one notice to one observer.
enum Delivery {
    Delivered,
    Failed,
    Gone,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an admin observer. Re-registering a handle replaces its observer.
    pub fn register_admin(&self, handle: ObserverHandle, observer: Arc<dyn Observer>) {
        self.admins.insert(handle, observer);
        debug!(%handle, admins = self.admins.len(), "registered admin observer");
    }

    /// Remove an admin observer. Idempotent.
    ///
    /// Returns `true` if the handle was registered.
    pub fn unregister_admin(&self, handle: &ObserverHandle) -> bool {
        let removed = self.admins.remove(handle).is_some();
        if removed {
            debug!(%handle, admins = self.admins.len(), "unregistered admin observer");
        }
        removed
    }

    /// Set the observer for a guest session, replacing any previous one.
    pub fn register_guest_observer(&self, session_id: &str, observer: Arc<dyn Observer>) {
        if self
            .guests
            .insert(session_id.to_string(), observer)
            .is_some()
        {
            debug!(%session_id, "replaced guest observer");
        } else {
            debug!(%session_id, "registered guest observer");
        }
    }

    /// Remove the observer for a guest session. Idempotent.
    pub fn unregister_guest_observer(&self, session_id: &str) -> bool {
        self.guests.remove(session_id).is_some()
    }

    /// Number of registered admin observers.
    pub fn admin_count(&self) -> usize {
        self.admins.len()
    }

    /// Whether a guest session currently has an observer.
    pub fn has_guest_observer(&self, session_id: &str) -> bool {
        self.guests.contains_key(session_id)
    }

    /// Tell every admin to refresh. Returns how many observers accepted it.
    pub fn notify_admins(&self) -> usize {
        self.fan_out_admins(&ChatNotice::Refresh)
    }

    /// Push a one-off announcement to every admin.
    pub fn broadcast(&self, text: &str) -> usize {
        self.fan_out_admins(&ChatNotice::Broadcast {
            text: text.to_string(),
        })
    }

    /// Tell one guest session to refresh. No-op without an observer.
    ///
    /// Returns `true` if the observer accepted the notice.
    pub fn notify_guest(&self, session_id: &str) -> bool {
        // Clone out so the shard guard is released before the call.
        let Some(observer) = self.guests.get(session_id).map(|r| r.value().clone()) else {
            return false;
        };

        match deliver(&*observer, &ChatNotice::Refresh) {
            Delivery::Delivered => true,
            Delivery::Failed => {
                warn!(%session_id, "guest observer rejected notice");
                false
            }
            Delivery::Gone => {
                // Only drop it if nobody re-registered in the meantime.
                self.guests
                    .remove_if(session_id, |_, current| Arc::ptr_eq(current, &observer));
                debug!(%session_id, "pruned closed guest observer");
                false
            }
        }
    }

    fn fan_out_admins(&self, notice: &ChatNotice) -> usize {
        let targets: Vec<(ObserverHandle, Arc<dyn Observer>)> = self
            .admins
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();

        let mut delivered = 0;
        for (handle, observer) in targets {
            match deliver(&*observer, notice) {
                Delivery::Delivered => delivered += 1,
                Delivery::Failed => {
                    warn!(%handle, "admin observer rejected notice");
                }
                Delivery::Gone => {
                    self.admins
                        .remove_if(&handle, |_, current| Arc::ptr_eq(current, &observer));
                    debug!(%handle, "pruned closed admin observer");
                }
            }
        }
        delivered
    }
}

fn deliver(observer: &dyn Observer, notice: &ChatNotice) -> Delivery {
    match panic::catch_unwind(AssertUnwindSafe(|| observer.notify(notice))) {
        Ok(Ok(())) => Delivery::Delivered,
        Ok(Err(ObserverError::Closed)) => Delivery::Gone,
        Ok(Err(ObserverError::Lagged)) => {
            // A lagging queue already holds a pending notice; it will catch up.
            debug!("observer lagging, notice dropped");
            Delivery::Failed
        }
        Ok(Err(err)) => {
            warn!(error = %err, "observer failed");
            Delivery::Failed
        }
        Err(_) => {
            warn!("observer panicked during notify");
            Delivery::Failed
        }
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("admins", &self.admins.len())
            .field("guests", &self.guests.len())
            .finish()
    }
}
