//! Service cache invalidation.
//!
//! Routing layers cache per-service state derived from the engine. The
//! engine tells them when a service changed through a
//! [`ServiceCacheNotifier`] supplied at construction. Notifications are sent
//! only after the write transaction that caused them has committed, and a
//! failed notification never fails the mutation.

use std::sync::Mutex;

use edgeguard_types::ServiceId;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("service cache notification failed: {0}")]
pub struct NotifyError(pub String);

/// Receives committed service changes.
pub trait ServiceCacheNotifier: Send + Sync + std::fmt::Debug {
    fn service_changed(&self, service: &ServiceId) -> Result<(), NotifyError>;
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ServiceCacheNotifier for NoopNotifier {
    fn service_changed(&self, _service: &ServiceId) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Keeps every notification in memory, in delivery order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<ServiceId>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records and then reports failure.
    pub fn failing() -> Self {
        Self {
            seen: Mutex::default(),
            fail: true,
        }
    }

    /// Notifications received so far.
    pub fn recorded(&self) -> Vec<ServiceId> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Drains the notifications received so far.
    pub fn take(&self) -> Vec<ServiceId> {
        match self.seen.lock() {
            Ok(mut seen) => std::mem::take(&mut *seen),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl ServiceCacheNotifier for RecordingNotifier {
    fn service_changed(&self, service: &ServiceId) -> Result<(), NotifyError> {
        match self.seen.lock() {
            Ok(mut seen) => seen.push(service.clone()),
            Err(poisoned) => poisoned.into_inner().push(service.clone()),
        }
        if self.fail {
            return Err(NotifyError(format!("cache unavailable for {service}")));
        }
        Ok(())
    }
}
