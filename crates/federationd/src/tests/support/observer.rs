//! Observer double that records every handler call in arrival order.

use std::collections::HashSet;
use std::sync::Mutex;

use federation_types::{FederatedResource, ProviderId};

use crate::observer::{ObserverError, ResourceObserver};

/// One recorded handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedCall {
    pub operation: &'static str,
    pub provider: String,
    pub fqdn: String,
}

impl ObservedCall {
    pub fn new(operation: &'static str, provider: &str, fqdn: &str) -> Self {
        Self {
            operation,
            provider: provider.to_owned(),
            fqdn: fqdn.to_owned(),
        }
    }
}

/// Records handler calls and fails the operations it is told to fail.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    calls: Mutex<Vec<ObservedCall>>,
    failing: Mutex<HashSet<&'static str>>,
    active: Mutex<usize>,
    overlapped: Mutex<bool>,
}

impl RecordingObserver {
    /// Makes every call to `operation` (`create`, `update`, `delete`) fail.
    pub fn fail_on(&self, operation: &'static str) {
        self.failing
            .lock()
            .expect("observer mutex poisoned")
            .insert(operation);
    }

    pub fn calls(&self) -> Vec<ObservedCall> {
        self.calls.lock().expect("observer mutex poisoned").clone()
    }

    /// Whether two handler calls ever ran at the same time.
    pub fn overlapped(&self) -> bool {
        *self.overlapped.lock().expect("observer mutex poisoned")
    }

    fn handle(
        &self,
        operation: &'static str,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError> {
        {
            let mut active = self.active.lock().expect("observer mutex poisoned");
            if *active > 0 {
                *self.overlapped.lock().expect("observer mutex poisoned") = true;
            }
            *active += 1;
        }
        self.calls
            .lock()
            .expect("observer mutex poisoned")
            .push(ObservedCall::new(operation, provider.as_str(), resource.fqdn()));
        let failing = self
            .failing
            .lock()
            .expect("observer mutex poisoned")
            .contains(operation);
        *self.active.lock().expect("observer mutex poisoned") -= 1;
        if failing {
            return Err(ObserverError::new(format!("{operation} refused")));
        }
        Ok(())
    }
}

impl ResourceObserver for RecordingObserver {
    fn on_create(&self, p: &ProviderId, r: &FederatedResource) -> Result<(), ObserverError> {
        self.handle("create", p, r)
    }

    fn on_update(&self, p: &ProviderId, r: &FederatedResource) -> Result<(), ObserverError> {
        self.handle("update", p, r)
    }

    fn on_delete(&self, p: &ProviderId, r: &FederatedResource) -> Result<(), ObserverError> {
        self.handle("delete", p, r)
    }
}
