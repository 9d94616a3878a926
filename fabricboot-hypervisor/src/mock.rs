//! In-memory domain and resolver backends for tests and dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use fabricboot_common::MacAddr;

use crate::error::{DomainError, Result};
use crate::traits::{DomainHandle, MacResolver};

/// A fake domain holding a fixed descriptor and recording device calls.
pub struct MockDomain {
    xml: String,
    detached: Mutex<Vec<String>>,
    attached: Mutex<Vec<String>>,
    fail_attach: bool,
}

impl MockDomain {
    pub fn new(xml: String) -> Self {
        Self {
            xml,
            detached: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
            fail_attach: false,
        }
    }

    /// Make every attach call fail.
    pub fn fail_attach(mut self) -> Self {
        self.fail_attach = true;
        self
    }

    pub fn detached(&self) -> Vec<String> {
        self.detached.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn attached(&self) -> Vec<String> {
        self.attached.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl DomainHandle for MockDomain {
    fn name(&self) -> &str {
        "mock-CVM"
    }

    fn descriptor(&self) -> Result<String> {
        Ok(self.xml.clone())
    }

    fn detach_device(&self, device_xml: &str) -> Result<()> {
        self.detached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(device_xml.to_string());
        Ok(())
    }

    fn attach_device(&self, device_xml: &str) -> Result<()> {
        if self.fail_attach {
            return Err(DomainError::AttachFailed("injected failure".to_string()));
        }
        self.attached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(device_xml.to_string());
        Ok(())
    }
}

/// Resolver backed by a fixed name-to-MAC table.
pub struct StaticMacResolver {
    macs: HashMap<String, MacAddr>,
}

impl StaticMacResolver {
    /// Build from `(iface, mac)` pairs. Panics on malformed MACs, which is
    /// acceptable for test fixtures.
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let macs = pairs
            .iter()
            .map(|(iface, mac)| {
                let mac = mac
                    .parse()
                    .unwrap_or_else(|_| panic!("bad MAC in fixture: {mac}"));
                (iface.to_string(), mac)
            })
            .collect();
        Self { macs }
    }
}

impl MacResolver for StaticMacResolver {
    fn resolve_mac(&self, iface: &str) -> Result<MacAddr> {
        self.macs
            .get(iface)
            .cloned()
            .ok_or_else(|| DomainError::MacResolveFailed(iface.to_string()))
    }
}
