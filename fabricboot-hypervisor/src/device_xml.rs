//! Narrow parser and builder for domain `<interface>` fragments.
//!
//! The reconciler only needs a handful of operations on a NIC device: read
//! its MAC, source and VLAN, and emit a normalized bridge-attached fragment
//! with the backend-assigned alias/target identifiers cleared. This module
//! implements exactly that instead of pulling in general-purpose XML tree
//! manipulation.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use fabricboot_common::MacAddr;

use crate::error::{DomainError, Result};
use crate::types::{DeviceSource, DomainNicDevice};

#[derive(Default)]
struct PendingInterface {
    start: usize,
    if_type: String,
    source: DeviceSource,
    mac: Option<MacAddr>,
    vlan: Option<u16>,
    virtualport: Option<String>,
    model: Option<String>,
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| DomainError::Xml(e.to_string()))?;
        if attr.key.as_ref() == key {
            return Ok(Some(String::from_utf8_lossy(&attr.value).to_string()));
        }
    }
    Ok(None)
}

/// Parse every `<interface>` device out of a live domain descriptor.
///
/// Devices without a parseable MAC are skipped with a warning; they can
/// never be matched by a declared interface anyway.
pub fn parse_interfaces(domain_xml: &str) -> Result<Vec<DomainNicDevice>> {
    let mut reader = Reader::from_str(domain_xml);
    let mut devices = Vec::new();
    let mut current: Option<PendingInterface> = None;
    let mut last_pos = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| DomainError::Xml(e.to_string()))?;
        let pos_after = reader.buffer_position();

        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let name = e.name();
                match name.as_ref() {
                    b"interface" if current.is_none() => {
                        if matches!(event, Event::Start(_)) {
                            current = Some(PendingInterface {
                                start: last_pos,
                                if_type: attr_value(e, b"type")?.unwrap_or_default(),
                                ..Default::default()
                            });
                        }
                    }
                    b"source" => {
                        if let Some(pending) = current.as_mut() {
                            if let Some(bridge) = attr_value(e, b"bridge")? {
                                pending.source = DeviceSource::Bridge(bridge);
                            } else if let Some(network) = attr_value(e, b"network")? {
                                pending.source = DeviceSource::Network(network);
                            }
                        }
                    }
                    b"mac" => {
                        if let Some(pending) = current.as_mut() {
                            if let Some(addr) = attr_value(e, b"address")? {
                                pending.mac = addr.parse().ok();
                                if pending.mac.is_none() {
                                    warn!(addr = %addr, "interface has unparseable MAC");
                                }
                            }
                        }
                    }
                    b"virtualport" => {
                        if let Some(pending) = current.as_mut() {
                            pending.virtualport = attr_value(e, b"type")?;
                        }
                    }
                    b"model" => {
                        if let Some(pending) = current.as_mut() {
                            pending.model = attr_value(e, b"type")?;
                        }
                    }
                    b"tag" => {
                        if let Some(pending) = current.as_mut() {
                            if let Some(id) = attr_value(e, b"id")? {
                                pending.vlan = id.parse().ok();
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) if e.name().as_ref() == b"interface" => {
                if let Some(pending) = current.take() {
                    match pending.mac {
                        Some(mac) => devices.push(DomainNicDevice {
                            if_type: pending.if_type,
                            source: pending.source,
                            mac,
                            vlan: pending.vlan,
                            virtualport: pending.virtualport,
                            model: pending.model,
                            raw_xml: domain_xml[pending.start..pos_after].to_string(),
                        }),
                        None => warn!("skipping interface device without MAC"),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }

        last_pos = pos_after;
    }

    Ok(devices)
}

/// Builder for the normalized bridge-attached interface fragment.
///
/// The emitted fragment deliberately omits `<alias>` and `<target>`: those
/// identifiers are backend-assigned, and leaving them out forces the
/// hypervisor to reallocate them on attach.
pub struct InterfaceXmlBuilder {
    bridge: String,
    mac: MacAddr,
    vlan: Option<u16>,
    model: Option<String>,
}

impl InterfaceXmlBuilder {
    pub fn new(bridge: &str, mac: MacAddr) -> Self {
        Self {
            bridge: bridge.to_string(),
            mac,
            vlan: None,
            model: None,
        }
    }

    pub fn vlan(mut self, vlan: Option<u16>) -> Self {
        self.vlan = vlan;
        self
    }

    pub fn model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn build(&self) -> String {
        let mut xml = String::from("<interface type='bridge'>\n");
        xml.push_str(&format!("  <mac address='{}'/>\n", self.mac));
        xml.push_str(&format!("  <source bridge='{}'/>\n", self.bridge));
        xml.push_str("  <virtualport type='openvswitch'/>\n");
        if let Some(vlan) = self.vlan {
            xml.push_str(&format!("  <vlan>\n    <tag id='{vlan}'/>\n  </vlan>\n"));
        }
        if let Some(model) = &self.model {
            xml.push_str(&format!("  <model type='{model}'/>\n"));
        }
        xml.push_str("</interface>\n");
        xml
    }
}
