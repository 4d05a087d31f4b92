//! Simulated Chassis
//!
//! An `ObservationSource` backed by a YAML inventory file instead of real
//! IPMI/netlink transports. Used for local development and integration
//! testing; production agents plug vendor-backed sources into the same port.
//!
//! The inventory is a zone -> drawer -> component tree. Drawer slots are
//! rack-unique in the simulated inventory, which lets child enumeration find
//! its drawer without a reverse uuid mapping. Components carry a `present`
//! flag so an inventory can describe known-empty slots.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::model::{
    DiscoveryObservation, DrawerProbe, DriveProbe, FanProbe, ManagerProbe, Probe, PsuProbe,
    ResourceKind, ResourceRecord, ZoneProbe,
};
use crate::domain::ports::ObservationSource;
use crate::error::{Error, Result};

fn default_true() -> bool {
    true
}

// =============================================================================
// Inventory File Model
// =============================================================================

/// Root of an inventory file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySpec {
    #[serde(default)]
    pub zones: Vec<ZoneSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub index: u32,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub manager: Option<ManagerSpec>,
    #[serde(default)]
    pub drawers: Vec<DrawerSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSpec {
    #[serde(default)]
    pub firmware: Option<String>,
    #[serde(default)]
    pub uptime_seconds: Option<u64>,
    #[serde(default = "default_true")]
    pub healthy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawerSpec {
    pub slot: u32,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default = "default_true")]
    pub powered_on: bool,
    #[serde(default = "default_true")]
    pub healthy: bool,
    #[serde(default = "default_true")]
    pub present: bool,
    #[serde(default)]
    pub psus: Vec<PsuSpec>,
    #[serde(default)]
    pub fans: Vec<FanSpec>,
    #[serde(default)]
    pub drives: Vec<DriveSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsuSpec {
    pub slot: u32,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub power_watts: Option<f64>,
    #[serde(default = "default_true")]
    pub healthy: bool,
    #[serde(default = "default_true")]
    pub present: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanSpec {
    pub index: u32,
    #[serde(default)]
    pub rpm: Option<u32>,
    #[serde(default)]
    pub duty_percent: Option<u8>,
    #[serde(default = "default_true")]
    pub healthy: bool,
    #[serde(default = "default_true")]
    pub present: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveSpec {
    pub bay: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub capacity_bytes: u64,
    #[serde(default)]
    pub temperature_celsius: Option<i32>,
    #[serde(default)]
    pub percentage_used: Option<u8>,
    #[serde(default = "default_true")]
    pub healthy: bool,
    #[serde(default = "default_true")]
    pub present: bool,
}

// =============================================================================
// Observation Source
// =============================================================================

/// Observation source over a swappable in-memory inventory.
#[derive(Debug, Default)]
pub struct SimulatedChassis {
    inventory: RwLock<InventorySpec>,
}

impl SimulatedChassis {
    pub fn new(inventory: InventorySpec) -> Self {
        Self {
            inventory: RwLock::new(inventory),
        }
    }

    /// Load an inventory file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let inventory: InventorySpec =
            serde_yaml::from_str(&raw).map_err(|e| Error::InventoryParse(e.to_string()))?;
        Ok(Self::new(inventory))
    }

    /// Replace the inventory, simulating hardware changes between cycles.
    pub fn set_inventory(&self, inventory: InventorySpec) {
        *self.inventory.write() = inventory;
    }

    fn zone_observations(&self) -> Vec<DiscoveryObservation> {
        self.inventory
            .read()
            .zones
            .iter()
            .map(|zone| {
                DiscoveryObservation::present(Probe::Zone(ZoneProbe {
                    index: zone.index,
                    label: zone.label.clone(),
                }))
            })
            .collect()
    }

    fn with_zone<T>(&self, index: u32, f: impl FnOnce(&ZoneSpec) -> T) -> Option<T> {
        self.inventory
            .read()
            .zones
            .iter()
            .find(|zone| zone.index == index)
            .map(f)
    }

    fn with_drawer<T>(&self, slot: u32, f: impl FnOnce(&DrawerSpec) -> T) -> Option<T> {
        self.inventory
            .read()
            .zones
            .iter()
            .flat_map(|zone| zone.drawers.iter())
            .find(|drawer| drawer.slot == slot)
            .map(f)
    }

    fn zone_scope_index(kind: ResourceKind, parent: Option<&ResourceRecord>) -> Result<u32> {
        parent
            .and_then(|record| record.payload.as_zone())
            .map(|state| state.index)
            .ok_or_else(|| Error::Enumeration {
                kind,
                detail: "cycle scope is not a zone record".to_string(),
            })
    }

    fn drawer_scope_slot(kind: ResourceKind, parent: Option<&ResourceRecord>) -> Result<u32> {
        parent
            .and_then(|record| record.payload.as_drawer())
            .map(|state| state.slot)
            .ok_or_else(|| Error::Enumeration {
                kind,
                detail: "cycle scope is not a drawer record".to_string(),
            })
    }
}

#[async_trait]
impl ObservationSource for SimulatedChassis {
    async fn enumerate(
        &self,
        kind: ResourceKind,
        parent: Option<&ResourceRecord>,
    ) -> Result<Vec<DiscoveryObservation>> {
        match kind {
            ResourceKind::Zone => Ok(self.zone_observations()),

            ResourceKind::Manager => {
                let index = Self::zone_scope_index(kind, parent)?;
                Ok(self
                    .with_zone(index, |zone| {
                        zone.manager
                            .iter()
                            .map(|manager| {
                                DiscoveryObservation::present(Probe::Manager(ManagerProbe {
                                    firmware: manager.firmware.clone(),
                                    uptime_seconds: manager.uptime_seconds,
                                    healthy: manager.healthy,
                                }))
                            })
                            .collect()
                    })
                    .unwrap_or_default())
            }

            ResourceKind::Drawer => {
                let index = Self::zone_scope_index(kind, parent)?;
                Ok(self
                    .with_zone(index, |zone| {
                        zone.drawers
                            .iter()
                            .map(|drawer| {
                                let probe = Probe::Drawer(DrawerProbe {
                                    slot: drawer.slot,
                                    model: drawer.model.clone(),
                                    serial: drawer.serial.clone(),
                                    powered_on: drawer.powered_on,
                                    healthy: drawer.healthy,
                                });
                                if drawer.present {
                                    DiscoveryObservation::present(probe)
                                } else {
                                    DiscoveryObservation::absent(probe)
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default())
            }

            ResourceKind::Psu => {
                let slot = Self::drawer_scope_slot(kind, parent)?;
                Ok(self
                    .with_drawer(slot, |drawer| {
                        drawer
                            .psus
                            .iter()
                            .map(|psu| {
                                let probe = Probe::Psu(PsuProbe {
                                    slot: psu.slot,
                                    model: psu.model.clone(),
                                    power_watts: psu.power_watts,
                                    healthy: psu.healthy,
                                });
                                if psu.present {
                                    DiscoveryObservation::present(probe)
                                } else {
                                    DiscoveryObservation::absent(probe)
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default())
            }

            ResourceKind::Fan => {
                let slot = Self::drawer_scope_slot(kind, parent)?;
                Ok(self
                    .with_drawer(slot, |drawer| {
                        drawer
                            .fans
                            .iter()
                            .map(|fan| {
                                let probe = Probe::Fan(FanProbe {
                                    index: fan.index,
                                    rpm: fan.rpm,
                                    duty_percent: fan.duty_percent,
                                    healthy: fan.healthy,
                                });
                                if fan.present {
                                    DiscoveryObservation::present(probe)
                                } else {
                                    DiscoveryObservation::absent(probe)
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default())
            }

            ResourceKind::Drive => {
                let slot = Self::drawer_scope_slot(kind, parent)?;
                Ok(self
                    .with_drawer(slot, |drawer| {
                        drawer
                            .drives
                            .iter()
                            .map(|drive| {
                                let probe = Probe::Drive(DriveProbe {
                                    bay: drive.bay.clone(),
                                    model: drive.model.clone(),
                                    serial: drive.serial.clone(),
                                    capacity_bytes: drive.capacity_bytes,
                                    temperature_celsius: drive.temperature_celsius,
                                    percentage_used: drive.percentage_used,
                                    healthy: drive.healthy,
                                });
                                if drive.present {
                                    DiscoveryObservation::present(probe)
                                } else {
                                    DiscoveryObservation::absent(probe)
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Payload, ZoneState};

    const SAMPLE: &str = r#"
zones:
  - index: 0
    label: "row-a"
    manager:
      firmware: "2.14.0"
      uptime_seconds: 86400
    drawers:
      - slot: 0
        model: "CH-2200"
        serial: "CH2200-0001"
        psus:
          - slot: 1
            power_watts: 48.5
          - slot: 2
            power_watts: 51.0
            healthy: false
        fans:
          - index: 0
            rpm: 4200
        drives:
          - bay: "bay-0"
            model: "NVMe 4TB"
            capacity_bytes: 4000000000000
            temperature_celsius: 38
"#;

    fn zone_record(index: u32) -> ResourceRecord {
        ResourceRecord::new(None, Payload::Zone(ZoneState { index, label: None }))
    }

    #[test]
    fn test_parse_sample_inventory() {
        let spec: InventorySpec = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(spec.zones.len(), 1);
        let drawer = &spec.zones[0].drawers[0];
        assert_eq!(drawer.psus.len(), 2);
        assert!(drawer.present);
        assert!(!drawer.psus[1].healthy);
    }

    #[tokio::test]
    async fn test_enumerate_zone_then_children() {
        let spec: InventorySpec = serde_yaml::from_str(SAMPLE).unwrap();
        let chassis = SimulatedChassis::new(spec);

        let zones = chassis.enumerate(ResourceKind::Zone, None).await.unwrap();
        assert_eq!(zones.len(), 1);
        assert!(zones[0].present);

        let zone = zone_record(0);
        let managers = chassis
            .enumerate(ResourceKind::Manager, Some(&zone))
            .await
            .unwrap();
        assert_eq!(managers.len(), 1);

        let drawers = chassis
            .enumerate(ResourceKind::Drawer, Some(&zone))
            .await
            .unwrap();
        assert_eq!(drawers.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_zone_enumerates_empty() {
        let spec: InventorySpec = serde_yaml::from_str(SAMPLE).unwrap();
        let chassis = SimulatedChassis::new(spec);

        let ghost = zone_record(42);
        let drawers = chassis
            .enumerate(ResourceKind::Drawer, Some(&ghost))
            .await
            .unwrap();
        assert!(drawers.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_scope_kind_is_enumeration_error() {
        let chassis = SimulatedChassis::default();
        let err = chassis
            .enumerate(ResourceKind::Psu, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Enumeration { .. }));
    }
}
