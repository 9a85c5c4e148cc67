//! Static service declaration and handle bindings.
//!
//! Handles are assigned the way a GATT server lays attributes out: the
//! service declaration first, then for every characteristic its
//! declaration, its value and, if it can notify or indicate, its CCC
//! descriptor.  The resulting table maps each value / CCC handle to a
//! tagged binding so the dispatcher never compares handles by hand.

use heapless::Vec;

use super::{
    AttrHandle, CharacteristicKind, Properties, Uuid, CHARACTERISTIC_COUNT,
    ENVIRONMENTAL_SENSING_SERVICE, STATUS_CHARACTERISTIC, STATUS_SERVICE,
    TEMPERATURE_CHARACTERISTIC,
};
use crate::config::FIRST_APP_HANDLE;
use crate::error::RegistrationError;

/// Maximum number of services the table accepts.
pub const MAX_SERVICES: usize = 4;

/// Maximum number of value + CCC bindings.
const MAX_BINDINGS: usize = 2 * CHARACTERISTIC_COUNT;

/// One characteristic in the static declaration.
#[derive(Clone, Copy, Debug)]
pub struct CharacteristicDef {
    pub kind: CharacteristicKind,
    pub uuid: Uuid,
    pub properties: Properties,
}

/// One primary service in the static declaration.
#[derive(Clone, Copy, Debug)]
pub struct ServiceDef {
    pub uuid: Uuid,
    pub characteristics: &'static [CharacteristicDef],
}

/// Environmental Sensing (temperature) and the custom status service.
pub static SERVICES: [ServiceDef; 2] = [
    ServiceDef {
        uuid: ENVIRONMENTAL_SENSING_SERVICE,
        characteristics: &[CharacteristicDef {
            kind: CharacteristicKind::Temperature,
            uuid: TEMPERATURE_CHARACTERISTIC,
            properties: Properties::READ.union(Properties::NOTIFY),
        }],
    },
    ServiceDef {
        uuid: STATUS_SERVICE,
        characteristics: &[CharacteristicDef {
            kind: CharacteristicKind::Status,
            uuid: STATUS_CHARACTERISTIC,
            properties: Properties::READ
                .union(Properties::WRITE)
                .union(Properties::NOTIFY)
                .union(Properties::INDICATE),
        }],
    },
];

/// Handles of one registered characteristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicHandles {
    pub declaration: AttrHandle,
    pub value: AttrHandle,
    pub cccd: Option<AttrHandle>,
}

/// Handles a host stack reports for one characteristic it registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssignedHandles {
    pub kind: CharacteristicKind,
    pub value: AttrHandle,
    pub cccd: Option<AttrHandle>,
}

/// Handle range of one registered service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceRange {
    pub uuid: Uuid,
    pub start: AttrHandle,
    pub end: AttrHandle,
}

/// Which attribute of a characteristic a handle refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttributeRole {
    Value,
    Cccd,
}

/// What a dispatched handle resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttributeBinding {
    pub kind: CharacteristicKind,
    pub role: AttributeRole,
    pub properties: Properties,
}

#[derive(Clone, Copy, Debug)]
struct Registered {
    handles: CharacteristicHandles,
    properties: Properties,
}

/// The registered attribute table. Read-only after [`AttributeTable::register`].
#[derive(Clone, Debug)]
pub struct AttributeTable {
    characteristics: [Registered; CHARACTERISTIC_COUNT],
    bindings: Vec<(AttrHandle, AttributeBinding), MAX_BINDINGS>,
    services: Vec<ServiceRange, MAX_SERVICES>,
}

impl AttributeTable {
    /// Register [`SERVICES`] after the host stack's own services.
    pub fn standard() -> Result<Self, RegistrationError> {
        Self::register(&SERVICES, FIRST_APP_HANDLE)
    }

    /// Assign handles to `services`, starting at `first_handle`.
    ///
    /// Every [`CharacteristicKind`] must be declared exactly once.
    pub fn register(
        services: &[ServiceDef],
        first_handle: AttrHandle,
    ) -> Result<Self, RegistrationError> {
        let mut slots: [Option<Registered>; CHARACTERISTIC_COUNT] = [None; CHARACTERISTIC_COUNT];
        let mut bindings = Vec::new();
        let mut ranges: Vec<ServiceRange, MAX_SERVICES> = Vec::new();
        let mut char_uuids: Vec<Uuid, CHARACTERISTIC_COUNT> = Vec::new();

        if first_handle == 0 {
            return Err(RegistrationError::ResourceExhausted);
        }
        let mut next = first_handle;

        for service in services {
            if ranges.iter().any(|r| r.uuid == service.uuid) {
                return Err(RegistrationError::DuplicateUuid);
            }

            let start = next;
            let mut last = take(&mut next)?;

            for chr in service.characteristics {
                if char_uuids.contains(&chr.uuid) {
                    return Err(RegistrationError::DuplicateUuid);
                }
                char_uuids
                    .push(chr.uuid)
                    .map_err(|_| RegistrationError::ResourceExhausted)?;

                let slot = &mut slots[chr.kind.index()];
                if slot.is_some() {
                    return Err(RegistrationError::DuplicateCharacteristic);
                }

                let declaration = take(&mut next)?;
                let value = take(&mut next)?;
                last = value;
                push_binding(&mut bindings, value, chr, AttributeRole::Value)?;

                let cccd = if chr.properties.subscribable() {
                    let cccd = take(&mut next)?;
                    last = cccd;
                    push_binding(&mut bindings, cccd, chr, AttributeRole::Cccd)?;
                    Some(cccd)
                } else {
                    None
                };

                *slot = Some(Registered {
                    handles: CharacteristicHandles {
                        declaration,
                        value,
                        cccd,
                    },
                    properties: chr.properties,
                });
            }

            ranges
                .push(ServiceRange {
                    uuid: service.uuid,
                    start,
                    end: last,
                })
                .map_err(|_| RegistrationError::ResourceExhausted)?;
        }

        let [temperature, status] = slots;
        let characteristics = [
            temperature.ok_or(RegistrationError::MissingCharacteristic)?,
            status.ok_or(RegistrationError::MissingCharacteristic)?,
        ];

        Ok(Self {
            characteristics,
            bindings,
            services: ranges,
        })
    }

    /// Resolve a dispatched handle. `None` for handles we never registered
    /// (including declarations, which the host stack serves itself).
    pub fn lookup(&self, handle: AttrHandle) -> Option<AttributeBinding> {
        self.bindings
            .binary_search_by_key(&handle, |(h, _)| *h)
            .ok()
            .map(|i| self.bindings[i].1)
    }

    pub fn handles(&self, kind: CharacteristicKind) -> CharacteristicHandles {
        self.characteristics[kind.index()].handles
    }

    pub fn value_handle(&self, kind: CharacteristicKind) -> AttrHandle {
        self.handles(kind).value
    }

    pub fn cccd_handle(&self, kind: CharacteristicKind) -> Option<AttrHandle> {
        self.handles(kind).cccd
    }

    pub fn properties(&self, kind: CharacteristicKind) -> Properties {
        self.characteristics[kind.index()].properties
    }

    pub fn services(&self) -> &[ServiceRange] {
        &self.services
    }

    /// Register [`SERVICES`] at the position implied by the value / CCC
    /// handles a host stack reported, and check every one of them.
    pub fn match_assigned(assigned: &[AssignedHandles]) -> Result<Self, RegistrationError> {
        let first_kind = SERVICES[0].characteristics[0].kind;
        let anchor = assigned
            .iter()
            .find(|a| a.kind == first_kind)
            .ok_or(RegistrationError::MissingCharacteristic)?;
        // service declaration, characteristic declaration, value
        let first_handle = anchor
            .value
            .checked_sub(2)
            .ok_or(RegistrationError::LayoutMismatch)?;

        let table = Self::register(&SERVICES, first_handle)?;
        for a in assigned {
            let expected = table.handles(a.kind);
            if expected.value != a.value || expected.cccd != a.cccd {
                error!(
                    "{} assigned value={} cccd={}, expected {}",
                    a.kind, a.value, a.cccd, expected
                );
                return Err(RegistrationError::LayoutMismatch);
            }
        }
        Ok(table)
    }

    /// Characteristic whose value lives at `handle`.
    pub fn kind_for_value_handle(&self, handle: AttrHandle) -> Option<CharacteristicKind> {
        self.lookup(handle)
            .filter(|b| b.role == AttributeRole::Value)
            .map(|b| b.kind)
    }
}

fn take(next: &mut AttrHandle) -> Result<AttrHandle, RegistrationError> {
    let handle = *next;
    *next = handle
        .checked_add(1)
        .ok_or(RegistrationError::ResourceExhausted)?;
    Ok(handle)
}

fn push_binding(
    bindings: &mut Vec<(AttrHandle, AttributeBinding), MAX_BINDINGS>,
    handle: AttrHandle,
    chr: &CharacteristicDef,
    role: AttributeRole,
) -> Result<(), RegistrationError> {
    bindings
        .push((
            handle,
            AttributeBinding {
                kind: chr.kind,
                role,
                properties: chr.properties,
            },
        ))
        .map_err(|_| RegistrationError::ResourceExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_layout() {
        let table = AttributeTable::standard().unwrap();
        let base = FIRST_APP_HANDLE;

        // ESS: service, decl, value, cccd
        let temp = table.handles(CharacteristicKind::Temperature);
        assert_eq!(temp.declaration, base + 1);
        assert_eq!(temp.value, base + 2);
        assert_eq!(temp.cccd, Some(base + 3));

        // Custom: service, decl, value, cccd
        let status = table.handles(CharacteristicKind::Status);
        assert_eq!(status.declaration, base + 5);
        assert_eq!(status.value, base + 6);
        assert_eq!(status.cccd, Some(base + 7));

        assert_eq!(
            table.services(),
            &[
                ServiceRange {
                    uuid: ENVIRONMENTAL_SENSING_SERVICE,
                    start: base,
                    end: base + 3
                },
                ServiceRange {
                    uuid: STATUS_SERVICE,
                    start: base + 4,
                    end: base + 7
                },
            ]
        );
    }

    #[test]
    fn lookup_resolves_value_and_cccd() {
        let table = AttributeTable::standard().unwrap();
        let status = table.handles(CharacteristicKind::Status);

        let value = table.lookup(status.value).unwrap();
        assert_eq!(value.kind, CharacteristicKind::Status);
        assert_eq!(value.role, AttributeRole::Value);
        assert!(value.properties.contains(Properties::WRITE));

        let cccd = table.lookup(status.cccd.unwrap()).unwrap();
        assert_eq!(cccd.role, AttributeRole::Cccd);
    }

    #[test]
    fn lookup_rejects_declarations_and_strangers() {
        let table = AttributeTable::standard().unwrap();
        assert!(table.lookup(FIRST_APP_HANDLE).is_none());
        assert!(table
            .lookup(table.handles(CharacteristicKind::Temperature).declaration)
            .is_none());
        assert!(table.lookup(0).is_none());
        assert!(table.lookup(0xFFFF).is_none());
    }

    #[test]
    fn read_only_characteristic_has_no_cccd() {
        static PLAIN: [ServiceDef; 1] = [ServiceDef {
            uuid: Uuid::Uuid16(0xAAAA),
            characteristics: &[
                CharacteristicDef {
                    kind: CharacteristicKind::Temperature,
                    uuid: Uuid::Uuid16(0xAAA1),
                    properties: Properties::READ,
                },
                CharacteristicDef {
                    kind: CharacteristicKind::Status,
                    uuid: Uuid::Uuid16(0xAAA2),
                    properties: Properties::READ.union(Properties::WRITE),
                },
            ],
        }];
        let table = AttributeTable::register(&PLAIN, 1).unwrap();
        assert_eq!(table.cccd_handle(CharacteristicKind::Temperature), None);
        assert_eq!(table.value_handle(CharacteristicKind::Status), 5);
        assert_eq!(table.services()[0].end, 5);
    }

    #[test]
    fn duplicate_service_uuid_is_rejected() {
        let services = [SERVICES[0], SERVICES[0]];
        assert_eq!(
            AttributeTable::register(&services, 1).unwrap_err(),
            RegistrationError::DuplicateUuid
        );
    }

    #[test]
    fn duplicate_characteristic_uuid_is_rejected() {
        static CLASH: [ServiceDef; 1] = [ServiceDef {
            uuid: Uuid::Uuid16(0xBBBB),
            characteristics: &[
                CharacteristicDef {
                    kind: CharacteristicKind::Temperature,
                    uuid: Uuid::Uuid16(0xBBB1),
                    properties: Properties::READ,
                },
                CharacteristicDef {
                    kind: CharacteristicKind::Status,
                    uuid: Uuid::Uuid16(0xBBB1),
                    properties: Properties::READ,
                },
            ],
        }];
        assert_eq!(
            AttributeTable::register(&CLASH, 1).unwrap_err(),
            RegistrationError::DuplicateUuid
        );
    }

    #[test]
    fn missing_characteristic_is_rejected() {
        assert_eq!(
            AttributeTable::register(&SERVICES[..1], 1).unwrap_err(),
            RegistrationError::MissingCharacteristic
        );
    }

    fn assigned(temp: AttrHandle, status: AttrHandle) -> [AssignedHandles; 2] {
        [
            AssignedHandles {
                kind: CharacteristicKind::Temperature,
                value: temp,
                cccd: Some(temp + 1),
            },
            AssignedHandles {
                kind: CharacteristicKind::Status,
                value: status,
                cccd: Some(status + 1),
            },
        ]
    }

    #[test]
    fn host_layout_matching_declaration_is_accepted() {
        let table = AttributeTable::match_assigned(&assigned(14, 18)).unwrap();
        assert_eq!(table.services()[0].start, 12);
        assert_eq!(table.value_handle(CharacteristicKind::Status), 18);

        // a different base works as long as the ordering holds
        let table = AttributeTable::match_assigned(&assigned(30, 34)).unwrap();
        assert_eq!(table.cccd_handle(CharacteristicKind::Temperature), Some(31));
    }

    #[test]
    fn host_layout_out_of_order_is_rejected() {
        assert_eq!(
            AttributeTable::match_assigned(&assigned(14, 20)).unwrap_err(),
            RegistrationError::LayoutMismatch
        );
        assert_eq!(
            AttributeTable::match_assigned(&assigned(1, 5)).unwrap_err(),
            RegistrationError::LayoutMismatch
        );
        assert_eq!(
            AttributeTable::match_assigned(&assigned(14, 18)[1..]).unwrap_err(),
            RegistrationError::MissingCharacteristic
        );
    }

    #[test]
    fn handle_space_exhaustion_is_rejected() {
        assert_eq!(
            AttributeTable::register(&SERVICES, 0xFFFA).unwrap_err(),
            RegistrationError::ResourceExhausted
        );
        assert_eq!(
            AttributeTable::register(&SERVICES, 0).unwrap_err(),
            RegistrationError::ResourceExhausted
        );
    }
}
