//! Remote GATT discovery, one pipeline per mirrored characteristic.
//!
//! Each pipeline walks
//!
//! ```text
//! Service ─▶ Characteristic ─▶ Descriptor ─▶ Subscribing ─▶ Subscribed
//!    │              │               │              │
//!    └──────────────┴───── Exhausted┘              └──▶ Abandoned
//! ```
//!
//! and is advanced only by [`DiscoveryCursor::advance`].  The transport
//! executes the returned [`DiscoveryRequest`] and feeds the outcome back as
//! a [`DiscoveryEvent`].  A stage runs only after the previous one
//! succeeded; `Exhausted` means the peer does not offer the attribute and
//! is a valid end state.

use crate::gatt::{
    AttrHandle, CharacteristicKind, Uuid, CCC_DESCRIPTOR, CHARACTERISTIC_COUNT,
    ENVIRONMENTAL_SENSING_SERVICE, STATUS_CHARACTERISTIC, STATUS_SERVICE,
    TEMPERATURE_CHARACTERISTIC,
};

/// CCC value written to subscribe for notifications.
pub const SUBSCRIBE_NOTIFY: [u8; 2] = [0x01, 0x00];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryPhase {
    Service,
    Characteristic,
    Descriptor,
    Subscribing,
    /// Notifications are routed to the local table.
    Subscribed,
    /// The peer lacks the service, characteristic or CCC descriptor.
    Exhausted,
    /// A procedure failed; no retry.
    Abandoned,
}

impl DiscoveryPhase {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Subscribed | Self::Exhausted | Self::Abandoned)
    }
}

/// What the transport should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryRequest {
    PrimaryService {
        uuid: Uuid,
    },
    Characteristic {
        uuid: Uuid,
        start: AttrHandle,
        end: AttrHandle,
    },
    Descriptor {
        uuid: Uuid,
        start: AttrHandle,
        end: AttrHandle,
    },
    /// Write `value` to the remote CCC descriptor.
    Subscribe {
        ccc_handle: AttrHandle,
        value: [u8; 2],
    },
}

/// Outcome of the last request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryEvent {
    ServiceFound {
        start: AttrHandle,
        end: AttrHandle,
    },
    CharacteristicFound {
        declaration: AttrHandle,
        value: AttrHandle,
    },
    DescriptorFound {
        handle: AttrHandle,
    },
    Subscribed,
    /// The peer reports the CCC is already set; counts as success.
    AlreadySubscribed,
    /// The procedure completed without a match.
    Exhausted,
    /// The procedure failed with an ATT or host error.
    Failed {
        status: u16,
    },
}

/// Remote attributes one pipeline is after.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Target {
    pub kind: CharacteristicKind,
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl Target {
    pub const fn for_kind(kind: CharacteristicKind) -> Self {
        match kind {
            CharacteristicKind::Temperature => Self {
                kind,
                service: ENVIRONMENTAL_SENSING_SERVICE,
                characteristic: TEMPERATURE_CHARACTERISTIC,
            },
            CharacteristicKind::Status => Self {
                kind,
                service: STATUS_SERVICE,
                characteristic: STATUS_CHARACTERISTIC,
            },
        }
    }
}

/// Progress of one pipeline on the current central link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveryCursor {
    target: Target,
    phase: DiscoveryPhase,
    start: AttrHandle,
    end: AttrHandle,
    value_handle: Option<AttrHandle>,
    ccc_handle: Option<AttrHandle>,
}

impl DiscoveryCursor {
    pub const fn new(target: Target) -> Self {
        Self {
            target,
            phase: DiscoveryPhase::Service,
            start: 0x0001,
            end: 0xFFFF,
            value_handle: None,
            ccc_handle: None,
        }
    }

    /// The request that opens the pipeline.
    pub const fn first_request(&self) -> DiscoveryRequest {
        DiscoveryRequest::PrimaryService {
            uuid: self.target.service,
        }
    }

    /// Feed the outcome of the last request.
    ///
    /// Returns the next request, or `None` once the pipeline reached a
    /// terminal phase.
    pub fn advance(&mut self, event: DiscoveryEvent) -> Option<DiscoveryRequest> {
        let kind = self.target.kind;
        if self.phase.is_terminal() {
            warn!("{} discovery already {}; ignoring {}", kind, self.phase, event);
            return None;
        }

        match (self.phase, event) {
            (_, DiscoveryEvent::Exhausted) => {
                info!("{} discovery exhausted in {}", kind, self.phase);
                self.phase = DiscoveryPhase::Exhausted;
                None
            }
            (_, DiscoveryEvent::Failed { status }) => {
                error!("{} discovery failed in {}; status={}", kind, self.phase, status);
                self.phase = DiscoveryPhase::Abandoned;
                None
            }
            (DiscoveryPhase::Service, DiscoveryEvent::ServiceFound { start, end }) => {
                debug!("{} service {}..{}", kind, start, end);
                self.start = start;
                self.end = end;
                self.phase = DiscoveryPhase::Characteristic;
                Some(DiscoveryRequest::Characteristic {
                    uuid: self.target.characteristic,
                    start,
                    end,
                })
            }
            (
                DiscoveryPhase::Characteristic,
                DiscoveryEvent::CharacteristicFound { declaration, value },
            ) => {
                debug!("{} characteristic decl={} value={}", kind, declaration, value);
                self.value_handle = Some(value);
                self.phase = DiscoveryPhase::Descriptor;
                // The CCC follows the value handle in the standard layout.
                Some(DiscoveryRequest::Descriptor {
                    uuid: CCC_DESCRIPTOR,
                    start: declaration.saturating_add(1),
                    end: declaration.saturating_add(2),
                })
            }
            (DiscoveryPhase::Descriptor, DiscoveryEvent::DescriptorFound { handle }) => {
                debug!("{} ccc={}", kind, handle);
                self.ccc_handle = Some(handle);
                self.phase = DiscoveryPhase::Subscribing;
                Some(DiscoveryRequest::Subscribe {
                    ccc_handle: handle,
                    value: SUBSCRIBE_NOTIFY,
                })
            }
            (
                DiscoveryPhase::Subscribing,
                DiscoveryEvent::Subscribed | DiscoveryEvent::AlreadySubscribed,
            ) => {
                info!("subscribed to remote {}", kind);
                self.phase = DiscoveryPhase::Subscribed;
                None
            }
            (phase, event) => {
                warn!("{} discovery: unexpected {} in {}", kind, event, phase);
                self.phase = DiscoveryPhase::Abandoned;
                None
            }
        }
    }

    pub fn phase(&self) -> DiscoveryPhase {
        self.phase
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Handle range of the remote service (the whole space until found).
    pub fn service_range(&self) -> (AttrHandle, AttrHandle) {
        (self.start, self.end)
    }

    /// Remote value handle, known once the characteristic was found.
    pub fn value_handle(&self) -> Option<AttrHandle> {
        self.value_handle
    }

    pub fn ccc_handle(&self) -> Option<AttrHandle> {
        self.ccc_handle
    }
}

/// Both pipelines of the central link.
#[derive(Debug, Default)]
pub struct RelayDiscoveryChain {
    cursors: [Option<DiscoveryCursor>; CHARACTERISTIC_COUNT],
}

impl RelayDiscoveryChain {
    pub const fn new() -> Self {
        Self {
            cursors: [None; CHARACTERISTIC_COUNT],
        }
    }

    /// Open fresh pipelines; returns their first requests in
    /// [`CharacteristicKind::ALL`] order.
    pub fn start(&mut self) -> [DiscoveryRequest; CHARACTERISTIC_COUNT] {
        CharacteristicKind::ALL.map(|kind| {
            let cursor = DiscoveryCursor::new(Target::for_kind(kind));
            self.cursors[kind.index()] = Some(cursor);
            cursor.first_request()
        })
    }

    pub fn advance(
        &mut self,
        kind: CharacteristicKind,
        event: DiscoveryEvent,
    ) -> Option<DiscoveryRequest> {
        match &mut self.cursors[kind.index()] {
            Some(cursor) => cursor.advance(event),
            None => {
                warn!("{} discovery event without a link: {}", kind, event);
                None
            }
        }
    }

    /// Discard both cursors (link lost).
    pub fn reset(&mut self) {
        self.cursors = [None; CHARACTERISTIC_COUNT];
    }

    pub fn cursor(&self, kind: CharacteristicKind) -> Option<&DiscoveryCursor> {
        self.cursors[kind.index()].as_ref()
    }

    pub fn phase(&self, kind: CharacteristicKind) -> Option<DiscoveryPhase> {
        self.cursor(kind).map(DiscoveryCursor::phase)
    }

    /// Which local characteristic a notification on remote `handle` mirrors.
    ///
    /// The route opens with the CCC write, so the push a peer sends in
    /// answer to it is mirrored even before the write response is seen.
    pub fn route_notification(&self, handle: AttrHandle) -> Option<CharacteristicKind> {
        self.cursors
            .iter()
            .flatten()
            .filter(|c| {
                matches!(
                    c.phase,
                    DiscoveryPhase::Subscribing | DiscoveryPhase::Subscribed
                )
            })
            .find(|c| c.value_handle == Some(handle))
            .map(|c| c.target.kind)
    }

    /// Remote value handle of `kind`, if discovery got that far.
    pub fn remote_value_handle(&self, kind: CharacteristicKind) -> Option<AttrHandle> {
        self.cursor(kind)
            .filter(|c| c.phase != DiscoveryPhase::Abandoned)
            .and_then(DiscoveryCursor::value_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(cursor: &mut DiscoveryCursor, decl: AttrHandle) {
        cursor.advance(DiscoveryEvent::ServiceFound {
            start: decl - 1,
            end: decl + 2,
        });
        cursor.advance(DiscoveryEvent::CharacteristicFound {
            declaration: decl,
            value: decl + 1,
        });
        cursor.advance(DiscoveryEvent::DescriptorFound { handle: decl + 2 });
    }

    #[test]
    fn full_pipeline() {
        let mut cursor = DiscoveryCursor::new(Target::for_kind(CharacteristicKind::Temperature));
        assert_eq!(
            cursor.first_request(),
            DiscoveryRequest::PrimaryService {
                uuid: ENVIRONMENTAL_SENSING_SERVICE
            }
        );

        assert_eq!(
            cursor.advance(DiscoveryEvent::ServiceFound { start: 12, end: 15 }),
            Some(DiscoveryRequest::Characteristic {
                uuid: TEMPERATURE_CHARACTERISTIC,
                start: 12,
                end: 15
            })
        );
        assert_eq!(
            cursor.advance(DiscoveryEvent::CharacteristicFound {
                declaration: 13,
                value: 14
            }),
            Some(DiscoveryRequest::Descriptor {
                uuid: CCC_DESCRIPTOR,
                start: 14,
                end: 15
            })
        );
        assert_eq!(
            cursor.advance(DiscoveryEvent::DescriptorFound { handle: 15 }),
            Some(DiscoveryRequest::Subscribe {
                ccc_handle: 15,
                value: [0x01, 0x00]
            })
        );
        assert_eq!(cursor.advance(DiscoveryEvent::Subscribed), None);
        assert_eq!(cursor.phase(), DiscoveryPhase::Subscribed);
        assert_eq!(cursor.service_range(), (12, 15));
        assert_eq!(cursor.value_handle(), Some(14));
        assert_eq!(cursor.ccc_handle(), Some(15));
    }

    #[test]
    fn missing_service_is_exhausted() {
        let mut cursor = DiscoveryCursor::new(Target::for_kind(CharacteristicKind::Status));
        assert_eq!(cursor.advance(DiscoveryEvent::Exhausted), None);
        assert_eq!(cursor.phase(), DiscoveryPhase::Exhausted);
    }

    #[test]
    fn characteristic_without_ccc_is_exhausted() {
        let mut cursor = DiscoveryCursor::new(Target::for_kind(CharacteristicKind::Status));
        cursor.advance(DiscoveryEvent::ServiceFound { start: 16, end: 20 });
        cursor.advance(DiscoveryEvent::CharacteristicFound {
            declaration: 17,
            value: 18,
        });
        assert_eq!(cursor.advance(DiscoveryEvent::Exhausted), None);
        assert_eq!(cursor.phase(), DiscoveryPhase::Exhausted);
        assert_eq!(cursor.value_handle(), Some(18));
    }

    #[test]
    fn already_subscribed_counts_as_success() {
        let mut cursor = DiscoveryCursor::new(Target::for_kind(CharacteristicKind::Status));
        walk(&mut cursor, 17);
        assert_eq!(cursor.advance(DiscoveryEvent::AlreadySubscribed), None);
        assert_eq!(cursor.phase(), DiscoveryPhase::Subscribed);
    }

    #[test]
    fn subscribe_failure_abandons_without_retry() {
        let mut cursor = DiscoveryCursor::new(Target::for_kind(CharacteristicKind::Status));
        walk(&mut cursor, 17);
        assert_eq!(cursor.advance(DiscoveryEvent::Failed { status: 0x0103 }), None);
        assert_eq!(cursor.phase(), DiscoveryPhase::Abandoned);
        // Terminal: further events change nothing.
        assert_eq!(cursor.advance(DiscoveryEvent::Subscribed), None);
        assert_eq!(cursor.phase(), DiscoveryPhase::Abandoned);
    }

    #[test]
    fn failed_subscription_closes_the_route() {
        let mut chain = RelayDiscoveryChain::new();
        chain.start();
        let status = CharacteristicKind::Status;
        chain.advance(status, DiscoveryEvent::ServiceFound { start: 16, end: 19 });
        chain.advance(
            status,
            DiscoveryEvent::CharacteristicFound {
                declaration: 17,
                value: 18,
            },
        );
        chain.advance(status, DiscoveryEvent::DescriptorFound { handle: 19 });
        assert_eq!(chain.route_notification(18), Some(status));

        chain.advance(status, DiscoveryEvent::Failed { status: 0x0103 });
        assert_eq!(chain.route_notification(18), None);
    }

    #[test]
    fn out_of_order_event_abandons() {
        let mut cursor = DiscoveryCursor::new(Target::for_kind(CharacteristicKind::Temperature));
        assert_eq!(cursor.advance(DiscoveryEvent::DescriptorFound { handle: 3 }), None);
        assert_eq!(cursor.phase(), DiscoveryPhase::Abandoned);
    }

    #[test]
    fn chain_routes_only_subscribed_handles() {
        let mut chain = RelayDiscoveryChain::new();
        let first = chain.start();
        assert_eq!(
            first,
            [
                DiscoveryRequest::PrimaryService {
                    uuid: ENVIRONMENTAL_SENSING_SERVICE
                },
                DiscoveryRequest::PrimaryService {
                    uuid: STATUS_SERVICE
                },
            ]
        );

        let temp = CharacteristicKind::Temperature;
        chain.advance(temp, DiscoveryEvent::ServiceFound { start: 12, end: 15 });
        chain.advance(
            temp,
            DiscoveryEvent::CharacteristicFound {
                declaration: 13,
                value: 14,
            },
        );
        assert_eq!(chain.route_notification(14), None, "no CCC write yet");
        chain.advance(temp, DiscoveryEvent::DescriptorFound { handle: 15 });
        assert_eq!(chain.route_notification(14), Some(temp), "CCC write in flight");
        chain.advance(temp, DiscoveryEvent::Subscribed);

        assert_eq!(chain.route_notification(14), Some(temp));
        assert_eq!(chain.route_notification(18), None);
        assert_eq!(chain.phase(CharacteristicKind::Status), Some(DiscoveryPhase::Service));
    }

    #[test]
    fn reset_discards_cursors() {
        let mut chain = RelayDiscoveryChain::new();
        chain.start();
        chain.reset();
        assert_eq!(chain.phase(CharacteristicKind::Temperature), None);
        assert_eq!(
            chain.advance(CharacteristicKind::Temperature, DiscoveryEvent::Exhausted),
            None
        );
    }

    #[test]
    fn remote_value_handle_survives_missing_ccc() {
        let mut chain = RelayDiscoveryChain::new();
        chain.start();
        let status = CharacteristicKind::Status;
        chain.advance(status, DiscoveryEvent::ServiceFound { start: 16, end: 19 });
        chain.advance(
            status,
            DiscoveryEvent::CharacteristicFound {
                declaration: 17,
                value: 18,
            },
        );
        chain.advance(status, DiscoveryEvent::Exhausted);
        assert_eq!(chain.remote_value_handle(status), Some(18));
    }
}
