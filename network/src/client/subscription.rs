use z21_core::bcast::BroadcastFlags;
use z21_core::station::FirmwareVersion;

use super::event::{EventCategory, CATEGORY_COUNT};

/// Handle for one registered listener.
///
/// Returned by [`Client::subscribe`](super::Client::subscribe) and given
/// back to [`Client::unsubscribe`](super::Client::unsubscribe). Dropping
/// the handle does not unregister the listener.
#[derive(Debug)]
#[must_use = "hand the subscription back to unsubscribe"]
pub struct Subscription {
    pub(crate) category: EventCategory,
}

impl Subscription {
    pub fn category(&self) -> EventCategory {
        self.category
    }
}

/// Listener counts per event category.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    counts: [u8; CATEGORY_COUNT],
}

impl Ledger {
    pub const fn new() -> Self {
        Ledger {
            counts: [0; CATEGORY_COUNT],
        }
    }

    /// Record one listener. Returns whether it is the first of its
    /// category.
    pub fn add(&mut self, category: EventCategory) -> bool {
        let count = &mut self.counts[category.index()];
        *count = count.saturating_add(1);
        *count == 1
    }

    /// Drop one listener. Returns whether it was the last of its
    /// category.
    pub fn remove(&mut self, category: EventCategory) -> bool {
        let count = &mut self.counts[category.index()];
        if *count == 0 {
            net_debug!("client: unsubscribe without listeners");
            return false;
        }
        *count -= 1;
        *count == 0
    }

    pub fn count(&self, category: EventCategory) -> u8 {
        self.counts[category.index()]
    }

    /// Count of listeners across the RailCom categories.
    pub fn railcom_listeners(&self) -> usize {
        EventCategory::ALL
            .iter()
            .filter(|category| category.is_railcom())
            .map(|category| self.counts[category.index()] as usize)
            .sum()
    }

    /// Union of the flags of populated categories whose firmware guard
    /// holds.
    pub fn active_flags(&self, firmware: Option<FirmwareVersion>) -> BroadcastFlags {
        EventCategory::ALL
            .iter()
            .filter(|category| self.counts[category.index()] > 0 && category.guard(firmware))
            .fold(BroadcastFlags::empty(), |flags, category| {
                flags | category.broadcast_flags()
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_and_last_transitions() {
        let mut ledger = Ledger::new();
        assert!(ledger.add(EventCategory::SystemState));
        assert!(!ledger.add(EventCategory::SystemState));
        assert!(!ledger.remove(EventCategory::SystemState));
        assert!(ledger.remove(EventCategory::SystemState));
        assert!(!ledger.remove(EventCategory::SystemState));
    }

    #[test]
    fn active_flags_respect_the_firmware_guard() {
        let mut ledger = Ledger::new();
        ledger.add(EventCategory::AllLocoInfo);
        ledger.add(EventCategory::RBus);

        assert_eq!(ledger.active_flags(None), BroadcastFlags::RBUS);
        assert_eq!(
            ledger.active_flags(Some(FirmwareVersion::new(1, 10))),
            BroadcastFlags::RBUS
        );
        assert_eq!(
            ledger.active_flags(Some(FirmwareVersion::new(1, 30))),
            BroadcastFlags::RBUS | BroadcastFlags::ALL_LOCO_INFO
        );
    }

    #[test]
    fn railcom_listeners_span_both_categories() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.railcom_listeners(), 0);
        ledger.add(EventCategory::RailComSubscribed);
        ledger.add(EventCategory::AllRailCom);
        assert_eq!(ledger.railcom_listeners(), 2);
        ledger.remove(EventCategory::AllRailCom);
        assert_eq!(ledger.railcom_listeners(), 1);
    }
}
