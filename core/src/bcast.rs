use bitflags::bitflags;

bitflags! {
    /// Subscription mask telling the station which asynchronous message
    /// categories to push to this client.
    ///
    /// The mask is client-specific station state: it survives until the
    /// client logs off or falls out of the station's client table.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct BroadcastFlags: u32 {
        /// Driving and switching broadcasts: loco info for controlled
        /// locos, turnout info, track power, emergency stop.
        const DRIVING_SWITCHING = 0x0000_0001;
        /// R-Bus feedback changes.
        const RBUS = 0x0000_0002;
        /// RailCom data of subscribed locomotives.
        const RAILCOM_SUBSCRIBED = 0x0000_0004;
        /// Fast-clock time broadcasts.
        const FAST_CLOCK = 0x0000_0010;
        /// Periodic system-state reports.
        const SYSTEM_STATE = 0x0000_0100;
        /// Loco info for every address, not only controlled ones.
        /// Firmware 1.20 and later.
        const ALL_LOCO_INFO = 0x0001_0000;
        /// CAN booster status reports.
        const CAN_BOOSTER = 0x0002_0000;
        /// RailCom data of every locomotive.
        const RAILCOM_ALL = 0x0004_0000;
        /// CAN occupancy detector changes.
        const CAN_DETECTOR = 0x0008_0000;
        /// Raw LocoNet traffic.
        const LOCONET = 0x0100_0000;
        /// LocoNet loco messages.
        const LOCONET_LOCO = 0x0200_0000;
        /// LocoNet turnout messages.
        const LOCONET_TURNOUT = 0x0400_0000;
        /// LocoNet detector requests.
        const LOCONET_DETECTOR = 0x0800_0000;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_bits_are_dropped_on_decode() {
        let flags = BroadcastFlags::from_bits_truncate(0x0000_0101 | 0x0000_8000);
        assert_eq!(
            flags,
            BroadcastFlags::DRIVING_SWITCHING | BroadcastFlags::SYSTEM_STATE
        );
    }
}
