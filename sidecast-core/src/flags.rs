use bitflags::bitflags;

bitflags! {
    /// Per-datagram flag word carried in the last four header bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketFlags: u32 {
        /// The chunk belongs to a keyframe.
        const KEYFRAME = 0x01;
        /// Reserved for host-bound input packets; ignored by the receiver.
        const INPUT = 0x02;
        /// The payload is a JSON control message, not a video chunk.
        const CONTROL = 0x04;
    }
}

impl PacketFlags {
    pub fn is_keyframe(self) -> bool {
        self.contains(PacketFlags::KEYFRAME)
    }

    pub fn is_control(self) -> bool {
        self.contains(PacketFlags::CONTROL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_bits_are_kept() {
        let flags = PacketFlags::from_bits_retain(0x8000_0005);
        assert!(flags.is_keyframe());
        assert!(flags.is_control());
        assert_eq!(flags.bits(), 0x8000_0005);
    }

    #[test]
    fn reserved_bit_is_neither_keyframe_nor_control() {
        let flags = PacketFlags::INPUT;
        assert!(!flags.is_keyframe());
        assert!(!flags.is_control());
    }
}
