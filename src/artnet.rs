//! ArtNet (DMX over UDP) packet encoding and transmission

use bytes::{BufMut, Bytes, BytesMut};

use crate::models::Universe;

mod output;
pub use output::*;

mod transmitter;
pub use transmitter::*;

pub const SIGNATURE: &[u8; 8] = b"Art-Net\0";
pub const OP_DMX: u16 = 0x5000;
pub const PROTOCOL_VERSION: u16 = 14;
pub const HEADER_LEN: usize = 18;

/// Port address of a universe on the ArtNet network
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PortAddress {
    pub net: u8,
    pub subnet: u8,
    pub universe: u8,
}

impl PortAddress {
    pub fn new(net: u8, subnet: u8, universe: u8) -> Self {
        Self {
            net,
            subnet,
            universe,
        }
    }

    fn sub_uni(&self) -> u8 {
        (self.subnet & 0x0f) << 4 | (self.universe & 0x0f)
    }

    fn net(&self) -> u8 {
        self.net & 0x7f
    }
}

/// ArtNet sequence counter, cycling through 1..=255
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sequence(u8);

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the counter and return the new value, never 0
    pub fn next(&mut self) -> u8 {
        self.0 = if self.0 == 255 { 1 } else { self.0 + 1 };
        self.0
    }
}

/// Encode an ArtDmx packet into `dst`
pub fn encode_into(dst: &mut BytesMut, address: PortAddress, universe: &Universe, sequence: u8) {
    let data = universe.as_slice();

    dst.reserve(HEADER_LEN + data.len());
    dst.put_slice(SIGNATURE);
    dst.put_u16_le(OP_DMX);
    dst.put_u16(PROTOCOL_VERSION);
    dst.put_u8(sequence);
    // Physical input port
    dst.put_u8(0);
    dst.put_u8(address.sub_uni());
    dst.put_u8(address.net());
    dst.put_u16(data.len() as u16);
    dst.put_slice(data);
}

pub fn encode(address: PortAddress, universe: &Universe, sequence: u8) -> Bytes {
    let mut dst = BytesMut::new();
    encode_into(&mut dst, address, universe, sequence);
    dst.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CHANNEL_COUNT;

    #[test]
    fn encode_header_is_bit_exact() {
        let mut universe = Universe::zero();
        universe.as_mut_slice()[0] = 200;
        universe.as_mut_slice()[511] = 7;

        let packet = encode(PortAddress::new(0, 0, 1), &universe, 42);

        assert_eq!(packet.len(), HEADER_LEN + CHANNEL_COUNT);
        assert_eq!(
            &packet[..HEADER_LEN],
            &[
                0x41, 0x72, 0x74, 0x2d, 0x4e, 0x65, 0x74, 0x00, // Art-Net\0
                0x00, 0x50, // OpDmx
                0x00, 0x0e, // version 14
                42, 0, // sequence, physical
                0x01, 0x00, // universe 1
                0x02, 0x00, // 512 channels
            ]
        );
        assert_eq!(packet[HEADER_LEN], 200);
        assert_eq!(packet[HEADER_LEN + 511], 7);
    }

    #[test]
    fn encode_port_address() {
        let packet = encode(PortAddress::new(0x85, 0x3, 0x1f), &Universe::zero(), 1);

        assert_eq!(packet[14], 0x3f);
        assert_eq!(packet[15], 0x05);
    }

    #[test]
    fn sequence_wraps_without_zero() {
        let mut sequence = Sequence::new();

        assert_eq!(sequence.next(), 1);
        for _ in 0..253 {
            assert_ne!(sequence.next(), 0);
        }
        assert_eq!(sequence.next(), 255);
        assert_eq!(sequence.next(), 1);
        assert_eq!(sequence.next(), 2);
    }
}
