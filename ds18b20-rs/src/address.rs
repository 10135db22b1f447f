use core::fmt;
use embedded_onewire::OneWireCrc;

/// 64-bit ROM code of a 1-Wire device.
///
/// | Byte | Description |
/// |------|-------------|
/// | 0    | Family code (0x28 for DS18B20) |
/// | 1-6  | Serial number, least significant byte first |
/// | 7    | CRC-8 of bytes 0-6 |
///
/// The `u64` packing is little-endian, matching [`OneWire::address`](embedded_onewire::OneWire::address)
/// and [`OneWireSearch`](embedded_onewire::OneWireSearch).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Address([u8; 8]);

impl Address {
    /// Number of bytes in a ROM code.
    pub const BYTES: usize = 8;

    /// Wraps a ROM code as read from the bus.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// ROM code bytes in bus order.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0
    }

    /// Little-endian packing of the ROM code.
    pub const fn to_u64(self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    pub const fn family_code(&self) -> u8 {
        self.0[0]
    }

    /// 48-bit serial number.
    pub fn serial(&self) -> u64 {
        let mut serial = [0; 8];
        serial[..6].copy_from_slice(&self.0[1..7]);
        u64::from_le_bytes(serial)
    }

    pub const fn crc(&self) -> u8 {
        self.0[7]
    }

    /// Whether byte 7 is the CRC-8 of bytes 0-6.
    pub fn is_valid(&self) -> bool {
        OneWireCrc::validate(&self.0)
    }
}

impl From<[u8; 8]> for Address {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl From<Address> for [u8; 8] {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl From<u64> for Address {
    fn from(rom: u64) -> Self {
        Self(rom.to_le_bytes())
    }
}

impl From<Address> for u64 {
    fn from(address: Address) -> Self {
        address.to_u64()
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
