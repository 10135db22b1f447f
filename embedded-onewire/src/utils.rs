#[derive(Debug, Default, Clone, Copy)]
/// Calculate CRC-8 used in 1-Wire communications.
///
/// Polynomial `x^8 + x^5 + x^4 + 1` (`0x8c` reflected), initial value 0.
pub struct OneWireCrc(u8);

#[cfg(feature = "crc-table")]
const CRC_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x1 == 0x1 {
                (crc >> 1) ^ 0x8c
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

impl OneWireCrc {
    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Update the CRC with the incoming byte.
    #[cfg(feature = "crc-table")]
    pub fn update(&mut self, byte: u8) {
        self.0 = CRC_TABLE[(self.0 ^ byte) as usize];
    }

    /// Update the CRC with the incoming byte.
    #[cfg(not(feature = "crc-table"))]
    pub fn update(&mut self, byte: u8) {
        let mut crc = self.0 ^ byte; // XOR the byte with the current CRC value
        for _ in 0..8 {
            if crc & 0x1 == 0x1 {
                crc = (crc >> 1) ^ 0x8c; // Polynomial for CRC-8
            } else {
                crc >>= 1;
            }
        }
        self.0 = crc;
    }

    /// Compute the 1-Wire CRC of a sequence of bytes.
    pub fn compute(data: &[u8]) -> u8 {
        let mut crc = OneWireCrc(0);
        for &byte in data.iter() {
            crc.update(byte);
        }
        crc.0
    }

    /// Validate a sequence of bytes where the last byte is the 1-Wire CRC of
    /// the previous bytes.
    pub fn validate(sequence: &[u8]) -> bool {
        let mut crc = OneWireCrc(0);
        for &byte in sequence.iter() {
            crc.update(byte); // Update CRC with the all bytes of the ROM
        }
        crc.0 == 0x0 // If the last byte of the ROM is the CRC, the result should be 0
    }
}
