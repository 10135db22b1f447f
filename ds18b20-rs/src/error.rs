use embedded_hal::digital::ErrorKind;
use embedded_onewire::OneWireError;

#[derive(Debug)]
/// DS18B20 errors.
pub enum Ds18b20Error<E> {
    /// 1-Wire bus errors, including a missing presence pulse.
    Bus(OneWireError<E>),
    /// Requested resolution is outside 9..=12 bits. Nothing was sent on the bus.
    InvalidResolution(u8),
    /// Scratchpad read back with a CRC mismatch.
    ScratchpadCrc {
        /// CRC-8 of the first eight bytes as received.
        computed: u8,
        /// CRC byte sent by the device.
        received: u8,
    },
    /// TH, TL and configuration read back differently from what was written.
    WriteVerification {
        /// Bytes written (TH, TL, configuration).
        written: [u8; 3],
        /// Bytes read back.
        read: [u8; 3],
    },
    /// EEPROM contents recalled after a copy differ from the scratchpad.
    EepromVerification,
    /// The device did not report completion in time.
    RetriesExceeded,
    /// The strong pullup pin could not be driven.
    Pullup(ErrorKind),
}

impl<E> From<OneWireError<E>> for Ds18b20Error<E> {
    fn from(value: OneWireError<E>) -> Self {
        Self::Bus(value)
    }
}
