use crate::{
    Address, Configuration, DS18B20_COPY_SCRATCH, DS18B20_READ_SCRATCH, DS18B20_RECALL_EEPROM,
    DS18B20_WRITE_SCRATCH, Ds18b20, Ds18b20Error, Ds18b20Result, EEPROM_WRITE_MS, Resolution,
    Temperature,
};
use embedded_hal::{delay::DelayNs, digital::OutputPin};
use embedded_onewire::{OneWire, OneWireCrc};

/// Contents of the DS18B20 scratchpad memory.
///
/// | Byte | Description |
/// |------|-------------|
/// | 0    | Temperature LSB |
/// | 1    | Temperature MSB |
/// | 2    | T<sub>H</sub> register or user byte 1 |
/// | 3    | T<sub>L</sub> register or user byte 2 |
/// | 4    | Configuration register |
/// | 5-7  | Reserved (0xff, 0x0c, 0x10) |
/// | 8    | CRC-8 of bytes 0-7 |
///
/// Only CRC-valid reads are turned into a [`Scratchpad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad([u8; 9]);

impl Scratchpad {
    /// Checks the CRC of a scratchpad read from the bus.
    pub fn try_from_bytes<E>(bytes: [u8; 9]) -> Ds18b20Result<Self, E> {
        let computed = OneWireCrc::compute(&bytes[..8]);
        if computed != bytes[8] {
            return Err(Ds18b20Error::ScratchpadCrc {
                computed,
                received: bytes[8],
            });
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 9] {
        &self.0
    }

    /// Temperature register in 1/16 °C. Undefined low bits at reduced
    /// resolution are passed through as read.
    pub fn raw_temperature(&self) -> i16 {
        i16::from_le_bytes([self.0[0], self.0[1]])
    }

    pub fn temperature(&self) -> Temperature {
        Temperature::from_bits(self.raw_temperature())
    }

    /// Temperature in °C.
    pub fn celsius(&self) -> f32 {
        self.raw_temperature() as f32 / 16.0
    }

    /// High alarm threshold, T<sub>H</sub>.
    pub fn alarm_high(&self) -> i8 {
        self.0[2] as i8
    }

    /// Low alarm threshold, T<sub>L</sub>.
    pub fn alarm_low(&self) -> i8 {
        self.0[3] as i8
    }

    pub fn configuration(&self) -> Configuration {
        Configuration::from_bits(self.0[4])
    }

    pub fn resolution(&self) -> Resolution {
        self.configuration().resolution()
    }

    /// The EEPROM-backed bytes: T<sub>H</sub>, T<sub>L</sub> and configuration.
    pub fn user_bytes(&self) -> [u8; 3] {
        [self.0[2], self.0[3], self.0[4]]
    }
}

impl<const N: usize, P> Ds18b20<N, P> {
    /// Reads all 9 bytes of the scratchpad and checks their CRC.
    ///
    /// # Errors
    /// [`Ds18b20Error::ScratchpadCrc`] on a CRC mismatch. This is also what a
    /// device that stopped answering looks like: the bus reads all ones.
    pub fn read_scratchpad<O: OneWire>(
        &self,
        bus: &mut O,
        address: &Address,
    ) -> Ds18b20Result<Scratchpad, O::BusError> {
        bus.address(Some(address.to_u64()))?;
        bus.write_byte(DS18B20_READ_SCRATCH)?;
        let mut buf = [0; 9];
        for b in buf.iter_mut() {
            *b = bus.read_byte()?;
        }
        let scratchpad = Scratchpad::try_from_bytes(buf);
        if let Err(Ds18b20Error::ScratchpadCrc { computed, received }) = &scratchpad {
            log::debug!(
                "{address}: scratchpad CRC mismatch, computed {computed:#04x}, received {received:#04x}"
            );
        }
        scratchpad
    }

    /// Writes T<sub>H</sub>, T<sub>L</sub> and the configuration register, then
    /// reads them back.
    ///
    /// # Errors
    /// [`Ds18b20Error::WriteVerification`] if the device holds different values
    /// afterwards.
    pub fn write_scratchpad<O: OneWire>(
        &self,
        bus: &mut O,
        address: &Address,
        high: i8,
        low: i8,
        config: Configuration,
    ) -> Ds18b20Result<(), O::BusError> {
        let written = [high as u8, low as u8, config.into_bits()];
        bus.address(Some(address.to_u64()))?;
        bus.write_byte(DS18B20_WRITE_SCRATCH)?;
        for &b in written.iter() {
            bus.write_byte(b)?;
        }
        let read = self.read_scratchpad(bus, address)?.user_bytes();
        if read != written {
            return Err(Ds18b20Error::WriteVerification { written, read });
        }
        Ok(())
    }

    /// Reloads T<sub>H</sub>, T<sub>L</sub> and configuration from EEPROM and
    /// returns the resulting scratchpad.
    pub fn recall_e2<O: OneWire>(
        &self,
        bus: &mut O,
        address: &Address,
    ) -> Ds18b20Result<Scratchpad, O::BusError> {
        bus.address(Some(address.to_u64()))?;
        bus.write_byte(DS18B20_RECALL_EEPROM)?;
        // the device answers read slots with 0 until the recall is done
        let mut done = false;
        for _ in 0..self.retries {
            if bus.read_bit()? {
                done = true;
                break;
            }
        }
        if !done {
            return Err(Ds18b20Error::RetriesExceeded);
        }
        self.read_scratchpad(bus, address)
    }
}

impl<const N: usize, P: OutputPin> Ds18b20<N, P> {
    /// Copies T<sub>H</sub>, T<sub>L</sub> and configuration to EEPROM.
    ///
    /// Parasite-powered devices get the strong pullup for the EEPROM write
    /// time if one is configured. The copy is verified by recalling the EEPROM.
    ///
    /// # Errors
    /// [`Ds18b20Error::EepromVerification`] if the recalled bytes differ from
    /// the scratchpad that was copied.
    pub fn copy_scratchpad<O: OneWire, D: DelayNs>(
        &mut self,
        bus: &mut O,
        delay: &mut D,
        address: &Address,
    ) -> Ds18b20Result<(), O::BusError> {
        let copied = self.read_scratchpad(bus, address)?;
        let power = self.power_mode(bus, address)?;
        bus.address(Some(address.to_u64()))?;
        bus.write_byte(DS18B20_COPY_SCRATCH)?;
        self.hold_power::<O::BusError, D>(delay, power, EEPROM_WRITE_MS)?;
        let recalled = self.recall_e2(bus, address)?;
        if recalled.user_bytes() != copied.user_bytes() {
            log::warn!(
                "{address}: EEPROM holds {:02x?} after copying {:02x?}",
                recalled.user_bytes(),
                copied.user_bytes()
            );
            return Err(Ds18b20Error::EepromVerification);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    fn scratchpad(temp: i16) -> [u8; 9] {
        let [lsb, msb] = temp.to_le_bytes();
        let mut bytes = [lsb, msb, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10, 0];
        bytes[8] = OneWireCrc::compute(&bytes[..8]);
        bytes
    }

    fn decode(bytes: [u8; 9]) -> Ds18b20Result<Scratchpad, Infallible> {
        Scratchpad::try_from_bytes(bytes)
    }

    #[test]
    fn decodes_fields() {
        let pad = decode(scratchpad(0x0191)).unwrap();
        assert_eq!(pad.raw_temperature(), 0x0191);
        assert_eq!(pad.celsius(), 25.0625);
        assert_eq!(pad.temperature(), Temperature::from_num(25.0625));
        assert_eq!(pad.alarm_high(), 75);
        assert_eq!(pad.alarm_low(), 70);
        assert_eq!(pad.resolution(), Resolution::Resolution12bit);
        assert_eq!(pad.user_bytes(), [0x4b, 0x46, 0x7f]);
    }

    #[test]
    fn decodes_negative_temperature() {
        let pad = decode(scratchpad(0xff5e_u16 as i16)).unwrap();
        assert_eq!(pad.celsius(), -10.125);
        assert_eq!(pad.temperature(), Temperature::from_num(-10.125));
    }

    #[test]
    fn rejects_any_single_bit_flip() {
        let good = scratchpad(0x0550);
        for byte in 0..8 {
            for bit in 0..8 {
                let mut bad = good;
                bad[byte] ^= 1 << bit;
                assert!(
                    matches!(
                        decode(bad),
                        Err(Ds18b20Error::ScratchpadCrc { received, .. }) if received == good[8]
                    ),
                    "byte {byte} bit {bit}"
                );
            }
        }
    }

    #[test]
    fn all_ones_is_rejected() {
        assert!(decode([0xff; 9]).is_err());
    }
}
