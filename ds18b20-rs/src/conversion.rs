use crate::{Address, DS18B20_START_CONV, Ds18b20, Ds18b20Result};
use embedded_hal::{delay::DelayNs, digital::OutputPin};
use embedded_onewire::OneWire;

/// Temperature in °C with 1/16 °C steps, as stored in the scratchpad.
pub type Temperature = fixed::types::I12F4;

/// Conversion time in milliseconds for a resolution of `bits`.
///
/// Anything other than 9, 10 or 11 waits for a full 12-bit conversion.
pub const fn conversion_delay_ms(bits: u8) -> u32 {
    match bits {
        9 => 94,
        10 => 188,
        11 => 375,
        _ => 750,
    }
}

#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Thermometer resolution, encoded as the R1:R0 bits of the configuration register.
pub enum Resolution {
    /// 0.5 °C steps, 93.75 ms conversion.
    Resolution9bit = 0,
    /// 0.25 °C steps, 187.5 ms conversion.
    Resolution10bit = 1,
    /// 0.125 °C steps, 375 ms conversion.
    Resolution11bit = 2,
    /// 0.0625 °C steps, 750 ms conversion. Power-on default.
    #[default]
    Resolution12bit = 3,
}

impl Resolution {
    /// Resolution in bits (9 to 12).
    pub const fn bits(self) -> u8 {
        self as u8 + 9
    }

    /// Resolution for `bits`, if it is one of 9 to 12.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        use Resolution::*;
        match bits {
            9 => Some(Resolution9bit),
            10 => Some(Resolution10bit),
            11 => Some(Resolution11bit),
            12 => Some(Resolution12bit),
            _ => None,
        }
    }

    /// Decodes the two R1:R0 bits of the configuration register.
    pub const fn from_config_bits(r: u8) -> Self {
        use Resolution::*;
        match r & 0b11 {
            0b00 => Resolution9bit,
            0b01 => Resolution10bit,
            0b10 => Resolution11bit,
            _ => Resolution12bit,
        }
    }

    pub const fn conversion_time_ms(self) -> u32 {
        conversion_delay_ms(self.bits())
    }
}

impl TryFrom<u8> for Resolution {
    type Error = &'static str;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::from_bits(bits).ok_or("Invalid readout resolution")
    }
}

impl<const N: usize, P> Ds18b20<N, P> {
    /// Reads the temperature register without starting a conversion, in 1/16 °C.
    ///
    /// Returns whatever the last conversion left there (+85 °C after power-up).
    pub fn read_raw_temperature<O: OneWire>(
        &self,
        bus: &mut O,
        address: &Address,
    ) -> Ds18b20Result<i16, O::BusError> {
        Ok(self.read_scratchpad(bus, address)?.raw_temperature())
    }
}

impl<const N: usize, P: OutputPin> Ds18b20<N, P> {
    /// Starts a conversion on the device at `address` and waits for it.
    ///
    /// The resolution and power mode are read first so the strong pullup, if
    /// any, is held for exactly the conversion. Returns the resolution the
    /// wait was sized for.
    pub fn convert<O: OneWire, D: DelayNs>(
        &mut self,
        bus: &mut O,
        delay: &mut D,
        address: &Address,
    ) -> Ds18b20Result<Resolution, O::BusError> {
        let resolution = self.read_scratchpad(bus, address)?.resolution();
        let power = self.power_mode(bus, address)?;
        bus.address(Some(address.to_u64()))?;
        bus.write_byte(DS18B20_START_CONV)?;
        self.hold_power::<O::BusError, D>(delay, power, resolution.conversion_time_ms())?;
        Ok(resolution)
    }

    /// Converts and reads the temperature of the device at `address`, in °C.
    pub fn read_temperature<O: OneWire, D: DelayNs>(
        &mut self,
        bus: &mut O,
        delay: &mut D,
        address: &Address,
    ) -> Ds18b20Result<f32, O::BusError> {
        self.convert(bus, delay, address)?;
        Ok(self.read_scratchpad(bus, address)?.celsius())
    }

    /// Converts and reads the temperature of the device at `address`.
    pub fn read_temperature_fixed<O: OneWire, D: DelayNs>(
        &mut self,
        bus: &mut O,
        delay: &mut D,
        address: &Address,
    ) -> Ds18b20Result<Temperature, O::BusError> {
        self.convert(bus, delay, address)?;
        Ok(self.read_scratchpad(bus, address)?.temperature())
    }

    /// Starts a conversion on every device of the bus at once (Skip ROM) and
    /// waits for a conversion at `resolution`.
    ///
    /// Pass the highest resolution configured on the bus. The strong pullup is
    /// held if any device is parasite powered. Read the results with
    /// [`read_raw_temperature`](Ds18b20::read_raw_temperature) or
    /// [`read_scratchpad`](Ds18b20::read_scratchpad).
    pub fn convert_all<O: OneWire, D: DelayNs>(
        &mut self,
        bus: &mut O,
        delay: &mut D,
        resolution: Resolution,
    ) -> Ds18b20Result<(), O::BusError> {
        let power = Self::read_power_supply(bus, None)?;
        bus.address(None)?;
        bus.write_byte(DS18B20_START_CONV)?;
        self.hold_power::<O::BusError, D>(delay, power, resolution.conversion_time_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_per_resolution() {
        assert_eq!(conversion_delay_ms(9), 94);
        assert_eq!(conversion_delay_ms(10), 188);
        assert_eq!(conversion_delay_ms(11), 375);
        assert_eq!(conversion_delay_ms(12), 750);
        assert_eq!(conversion_delay_ms(0), 750);
        assert_eq!(conversion_delay_ms(13), 750);
        assert_eq!(Resolution::Resolution10bit.conversion_time_ms(), 188);
    }

    #[test]
    fn bits_round_trip() {
        for bits in 9..=12 {
            let resolution = Resolution::try_from(bits).unwrap();
            assert_eq!(resolution.bits(), bits);
            assert_eq!(Resolution::from_config_bits(resolution as u8), resolution);
        }
        assert!(Resolution::try_from(8).is_err());
        assert!(Resolution::from_bits(13).is_none());
        assert_eq!(Resolution::default(), Resolution::Resolution12bit);
    }
}
