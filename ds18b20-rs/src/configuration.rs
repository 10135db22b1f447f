use crate::{Address, Ds18b20, Ds18b20Error, Ds18b20Result, Resolution};
use bitfield_struct::bitfield;
use embedded_hal::{delay::DelayNs, digital::OutputPin};
use embedded_onewire::OneWire;

#[bitfield(u8)]
#[derive(PartialEq, Eq)]
/// # Configuration register
///
/// Byte 4 of the scratchpad. Only R1:R0 (bits 6:5) are writable; bits 4:0
/// always read as 1 and bit 7 as 0. The power-on default is `0x7f`
/// (12-bit resolution).
pub struct Configuration {
    #[bits(5, default = 0x1f)]
    __: u8,
    /// R1:R0, see [`Resolution`].
    #[bits(2, default = 3)]
    pub resolution_bits: u8,
    #[bits(1)]
    __: u8,
}

impl Configuration {
    /// The register value a device holds after being set to `resolution`.
    pub const fn for_resolution(resolution: Resolution) -> Self {
        Self::new().with_resolution_bits(resolution as u8)
    }

    pub const fn resolution(&self) -> Resolution {
        Resolution::from_config_bits(self.resolution_bits())
    }
}

impl<const N: usize, P> Ds18b20<N, P> {
    /// Resolution configured on the device at `address`.
    pub fn resolution<O: OneWire>(
        &self,
        bus: &mut O,
        address: &Address,
    ) -> Ds18b20Result<Resolution, O::BusError> {
        Ok(self.read_scratchpad(bus, address)?.resolution())
    }

    /// Alarm thresholds (T<sub>H</sub>, T<sub>L</sub>) of the device at `address`, in °C.
    pub fn alarms<O: OneWire>(
        &self,
        bus: &mut O,
        address: &Address,
    ) -> Ds18b20Result<(i8, i8), O::BusError> {
        let scratchpad = self.read_scratchpad(bus, address)?;
        Ok((scratchpad.alarm_high(), scratchpad.alarm_low()))
    }
}

impl<const N: usize, P: OutputPin> Ds18b20<N, P> {
    /// Sets the resolution of the device at `address` to `bits` (9 to 12),
    /// keeping its alarm thresholds. With `persist`, the new settings are
    /// also copied to EEPROM.
    ///
    /// # Errors
    /// [`Ds18b20Error::InvalidResolution`] for any other `bits`, before
    /// anything is sent on the bus.
    pub fn set_resolution<O: OneWire, D: DelayNs>(
        &mut self,
        bus: &mut O,
        delay: &mut D,
        address: &Address,
        bits: u8,
        persist: bool,
    ) -> Ds18b20Result<(), O::BusError> {
        let Some(resolution) = Resolution::from_bits(bits) else {
            return Err(Ds18b20Error::InvalidResolution(bits));
        };
        let scratchpad = self.read_scratchpad(bus, address)?;
        self.write_scratchpad(
            bus,
            address,
            scratchpad.alarm_high(),
            scratchpad.alarm_low(),
            Configuration::for_resolution(resolution),
        )?;
        if persist {
            self.copy_scratchpad(bus, delay, address)?;
        }
        log::debug!("{address}: resolution set to {bits} bits");
        Ok(())
    }

    /// Sets the alarm thresholds of the device at `address`, keeping its
    /// resolution. With `persist`, the new settings are also copied to EEPROM.
    pub fn set_alarms<O: OneWire, D: DelayNs>(
        &mut self,
        bus: &mut O,
        delay: &mut D,
        address: &Address,
        high: i8,
        low: i8,
        persist: bool,
    ) -> Ds18b20Result<(), O::BusError> {
        let resolution = self.resolution(bus, address)?;
        self.write_scratchpad(
            bus,
            address,
            high,
            low,
            Configuration::for_resolution(resolution),
        )?;
        if persist {
            self.copy_scratchpad(bus, delay, address)?;
        }
        Ok(())
    }
}
