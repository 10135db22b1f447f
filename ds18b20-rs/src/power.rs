use crate::{Address, DS18B20_READ_POWERMODE, Ds18b20, Ds18b20Error, Ds18b20Result};
use core::convert::Infallible;
use embedded_hal::{
    delay::DelayNs,
    digital::{Error, ErrorType, OutputPin},
};
use embedded_onewire::OneWire;

/// How a DS18B20 is powered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    /// V<sub>DD</sub> is connected to a supply.
    External,
    /// The device draws its power from the data line.
    Parasite,
}

/// Placeholder pin for drivers built without a strong pullup.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStrongPullup;

impl ErrorType for NoStrongPullup {
    type Error = Infallible;
}

impl OutputPin for NoStrongPullup {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<const N: usize, P> Ds18b20<N, P> {
    /// Reads the power supply mode of the device at `address`.
    ///
    /// The result is never cached: a device may be rewired between calls.
    pub fn power_mode<O: OneWire>(
        &self,
        bus: &mut O,
        address: &Address,
    ) -> Ds18b20Result<PowerMode, O::BusError> {
        Self::read_power_supply(bus, Some(address.to_u64()))
    }

    /// Whether the device at `address` is parasite powered.
    pub fn is_parasite_powered<O: OneWire>(
        &self,
        bus: &mut O,
        address: &Address,
    ) -> Ds18b20Result<bool, O::BusError> {
        Ok(self.power_mode(bus, address)? == PowerMode::Parasite)
    }

    /// Read Power Supply on one device, or on the whole bus with `None`.
    /// Any parasite-powered device pulls the read slot low.
    pub(crate) fn read_power_supply<O: OneWire>(
        bus: &mut O,
        rom: Option<u64>,
    ) -> Ds18b20Result<PowerMode, O::BusError> {
        bus.address(rom)?;
        bus.write_byte(DS18B20_READ_POWERMODE)?;
        Ok(if bus.read_bit()? {
            PowerMode::External
        } else {
            PowerMode::Parasite
        })
    }
}

impl<const N: usize, P: OutputPin> Ds18b20<N, P> {
    /// Waits `ms` milliseconds after a convert or copy command, driving the
    /// strong pullup for the whole wait if the devices are parasite powered.
    pub(crate) fn hold_power<E, D: DelayNs>(
        &mut self,
        delay: &mut D,
        power: PowerMode,
        ms: u32,
    ) -> Ds18b20Result<(), E> {
        match (power, self.pullup.as_mut()) {
            (PowerMode::Parasite, Some(pin)) => {
                pin.set_high().map_err(|e| Ds18b20Error::Pullup(e.kind()))?;
                delay.delay_ms(ms);
                pin.set_low().map_err(|e| Ds18b20Error::Pullup(e.kind()))?;
            }
            (PowerMode::Parasite, None) => {
                log::warn!("parasite-powered device without strong pullup, operation may fail");
                delay.delay_ms(ms);
            }
            (PowerMode::External, _) => delay.delay_ms(ms),
        }
        Ok(())
    }
}
