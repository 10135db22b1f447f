#![no_std]
//! # ds18b20
//! A no-std driver for DS18B20 digital thermometers on a 1-Wire bus.
//!
//! The driver is written against the [`OneWire`] trait: any bus master
//! implementing it can be used. The bus and a [`DelayNs`](embedded_hal::delay::DelayNs)
//! provider are borrowed for the duration of each call; the driver itself only
//! owns the table of discovered devices and, optionally, the output pin driving
//! a strong pullup for parasite-powered sensors.
//!
//! ```ignore
//! let mut sensors = Ds18b20::<16>::new().with_strong_pullup(pin);
//! sensors.discover(&mut bus)?;
//! for index in 0..sensors.count() {
//!     if let Some(address) = sensors.address(index) {
//!         let celsius = sensors.read_temperature(&mut bus, &mut delay, &address)?;
//!         log::info!("{address}: {celsius} °C");
//!     }
//! }
//! ```
//!
//! Every operation returns a [`Ds18b20Result`]; nothing is retried
//! automatically.

mod address;
mod configuration;
mod conversion;
mod error;
mod power;
mod registry;
mod scratchpad;

pub use address::Address;
pub use configuration::Configuration;
pub use conversion::{Resolution, Temperature, conversion_delay_ms};
pub use embedded_onewire::{OneWire, OneWireError, OneWireResult};
pub use error::Ds18b20Error;
pub use power::{NoStrongPullup, PowerMode};
pub use scratchpad::Scratchpad;

use embedded_onewire::{OneWireCrc, OneWireSearchKind, OneWireSearchState};

/// Results of DS18B20-specific function calls.
pub type Ds18b20Result<T, E> = Result<T, Ds18b20Error<E>>;

/// Number of devices [`Ds18b20`] keeps track of unless told otherwise.
pub const DEFAULT_CAPACITY: usize = 16;

const DS18B20_START_CONV: u8 = 0x44;
const DS18B20_READ_SCRATCH: u8 = 0xbe;
const DS18B20_WRITE_SCRATCH: u8 = 0x4e;
const DS18B20_COPY_SCRATCH: u8 = 0x48;
const DS18B20_RECALL_EEPROM: u8 = 0xb8;
const DS18B20_READ_POWERMODE: u8 = 0xb4;

/// EEPROM write time, t<sub>WR</sub>.
const EEPROM_WRITE_MS: u32 = 10;

/// DS18B20 sensors sharing one 1-Wire bus.
///
/// `N` bounds the number of devices kept by [`discover`](Ds18b20::discover).
/// `P` is the output pin driving the strong pullup (see
/// [`with_strong_pullup`](Ds18b20::with_strong_pullup)).
#[derive(Debug)]
pub struct Ds18b20<const N: usize = DEFAULT_CAPACITY, P = NoStrongPullup> {
    devices: usize,
    roms: [Address; N],
    pullup: Option<P>,
    alarm_search: OneWireSearchState,
    retries: u8,
}

impl<const N: usize> Default for Ds18b20<N, NoStrongPullup> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Ds18b20<N, NoStrongPullup> {
    /// Creates a driver with an empty device table and no strong pullup.
    pub fn new() -> Self {
        Self {
            devices: 0,
            roms: [Address::default(); N],
            pullup: None,
            alarm_search: OneWireSearchState::new(OneWireSearchKind::Alarmed),
            retries: 100,
        }
    }

    /// Uses `pin` (active high) to drive the strong pullup while parasite-powered
    /// devices convert or copy their scratchpad to EEPROM.
    pub fn with_strong_pullup<P>(self, pin: P) -> Ds18b20<N, P> {
        Ds18b20 {
            devices: self.devices,
            roms: self.roms,
            pullup: Some(pin),
            alarm_search: self.alarm_search,
            retries: self.retries,
        }
    }
}

impl<const N: usize, P> Ds18b20<N, P> {
    /// Family code of DS18B20 ROM addresses.
    #[inline]
    pub const fn family() -> u8 {
        0x28
    }

    /// Maximum number of devices kept by [`discover`](Ds18b20::discover).
    #[inline]
    pub const fn capacity() -> usize {
        N
    }

    /// Set the retry count.
    ///
    /// The retry count bounds the number of read slots spent waiting for a
    /// device to report completion of an EEPROM recall.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    /// Whether a strong pullup pin was configured.
    pub fn has_strong_pullup(&self) -> bool {
        self.pullup.is_some()
    }
}

/// 1-Wire CRC-8 of `data`, as used for ROM codes and scratchpads.
pub fn crc8(data: &[u8]) -> u8 {
    OneWireCrc::compute(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc8_matches_rom_byte() {
        let rom = [0x02, 0x1c, 0xb8, 0x01, 0x00, 0x00, 0x00, 0xa2];
        assert_eq!(crc8(&rom[..7]), rom[7]);
    }

    #[test]
    fn new_driver_is_empty() {
        let sensors: Ds18b20 = Ds18b20::new();
        assert_eq!(sensors.count(), 0);
        assert!(sensors.devices().is_empty());
        assert!(sensors.address(0).is_none());
        assert!(!sensors.has_strong_pullup());
        assert_eq!(<Ds18b20<4>>::capacity(), 4);
        assert_eq!(<Ds18b20<4>>::family(), 0x28);
    }
}
