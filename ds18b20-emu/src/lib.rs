//! # ds18b20-emu
//!
//! An emulated 1-Wire bus with virtual DS18B20 sensors attached.
//!
//! [`EmulatedBus`] implements [`OneWire`](embedded_onewire::OneWire) at the byte and
//! bit level: reset/presence, Match/Skip/Read ROM, the search and alarm search
//! protocols, and the DS18B20 function commands. Parasite-powered sensors only
//! complete conversions and EEPROM copies while the bus' [`EmulatedPullup`] is
//! engaged. Every bus operation, pullup change and [`EmulatedDelay`] wait is
//! recorded in a [transcript](EmulatedBus::transcript).

mod bus;
mod sensor;

pub use bus::{BusEvent, EmulatedBus, EmulatedDelay, EmulatedPullup, EmulatedStatus};
pub use sensor::{DS18B20_FAMILY, POWER_ON_TEMPERATURE, VirtualSensor};
