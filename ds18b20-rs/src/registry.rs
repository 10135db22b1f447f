use crate::{Address, Ds18b20, Ds18b20Result};
use embedded_onewire::{OneWire, OneWireError, OneWireSearch, OneWireSearchKind};

impl<const N: usize, P> Ds18b20<N, P> {
    /// Enumerates the devices on the bus and returns how many were found.
    ///
    /// The previous device table is discarded. ROM codes failing their CRC are
    /// skipped. At most `N` devices are kept: once the table is full the search
    /// stops and any remaining devices are not discovered. A bus without
    /// presence pulse yields `Ok(0)`.
    pub fn discover<O: OneWire>(&mut self, bus: &mut O) -> Ds18b20Result<usize, O::BusError> {
        self.devices = 0;
        let mut search = OneWireSearch::new(bus, OneWireSearchKind::Normal);
        loop {
            match search.next() {
                Ok(Some(rom)) => {
                    if self.devices == N {
                        log::warn!("device table full ({}), stopping search", N);
                        break;
                    }
                    let address = Address::from(rom);
                    if address.family_code() != Self::family() {
                        log::debug!("{address}: family {:#04x} is not a DS18B20", address.family_code());
                    }
                    self.roms[self.devices] = address;
                    self.devices += 1;
                }
                Ok(None) => break,
                Err(OneWireError::InvalidRomCrc) => {
                    log::debug!("dropping ROM with invalid CRC");
                }
                Err(OneWireError::NoDevicePresent) => break,
                Err(e) => return Err(e.into()),
            }
        }
        log::debug!("discovered {} devices", self.devices);
        Ok(self.devices)
    }

    /// Runs [`discover`](Ds18b20::discover) and returns whether any device was found.
    pub fn begin<O: OneWire>(&mut self, bus: &mut O) -> Ds18b20Result<bool, O::BusError> {
        Ok(self.discover(bus)? > 0)
    }

    /// Address of the `index`-th discovered device.
    pub fn address(&self, index: usize) -> Option<Address> {
        self.devices().get(index).copied()
    }

    /// Addresses of all discovered devices, in discovery order.
    pub fn devices(&self) -> &[Address] {
        &self.roms[..self.devices]
    }

    /// Number of discovered devices.
    pub fn count(&self) -> usize {
        self.devices
    }

    /// Returns the next device whose last conversion raised its alarm flag.
    ///
    /// Each call continues the same alarm search; `Ok(None)` ends the pass and
    /// the following call starts over. Devices with a corrupted ROM are skipped.
    pub fn alarm_search<O: OneWire>(
        &mut self,
        bus: &mut O,
    ) -> Ds18b20Result<Option<Address>, O::BusError> {
        loop {
            match self.alarm_search.next(bus) {
                Ok(Some(rom)) => return Ok(Some(Address::from(rom))),
                Ok(None) | Err(OneWireError::NoDevicePresent) => {
                    self.alarm_search.rewind();
                    return Ok(None);
                }
                Err(OneWireError::InvalidRomCrc) => {
                    log::debug!("alarm search: dropping ROM with invalid CRC");
                }
                Err(e) => {
                    self.alarm_search.rewind();
                    return Err(e.into());
                }
            }
        }
    }
}
