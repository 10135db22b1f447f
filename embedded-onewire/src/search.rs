use crate::{
    OneWire, OneWireStatus,
    consts::{ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_SEARCH_CMD},
    error::OneWireError,
    utils::OneWireCrc,
};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Type of search performed using [`OneWireSearch`] or [`OneWireSearchState`].
pub enum OneWireSearchKind {
    /// Normal search
    Normal = ONEWIRE_SEARCH_CMD,
    /// Search only for devices with alarm
    Alarmed = ONEWIRE_CONDITIONAL_SEARCH_CMD,
}

/// State of a [1-Wire search](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html)
/// that does not borrow the bus.
///
/// Drivers that need to resume a search across calls (e.g. an alarm scan
/// returning one device per call) keep this state and pass the bus to
/// [`next`](OneWireSearchState::next) each time.
#[derive(Debug, Clone)]
pub struct OneWireSearchState {
    cmd: u8,
    last_device: bool,
    last_discrepancy: u8,
    rom: [u8; 8],
}

impl OneWireSearchState {
    /// Creates a new search state for the given kind of search.
    pub const fn new(kind: OneWireSearchKind) -> Self {
        Self {
            cmd: kind as _,
            last_device: false,
            last_discrepancy: 0,
            rom: [0; 8],
        }
    }

    /// Resets the search state, so that the next call to
    /// [`next`](OneWireSearchState::next) starts a new pass over the bus.
    pub fn rewind(&mut self) {
        self.last_device = false; // Reset the last device flag
        self.last_discrepancy = 0; // Reset the last discrepancy
        self.rom = [0; 8]; // Reset the ROM array
    }

    /// Returns `true` once the last device of the current pass has been reported.
    pub fn is_exhausted(&self) -> bool {
        self.last_device
    }

    /// Searches for the next device on the 1-Wire bus.
    ///
    /// # Returns
    /// A result containing the ROM code of the found device as a `u64` value
    /// (little-endian packing of the 8 ROM bytes):
    ///
    /// | Bit | Description |
    /// |-----|-------------|
    /// | 0-7 | Family code (e.g., 0x28 for DS18B20) |
    /// | 8-55 | Serial number |
    /// | 56-63 | CRC-8 (`0b1_0001_1001` poly) |
    ///
    /// `Ok(None)` is returned once the pass is complete, or if the devices stopped
    /// responding during the pass.
    ///
    /// # Errors
    /// * [`OneWireError::NoDevicePresent`] if no presence pulse answered the reset.
    /// * [`OneWireError::ShortCircuit`] if the bus master reports a short.
    /// * [`OneWireError::InvalidRomCrc`] if the ROM read during this step fails
    ///   its CRC. The state has advanced past that ROM, so calling `next` again
    ///   continues with the following device.
    pub fn next<T: OneWire>(
        &mut self,
        onewire: &mut T,
    ) -> Result<Option<u64>, OneWireError<T::BusError>> {
        if self.last_device {
            return Ok(None); // If the last device was found, return None
        }
        let status = onewire.reset()?;
        if status.shortcircuit() {
            return Err(OneWireError::ShortCircuit);
        }
        if !status.presence() {
            return Err(OneWireError::NoDevicePresent);
        }
        let mut id_bit_num: u8 = 1;
        let mut last_zero: u8 = 0;
        let mut idx: usize = 0; // Index in the ROM array
        let mut rom_mask: u8 = 1; // Mask for the current bit in the ROM byte
        onewire.write_byte(self.cmd)?; // Search ROM command
        let res = loop {
            let id_bit = onewire.read_bit()?;
            let complement_bit = onewire.read_bit()?;
            if id_bit && complement_bit {
                // Both bits are 1: no device is participating anymore
                break false;
            }
            let set = if id_bit != complement_bit {
                // All participating devices agree on this bit
                id_bit
            } else {
                // Discrepancy: repeat the previous choice below the last discrepancy,
                // take the 1 branch at it, and the 0 branch above it.
                let dir = if id_bit_num < self.last_discrepancy {
                    self.rom[idx] & rom_mask > 0
                } else {
                    id_bit_num == self.last_discrepancy
                };
                if !dir {
                    last_zero = id_bit_num;
                }
                dir
            };
            if set {
                self.rom[idx] |= rom_mask; // Set the bit in the ROM
            } else {
                self.rom[idx] &= !rom_mask; // Clear the bit in the ROM
            }
            onewire.write_bit(set)?; // Deselect devices that disagree

            id_bit_num += 1;
            rom_mask <<= 1; // Move to the next bit in the ROM byte

            if rom_mask == 0 {
                idx += 1; // Move to the next byte in the ROM
                rom_mask = 1; // Reset the mask for the next byte
            }
            if id_bit_num > 64 {
                self.last_discrepancy = last_zero;
                self.last_device = self.last_discrepancy == 0;
                break true;
            }
        };

        if !res || self.rom[0] == 0 {
            // Nothing usable on this pass, end it
            self.last_device = true;
            return Ok(None);
        }
        if !OneWireCrc::validate(&self.rom) {
            return Err(OneWireError::InvalidRomCrc);
        }
        Ok(Some(u64::from_le_bytes(self.rom)))
    }
}

/// A structure for searching devices on a 1-Wire bus.
/// This structure implements the search algorithm for discovering devices on the 1-Wire bus.
/// It maintains the state of the search and borrows the bus for its lifetime.
pub struct OneWireSearch<'a, T> {
    onewire: &'a mut T,
    state: OneWireSearchState,
}

impl<'a, T> OneWireSearch<'a, T> {
    /// Creates a new [`OneWireSearch`] instance.
    ///
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWire` trait.
    /// * `cmd` - The kind of search to run (normal search, or search for devices in alarm state).
    pub fn new(onewire: &'a mut T, cmd: OneWireSearchKind) -> Self {
        Self {
            onewire,
            state: OneWireSearchState::new(cmd),
        }
    }
}

impl<T: OneWire> OneWireSearch<'_, T> {
    /// Searches for devices on the 1-Wire bus.
    /// The [next](OneWireSearch::next) method can be called repeatedly to find all devices on the bus.
    /// At the end of the search, calling this method will return `None` to indicate that no more devices are present.
    ///
    /// See [`OneWireSearchState::next`] for the returned value and errors.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<u64>, OneWireError<T::BusError>> {
        self.state.next(self.onewire)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use std::vec::Vec;

    /// Bus with devices answering the search protocol with wired-AND semantics.
    struct SearchBus {
        roms: Vec<[u8; 8]>,
        active: Vec<bool>,
        bit: usize,
        step: u8,
    }

    struct Presence(bool);

    impl OneWireStatus for Presence {
        fn presence(&self) -> bool {
            self.0
        }

        fn shortcircuit(&self) -> bool {
            false
        }
    }

    impl SearchBus {
        fn new(roms: &[[u8; 8]]) -> Self {
            Self {
                roms: roms.to_vec(),
                active: Vec::new(),
                bit: 0,
                step: 0,
            }
        }

        fn rom_bit(rom: &[u8; 8], bit: usize) -> bool {
            rom[bit / 8] & (1 << (bit % 8)) != 0
        }
    }

    impl OneWire for SearchBus {
        type Status = Presence;
        type BusError = ();

        fn reset(&mut self) -> Result<Presence, OneWireError<()>> {
            self.active = std::vec![true; self.roms.len()];
            self.bit = 0;
            self.step = 0;
            Ok(Presence(!self.roms.is_empty()))
        }

        fn write_byte(&mut self, _byte: u8) -> Result<(), OneWireError<()>> {
            Ok(())
        }

        fn read_byte(&mut self) -> Result<u8, OneWireError<()>> {
            Ok(0xff)
        }

        fn write_bit(&mut self, bit: bool) -> Result<(), OneWireError<()>> {
            for (rom, active) in self.roms.iter().zip(self.active.iter_mut()) {
                if Self::rom_bit(rom, self.bit) != bit {
                    *active = false;
                }
            }
            self.bit += 1;
            self.step = 0;
            Ok(())
        }

        fn read_bit(&mut self) -> Result<bool, OneWireError<()>> {
            let complement = self.step == 1;
            self.step += 1;
            Ok(self
                .roms
                .iter()
                .zip(self.active.iter())
                .filter(|(_, active)| **active)
                .all(|(rom, _)| Self::rom_bit(rom, self.bit) != complement))
        }
    }

    fn rom(family: u8, serial: [u8; 6]) -> [u8; 8] {
        let mut rom = [family, 0, 0, 0, 0, 0, 0, 0];
        rom[1..7].copy_from_slice(&serial);
        rom[7] = OneWireCrc::compute(&rom[..7]);
        rom
    }

    #[test]
    fn finds_every_device() {
        let roms = [
            rom(0x28, [1, 0, 0, 0, 0, 0]),
            rom(0x28, [2, 0, 0, 0, 0, 0]),
            rom(0x28, [3, 0x40, 0, 0, 0, 0]),
            rom(0x10, [0xaa, 0x55, 0, 0, 0, 1]),
        ];
        let mut bus = SearchBus::new(&roms);
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        let mut found = Vec::new();
        while let Some(rom) = search.next().unwrap() {
            found.push(rom.to_le_bytes());
        }
        found.sort();
        let mut expected = roms.to_vec();
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn single_device_ends_search() {
        let roms = [rom(0x28, [9, 8, 7, 6, 5, 4])];
        let mut bus = SearchBus::new(&roms);
        let mut state = OneWireSearchState::new(OneWireSearchKind::Normal);
        assert_eq!(
            state.next(&mut bus).unwrap(),
            Some(u64::from_le_bytes(roms[0]))
        );
        assert!(state.is_exhausted());
        assert_eq!(state.next(&mut bus).unwrap(), None);
        state.rewind();
        assert_eq!(
            state.next(&mut bus).unwrap(),
            Some(u64::from_le_bytes(roms[0]))
        );
    }

    #[test]
    fn bad_crc_is_reported_and_skipped() {
        let mut bad = rom(0x28, [5, 0, 0, 0, 0, 0]);
        bad[7] ^= 0x01;
        let good = rom(0x28, [4, 0, 0, 0, 0, 0]);
        let mut bus = SearchBus::new(&[bad, good]);
        let mut state = OneWireSearchState::new(OneWireSearchKind::Normal);
        let mut found = Vec::new();
        let mut rejected = 0;
        loop {
            match state.next(&mut bus) {
                Ok(Some(rom)) => found.push(rom),
                Ok(None) => break,
                Err(OneWireError::InvalidRomCrc) => rejected += 1,
                Err(e) => panic!("unexpected error {e:?}"),
            }
        }
        assert_eq!(found, std::vec![u64::from_le_bytes(good)]);
        assert_eq!(rejected, 1);
    }

    #[test]
    fn empty_bus_reports_no_presence() {
        let mut bus = SearchBus::new(&[]);
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Alarmed);
        assert_eq!(search.next(), Err(OneWireError::NoDevicePresent));
    }
}
