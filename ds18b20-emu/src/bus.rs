use crate::VirtualSensor;
use core::{convert::Infallible, time::Duration};
use embedded_hal::{
    delay::DelayNs,
    digital::{ErrorType, OutputPin},
};
use embedded_onewire::{
    OneWire, OneWireResult, OneWireStatus,
    consts::{
        ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_MATCH_ROM_CMD, ONEWIRE_READ_ROM_CMD,
        ONEWIRE_SEARCH_CMD, ONEWIRE_SKIP_ROM_CMD,
    },
};
use std::{cell::RefCell, collections::VecDeque, rc::Rc};

const CONVERT_T: u8 = 0x44;
const WRITE_SCRATCHPAD: u8 = 0x4e;
const READ_SCRATCHPAD: u8 = 0xbe;
const COPY_SCRATCHPAD: u8 = 0x48;
const RECALL_E2: u8 = 0xb8;
const READ_POWER_SUPPLY: u8 = 0xb4;

/// Everything that happened on the emulated bus, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    /// Reset/presence-detect cycle.
    Reset,
    /// Byte written by the master.
    Write(u8),
    /// Byte read by the master.
    Read(u8),
    /// Single write slot.
    WriteBit(bool),
    /// Single read slot.
    ReadBit(bool),
    /// Strong pullup engaged (`true`) or released (`false`).
    Pullup(bool),
    /// The master waited through [`EmulatedDelay`].
    Sleep(Duration),
}

/// Bus status returned by [`EmulatedBus::reset`](OneWire::reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulatedStatus {
    presence: bool,
}

impl OneWireStatus for EmulatedStatus {
    fn presence(&self) -> bool {
        self.presence
    }

    fn shortcircuit(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default)]
enum Phase {
    #[default]
    Idle,
    RomCommand,
    MatchRom {
        received: [u8; 8],
        count: usize,
    },
    Function,
    WriteScratchpad {
        offset: usize,
    },
    Reading(VecDeque<u8>),
    PowerSupply,
    Ready,
    Search {
        bit: usize,
        step: u8,
    },
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Convert(usize),
    Copy(usize),
}

#[derive(Debug, Default)]
struct BusState {
    sensors: Vec<VirtualSensor>,
    selected: Vec<bool>,
    phase: Phase,
    pending: Vec<Pending>,
    pullup: bool,
    transcript: Vec<BusEvent>,
}

impl BusState {
    fn selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.selected
            .iter()
            .enumerate()
            .filter(|(_, s)| **s)
            .map(|(i, _)| i)
    }

    fn rom_bit(&self, index: usize, bit: usize) -> bool {
        self.sensors[index].rom[bit / 8] & (1 << (bit % 8)) != 0
    }

    /// Runs `op` now if the sensor has power for it, or defers it until the
    /// strong pullup is engaged.
    fn powered(&mut self, index: usize, op: Pending) {
        if self.sensors[index].parasite && !self.pullup {
            self.pending.push(op);
        } else {
            self.run(op);
        }
    }

    fn run(&mut self, op: Pending) {
        match op {
            Pending::Convert(i) => self.sensors[i].convert(),
            Pending::Copy(i) => self.sensors[i].copy_scratchpad(),
        }
    }

    fn abandon_pending(&mut self) {
        for op in core::mem::take(&mut self.pending) {
            match op {
                Pending::Convert(i) => {
                    log::warn!("conversion on parasite sensor {i} ran without strong pullup");
                    self.sensors[i].fail_conversion();
                }
                Pending::Copy(i) => {
                    log::warn!("EEPROM copy on parasite sensor {i} ran without strong pullup");
                }
            }
        }
    }

    fn rom_command(&mut self, byte: u8) {
        self.phase = match byte {
            ONEWIRE_MATCH_ROM_CMD => Phase::MatchRom {
                received: [0; 8],
                count: 0,
            },
            ONEWIRE_SKIP_ROM_CMD => {
                self.selected.fill(true);
                Phase::Function
            }
            ONEWIRE_READ_ROM_CMD => {
                let rom = self
                    .sensors
                    .iter()
                    .fold([0xff; 8], |acc, s| core::array::from_fn(|i| acc[i] & s.rom[i]));
                Phase::Reading(rom.into_iter().collect())
            }
            ONEWIRE_SEARCH_CMD | ONEWIRE_CONDITIONAL_SEARCH_CMD => {
                let alarmed_only = byte == ONEWIRE_CONDITIONAL_SEARCH_CMD;
                for (selected, sensor) in self.selected.iter_mut().zip(self.sensors.iter()) {
                    *selected = !alarmed_only || sensor.is_alarmed();
                }
                Phase::Search { bit: 0, step: 0 }
            }
            _ => Phase::Idle,
        };
    }

    fn function_command(&mut self, byte: u8) {
        let selected: Vec<usize> = self.selected().collect();
        self.phase = match byte {
            CONVERT_T => {
                for &i in &selected {
                    self.powered(i, Pending::Convert(i));
                }
                Phase::Ready
            }
            READ_SCRATCHPAD => {
                let mut data = [0xff; 9];
                for &i in &selected {
                    let pad = self.sensors[i].read_scratchpad();
                    for (d, p) in data.iter_mut().zip(pad) {
                        *d &= p; // wired-AND
                    }
                }
                Phase::Reading(data.into_iter().collect())
            }
            WRITE_SCRATCHPAD => Phase::WriteScratchpad { offset: 2 },
            COPY_SCRATCHPAD => {
                for &i in &selected {
                    self.powered(i, Pending::Copy(i));
                }
                Phase::Ready
            }
            RECALL_E2 => {
                for &i in &selected {
                    self.sensors[i].recall_eeprom();
                }
                Phase::Ready
            }
            READ_POWER_SUPPLY => Phase::PowerSupply,
            _ => Phase::Idle,
        };
    }

    fn write_byte(&mut self, byte: u8) {
        match core::mem::take(&mut self.phase) {
            Phase::RomCommand => self.rom_command(byte),
            Phase::MatchRom {
                mut received,
                count,
            } => {
                received[count] = byte;
                if count + 1 == received.len() {
                    for (selected, sensor) in self.selected.iter_mut().zip(self.sensors.iter()) {
                        *selected = sensor.rom == received;
                    }
                    self.phase = Phase::Function;
                } else {
                    self.phase = Phase::MatchRom {
                        received,
                        count: count + 1,
                    };
                }
            }
            Phase::Function => self.function_command(byte),
            Phase::WriteScratchpad { offset } => {
                let selected: Vec<usize> = self.selected().collect();
                for i in selected {
                    self.sensors[i].write_scratchpad(offset, byte);
                }
                if offset < 4 {
                    self.phase = Phase::WriteScratchpad { offset: offset + 1 };
                }
            }
            _ => {}
        }
    }

    fn read_byte(&mut self) -> u8 {
        if let Phase::Reading(data) = &mut self.phase {
            return data.pop_front().unwrap_or(0xff);
        }
        match self.phase {
            Phase::PowerSupply => {
                if self.selected().any(|i| self.sensors[i].parasite) {
                    0x00
                } else {
                    0xff
                }
            }
            _ => 0xff,
        }
    }

    fn read_bit(&mut self) -> bool {
        match self.phase {
            Phase::Search { bit, step } if step < 2 => {
                self.phase = Phase::Search {
                    bit,
                    step: step + 1,
                };
                let complement = step == 1;
                self.selected().all(|i| self.rom_bit(i, bit) != complement)
            }
            Phase::PowerSupply => !self.selected().any(|i| self.sensors[i].parasite),
            _ => true,
        }
    }

    fn write_bit(&mut self, value: bool) {
        if let Phase::Search { bit, step: 2 } = self.phase {
            for i in self.selected().collect::<Vec<_>>() {
                if self.rom_bit(i, bit) != value {
                    self.selected[i] = false;
                }
            }
            self.phase = if bit + 1 < 64 {
                Phase::Search {
                    bit: bit + 1,
                    step: 0,
                }
            } else {
                Phase::Idle
            };
        }
    }
}

/// An emulated 1-Wire bus with [`VirtualSensor`]s attached.
///
/// Clones share the same bus, so a test can keep a handle to inspect the
/// sensors and the [transcript](EmulatedBus::transcript) while the driver owns
/// another. [`EmulatedPullup`] and [`EmulatedDelay`] handles obtained from the
/// bus record into the same transcript.
#[derive(Debug, Clone, Default)]
pub struct EmulatedBus {
    state: Rc<RefCell<BusState>>,
}

impl EmulatedBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a sensor and returns its packed ROM code.
    pub fn add_sensor(&mut self, sensor: VirtualSensor) -> u64 {
        let mut state = self.state.borrow_mut();
        let rom = sensor.address();
        state.sensors.push(sensor);
        state.selected.push(false);
        rom
    }

    /// Builder-style [`add_sensor`](EmulatedBus::add_sensor).
    pub fn with_sensor(mut self, sensor: VirtualSensor) -> Self {
        self.add_sensor(sensor);
        self
    }

    /// Snapshot of the sensor with the given packed ROM code.
    pub fn sensor(&self, rom: u64) -> Option<VirtualSensor> {
        self.state
            .borrow()
            .sensors
            .iter()
            .find(|s| s.address() == rom)
            .cloned()
    }

    /// Modifies the sensor with the given packed ROM code.
    pub fn update_sensor<R>(
        &mut self,
        rom: u64,
        f: impl FnOnce(&mut VirtualSensor) -> R,
    ) -> Option<R> {
        self.state
            .borrow_mut()
            .sensors
            .iter_mut()
            .find(|s| s.address() == rom)
            .map(f)
    }

    /// Removes power from all sensors and restores it: scratchpads reload from EEPROM.
    pub fn power_cycle(&mut self) {
        let mut state = self.state.borrow_mut();
        state.pending.clear();
        state.phase = Phase::Idle;
        for sensor in state.sensors.iter_mut() {
            sensor.power_on();
        }
    }

    /// Events recorded so far.
    pub fn transcript(&self) -> Vec<BusEvent> {
        self.state.borrow().transcript.clone()
    }

    /// Forgets the recorded events.
    pub fn clear_transcript(&mut self) {
        self.state.borrow_mut().transcript.clear();
    }

    /// Whether the strong pullup is currently engaged.
    pub fn pullup_engaged(&self) -> bool {
        self.state.borrow().pullup
    }

    /// Output pin driving the strong pullup of this bus (active high).
    pub fn strong_pullup(&self) -> EmulatedPullup {
        EmulatedPullup {
            state: self.state.clone(),
        }
    }

    /// Delay that records into the transcript instead of sleeping.
    pub fn delay(&self) -> EmulatedDelay {
        EmulatedDelay {
            state: self.state.clone(),
        }
    }

    fn record(&self, event: BusEvent) {
        self.state.borrow_mut().transcript.push(event);
    }
}

impl OneWire for EmulatedBus {
    type Status = EmulatedStatus;

    type BusError = Infallible;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        self.record(BusEvent::Reset);
        let mut state = self.state.borrow_mut();
        if state.pullup {
            log::warn!("bus reset while the strong pullup is engaged");
        }
        state.abandon_pending();
        state.selected.fill(false);
        state.phase = Phase::RomCommand;
        Ok(EmulatedStatus {
            presence: !state.sensors.is_empty(),
        })
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.record(BusEvent::Write(byte));
        self.state.borrow_mut().write_byte(byte);
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        let byte = self.state.borrow_mut().read_byte();
        self.record(BusEvent::Read(byte));
        Ok(byte)
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.record(BusEvent::WriteBit(bit));
        self.state.borrow_mut().write_bit(bit);
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        let bit = self.state.borrow_mut().read_bit();
        self.record(BusEvent::ReadBit(bit));
        Ok(bit)
    }
}

/// Strong pullup pin of an [`EmulatedBus`].
///
/// Engaging it powers any parasite conversion or EEPROM copy that is waiting
/// for it; operations still waiting at the next reset fail.
#[derive(Debug, Clone)]
pub struct EmulatedPullup {
    state: Rc<RefCell<BusState>>,
}

impl ErrorType for EmulatedPullup {
    type Error = Infallible;
}

impl OutputPin for EmulatedPullup {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        state.pullup = false;
        state.transcript.push(BusEvent::Pullup(false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        state.pullup = true;
        state.transcript.push(BusEvent::Pullup(true));
        for op in core::mem::take(&mut state.pending) {
            state.run(op);
        }
        Ok(())
    }
}

/// Delay provider that records [`BusEvent::Sleep`] instead of waiting.
#[derive(Debug, Clone)]
pub struct EmulatedDelay {
    state: Rc<RefCell<BusState>>,
}

impl EmulatedDelay {
    fn record(&mut self, duration: Duration) {
        self.state
            .borrow_mut()
            .transcript
            .push(BusEvent::Sleep(duration));
    }
}

impl DelayNs for EmulatedDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.record(Duration::from_nanos(ns as u64));
    }

    fn delay_us(&mut self, us: u32) {
        self.record(Duration::from_micros(us as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.record(Duration::from_millis(ms as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_onewire::{OneWireCrc, OneWireSearch, OneWireSearchKind};

    #[test]
    fn empty_bus_has_no_presence() {
        let mut bus = EmulatedBus::new();
        assert!(!bus.reset().unwrap().presence());
    }

    #[test]
    fn match_rom_selects_one_sensor() {
        let mut bus = EmulatedBus::new()
            .with_sensor(VirtualSensor::new(1).with_alarms(11, 1))
            .with_sensor(VirtualSensor::new(2).with_alarms(22, 2));
        let rom = VirtualSensor::new(2).address();
        bus.address(Some(rom)).unwrap();
        bus.write_byte(READ_SCRATCHPAD).unwrap();
        let mut pad = [0; 9];
        for b in pad.iter_mut() {
            *b = bus.read_byte().unwrap();
        }
        assert!(OneWireCrc::validate(&pad));
        assert_eq!(pad[2], 22);
        assert_eq!(pad[3], 2);
    }

    #[test]
    fn search_enumerates_all_sensors() {
        let mut bus = EmulatedBus::new()
            .with_sensor(VirtualSensor::new(0x10))
            .with_sensor(VirtualSensor::new(0x20))
            .with_sensor(VirtualSensor::new(0x30));
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        let mut found = Vec::new();
        while let Some(rom) = search.next().unwrap() {
            found.push(rom);
        }
        found.sort();
        let mut expected: Vec<u64> = [0x10, 0x20, 0x30]
            .into_iter()
            .map(|s| VirtualSensor::new(s).address())
            .collect();
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn parasite_conversion_waits_for_pullup() {
        let mut bus = EmulatedBus::new().with_sensor(
            VirtualSensor::new(1)
                .with_parasite_power(true)
                .with_temperature(21.5),
        );
        let rom = VirtualSensor::new(1).address();
        let mut pullup = bus.strong_pullup();

        bus.address(Some(rom)).unwrap();
        bus.write_byte(CONVERT_T).unwrap();
        pullup.set_high().unwrap();
        pullup.set_low().unwrap();
        assert_eq!(&bus.sensor(rom).unwrap().scratchpad()[..2], &[0x58, 0x01]);

        bus.update_sensor(rom, |s| s.set_temperature(30.0));
        bus.address(Some(rom)).unwrap();
        bus.write_byte(CONVERT_T).unwrap();
        bus.reset().unwrap();
        assert_eq!(&bus.sensor(rom).unwrap().scratchpad()[..2], &[0x50, 0x05]);
    }

    #[test]
    fn power_supply_read_reports_parasite() {
        let mut bus = EmulatedBus::new()
            .with_sensor(VirtualSensor::new(1))
            .with_sensor(VirtualSensor::new(2).with_parasite_power(true));
        bus.address(Some(VirtualSensor::new(1).address())).unwrap();
        bus.write_byte(READ_POWER_SUPPLY).unwrap();
        assert!(bus.read_bit().unwrap());
        bus.address(None).unwrap();
        bus.write_byte(READ_POWER_SUPPLY).unwrap();
        assert!(!bus.read_bit().unwrap());
    }

    #[test]
    fn read_rom_returns_single_sensor() {
        let sensor = VirtualSensor::new(0x42);
        let mut bus = EmulatedBus::new().with_sensor(sensor.clone());
        assert!(bus.reset().unwrap().presence());
        bus.write_byte(ONEWIRE_READ_ROM_CMD).unwrap();
        let mut rom = [0; 8];
        for b in rom.iter_mut() {
            *b = bus.read_byte().unwrap();
        }
        assert_eq!(rom, sensor.rom());
        assert!(OneWireCrc::validate(&rom));
    }

    #[test]
    fn read_rom_collides_on_shared_bus() {
        let a = VirtualSensor::new(1);
        let b = VirtualSensor::new(2);
        let mut bus = EmulatedBus::new()
            .with_sensor(a.clone())
            .with_sensor(b.clone());
        bus.reset().unwrap();
        bus.write_byte(ONEWIRE_READ_ROM_CMD).unwrap();
        let mut rom = [0; 8];
        for b in rom.iter_mut() {
            *b = bus.read_byte().unwrap();
        }
        let expected: [u8; 8] = core::array::from_fn(|i| a.rom()[i] & b.rom()[i]);
        assert_eq!(rom, expected);
        assert!(!OneWireCrc::validate(&rom));
    }

    #[test]
    fn transcript_can_be_cleared() {
        let mut bus = EmulatedBus::new().with_sensor(VirtualSensor::new(1));
        bus.reset().unwrap();
        bus.write_byte(ONEWIRE_SKIP_ROM_CMD).unwrap();
        assert_eq!(
            bus.transcript(),
            [BusEvent::Reset, BusEvent::Write(ONEWIRE_SKIP_ROM_CMD)]
        );
        bus.clear_transcript();
        assert!(bus.transcript().is_empty());
        bus.reset().unwrap();
        assert_eq!(bus.transcript(), [BusEvent::Reset]);
    }

    #[test]
    fn delay_is_recorded() {
        let bus = EmulatedBus::new();
        let mut delay = bus.delay();
        delay.delay_ms(750);
        assert_eq!(
            bus.transcript(),
            [BusEvent::Sleep(Duration::from_millis(750))]
        );
    }
}
