use embedded_onewire::OneWireCrc;

/// Family code reported by DS18B20 sensors.
pub const DS18B20_FAMILY: u8 = 0x28;

/// Temperature register value after power-up, +85 °C.
pub const POWER_ON_TEMPERATURE: i16 = 0x0550;

// Factory EEPROM contents: TH = 75 °C, TL = 70 °C, 12-bit resolution.
const FACTORY_EEPROM: [u8; 3] = [0x4b, 0x46, 0x7f];

/// A virtual DS18B20 attached to an [`EmulatedBus`](crate::EmulatedBus).
///
/// The sensor keeps a scratchpad and an EEPROM mirror and behaves like the
/// real part: configuration writes are normalized to `0bRR1_1111`, conversions
/// truncate the register to the configured resolution, and the alarm flag is
/// refreshed after each conversion.
#[derive(Debug, Clone)]
pub struct VirtualSensor {
    pub(crate) rom: [u8; 8],
    scratchpad: [u8; 9],
    eeprom: [u8; 3],
    temperature: i16,
    pub(crate) parasite: bool,
    alarm: bool,
    corrupt_reads: usize,
}

impl VirtualSensor {
    /// Creates a sensor with the given 48-bit serial number and a valid ROM CRC.
    ///
    /// The sensor measures 20 °C, is externally powered and holds the factory
    /// EEPROM contents.
    pub fn new(serial: u64) -> Self {
        let mut rom = [0; 8];
        rom[0] = DS18B20_FAMILY;
        rom[1..7].copy_from_slice(&serial.to_le_bytes()[..6]);
        rom[7] = OneWireCrc::compute(&rom[..7]);
        let mut sensor = Self {
            rom,
            scratchpad: [0; 9],
            eeprom: FACTORY_EEPROM,
            temperature: 20 * 16,
            parasite: false,
            alarm: false,
            corrupt_reads: 0,
        };
        sensor.power_on();
        sensor
    }

    /// Replaces the ROM code verbatim, without fixing up its CRC.
    pub fn with_rom(mut self, rom: [u8; 8]) -> Self {
        self.rom = rom;
        self
    }

    /// Sets the temperature the sensor will measure, in °C.
    pub fn with_temperature(mut self, celsius: f32) -> Self {
        self.set_temperature(celsius);
        self
    }

    /// Sets the temperature the sensor will measure, in 1/16 °C.
    pub fn with_raw_temperature(mut self, raw: i16) -> Self {
        self.temperature = raw;
        self
    }

    /// Makes the sensor draw its power from the data line.
    pub fn with_parasite_power(mut self, parasite: bool) -> Self {
        self.parasite = parasite;
        self
    }

    /// Stores a resolution (9 to 12 bits) in both EEPROM and scratchpad.
    pub fn with_resolution(mut self, bits: u8) -> Self {
        let r = bits.clamp(9, 12) - 9;
        self.eeprom[2] = (r << 5) | 0x1f;
        self.scratchpad[4] = self.eeprom[2];
        self.update_crc();
        self
    }

    /// Stores alarm thresholds in both EEPROM and scratchpad.
    pub fn with_alarms(mut self, high: i8, low: i8) -> Self {
        self.eeprom[0] = high as u8;
        self.eeprom[1] = low as u8;
        self.scratchpad[2] = high as u8;
        self.scratchpad[3] = low as u8;
        self.update_crc();
        self
    }

    /// Flips one bit of the next `count` scratchpad reads, as line noise would.
    pub fn with_corrupt_reads(mut self, count: usize) -> Self {
        self.corrupt_reads = count;
        self
    }

    /// ROM code of the sensor.
    pub fn rom(&self) -> [u8; 8] {
        self.rom
    }

    /// ROM code packed as used by [`OneWire::address`](embedded_onewire::OneWire::address).
    pub fn address(&self) -> u64 {
        u64::from_le_bytes(self.rom)
    }

    /// Current scratchpad contents, including the CRC byte.
    pub fn scratchpad(&self) -> [u8; 9] {
        self.scratchpad
    }

    /// Current EEPROM contents (TH, TL, configuration).
    pub fn eeprom(&self) -> [u8; 3] {
        self.eeprom
    }

    /// Whether the last conversion raised the alarm flag.
    pub fn is_alarmed(&self) -> bool {
        self.alarm
    }

    /// Whether the sensor is parasite powered.
    pub fn is_parasite(&self) -> bool {
        self.parasite
    }

    /// Changes the temperature the next conversion will latch, in °C.
    pub fn set_temperature(&mut self, celsius: f32) {
        self.temperature = (celsius * 16.0).round() as i16;
    }

    /// Flips one bit of the next `count` scratchpad reads.
    pub fn corrupt_reads(&mut self, count: usize) {
        self.corrupt_reads = count;
    }

    /// Power-up state: EEPROM recalled, temperature register at +85 °C.
    pub(crate) fn power_on(&mut self) {
        let [lsb, msb] = POWER_ON_TEMPERATURE.to_le_bytes();
        self.scratchpad = [lsb, msb, 0, 0, 0, 0xff, 0x0c, 0x10, 0];
        self.scratchpad[2..5].copy_from_slice(&self.eeprom);
        self.alarm = false;
        self.update_crc();
    }

    pub(crate) fn convert(&mut self) {
        let r = (self.scratchpad[4] >> 5) & 0x3;
        let undefined_bits = (1i16 << (3 - r)) - 1;
        self.latch(self.temperature & !undefined_bits);
        let integer = (self.temperature >> 4) as i8;
        self.alarm =
            integer >= self.scratchpad[2] as i8 || integer <= self.scratchpad[3] as i8;
    }

    /// A parasite conversion that ran without enough power leaves the power-on value.
    pub(crate) fn fail_conversion(&mut self) {
        self.latch(POWER_ON_TEMPERATURE);
    }

    pub(crate) fn write_scratchpad(&mut self, offset: usize, byte: u8) {
        self.scratchpad[offset] = match offset {
            4 => (byte & 0x60) | 0x1f,
            _ => byte,
        };
        self.update_crc();
    }

    pub(crate) fn copy_scratchpad(&mut self) {
        self.eeprom.copy_from_slice(&self.scratchpad[2..5]);
    }

    pub(crate) fn recall_eeprom(&mut self) {
        self.scratchpad[2..5].copy_from_slice(&self.eeprom);
        self.update_crc();
    }

    pub(crate) fn read_scratchpad(&mut self) -> [u8; 9] {
        let mut data = self.scratchpad;
        if self.corrupt_reads > 0 {
            self.corrupt_reads -= 1;
            data[0] ^= 0x01;
        }
        data
    }

    fn latch(&mut self, raw: i16) {
        self.scratchpad[..2].copy_from_slice(&raw.to_le_bytes());
        self.update_crc();
    }

    fn update_crc(&mut self) {
        self.scratchpad[8] = OneWireCrc::compute(&self.scratchpad[..8]);
    }
}
