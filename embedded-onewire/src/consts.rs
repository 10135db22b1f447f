//! ROM command constants for 1-Wire communication.

/// Command to match a specific ROM address in 1-Wire communication.
/// The master follows it with the 64-bit ROM code, least significant byte first.
pub const ONEWIRE_MATCH_ROM_CMD: u8 = 0x55;

/// Command to skip ROM addressing. Every device on the bus responds to the
/// function command that follows, so reads are only meaningful on a single-drop bus.
pub const ONEWIRE_SKIP_ROM_CMD: u8 = 0xcc;

/// Command to read the ROM code of the only device on the bus.
pub const ONEWIRE_READ_ROM_CMD: u8 = 0x33;

/// Command to search for devices on the 1-Wire bus
pub const ONEWIRE_SEARCH_CMD: u8 = 0xf0;

/// Command to search for devices in alarm state on the 1-Wire bus
pub const ONEWIRE_CONDITIONAL_SEARCH_CMD: u8 = 0xec;
