use crate::{
    OneWireError, OneWireResult,
    consts::{ONEWIRE_MATCH_ROM_CMD, ONEWIRE_SKIP_ROM_CMD},
};

/// Status of the bus after a reset/presence-detect cycle.
pub trait OneWireStatus {
    /// Returns `true` if at least one device answered the reset with a presence pulse.
    fn presence(&self) -> bool;

    /// Returns `true` if the bus master detected a short on the line.
    fn shortcircuit(&self) -> bool;
}

/// Trait for 1-Wire communication.
/// This trait defines the basic operations required for 1-Wire communication, such as resetting the bus,
/// writing and reading bytes, and writing and reading bits.
///
/// Electrical timing (reset pulse, bit slots, open-drain driving) is the
/// responsibility of the implementor.
pub trait OneWire {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// # Returns
    /// A result containing the status of the bus after the reset operation.
    ///
    /// # Errors
    /// This method returns an error if the reset operation fails.
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte to the 1-Wire bus.
    /// # Arguments
    /// * `byte` - The byte to write to the bus.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte from the 1-Wire bus.
    /// # Returns
    /// Byte read from the bus.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Writes a single bit to the 1-Wire bus.
    /// # Arguments
    ///
    /// * `bit` - The bit to write.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Reads a single bit from the 1-Wire bus.
    /// # Returns
    /// The bit read from the bus.
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Addresses devices on the 1-Wire bus.
    /// The first [`OneWire::read_byte`], [`OneWire::read_bit`], [`OneWire::write_byte`], [`OneWire::write_bit`] operation should be preceded by this method to address devices on the bus.
    /// Note: A [`OneWire::read_byte`] or [`OneWire::read_bit`] call will return garbage data if this method is called without specifying a ROM address on a bus with multiple devices.
    /// # Arguments
    /// * `rom` - The ROM address of the device to address. Pass [`None`] to skip ROM addressing and address all devices on the bus.
    ///
    /// # Returns
    /// A result indicating the success or failure of the operation.
    /// If the device is successfully addressed, the method returns `Ok(())`.
    ///
    /// # Errors
    /// [`OneWireError::NoDevicePresent`] if the reset is not answered by a presence pulse,
    /// [`OneWireError::ShortCircuit`] if the master reports a shorted line.
    fn address(&mut self, rom: Option<u64>) -> OneWireResult<(), Self::BusError> {
        let status = self.reset()?; // Reset the bus before addressing
        if status.shortcircuit() {
            return Err(OneWireError::ShortCircuit);
        }
        if !status.presence() {
            return Err(OneWireError::NoDevicePresent);
        }
        match rom {
            Some(rom) => {
                self.write_byte(ONEWIRE_MATCH_ROM_CMD)?; // Send the match ROM command
                for &b in rom.to_le_bytes().iter() {
                    self.write_byte(b)?; // Write each byte of the ROM address
                }
            }
            None => self.write_byte(ONEWIRE_SKIP_ROM_CMD)?,
        }
        Ok(())
    }
}
