/// One wire communication error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying hardware.
    Other(E),
    /// Indicates that no device is present on the bus.
    NoDevicePresent,
    /// Indicates that a short circuit was detected on the bus.
    ShortCircuit,
    /// Computed CRC of the ROM is invalid.
    ///
    /// Returned by [`OneWireSearch::next`](crate::OneWireSearch::next) when the
    /// discovered ROM fails its CRC. The search state has already advanced past
    /// the offending ROM, so the search may be continued.
    InvalidRomCrc,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Other(other)
    }
}
