/// Possible errors from the AM2321 driver.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq)]
pub enum Am2321Error<E> {
    /// The sensor did not acknowledge its address byte.
    AddressNotAcknowledged,
    /// The sensor rejected one of the command bytes.
    DataNotAcknowledged,
    /// CRC of the response did not match its trailing CRC bytes.
    ChecksumMismatch,
    /// Error from the GPIO pin (input/output).
    PinError(E),
}

impl<E> From<E> for Am2321Error<E> {
    fn from(value: E) -> Self {
        Self::PinError(value)
    }
}

/// Outcome of the most recent write transaction.
///
/// Reset to [`WriteStatus::None`] at the start of every high-level read
/// operation and overwritten by the first acknowledge failure.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteStatus {
    #[default]
    None,
    AddressNotAcknowledged,
    DataNotAcknowledged,
}
