use embedded_hal::{delay::DelayNs, digital::OutputPin};

use crate::checksum::verify_crc;
use crate::error::{Am2321Error, WriteStatus};
use crate::line::{DataLine, DataPin, Direction};

/// Bus address of the AM2321, already shifted into write position.
pub const DEVICE_ADDRESS: u8 = 0xB8;

/// Capacity of the transaction buffer.
pub const BUFFER_LEN: usize = 15;

/// Returned by [`Am2321::read_device_id`] when the sensor could not be read.
pub const DEVICE_ID_ERROR: u16 = 0xFFFF;

/// Returned by [`Am2321::read_temperature`] and [`Am2321::read_humidity`]
/// when the sensor could not be read.
pub const MEASUREMENT_ERROR: f32 = 999.9;

/// Returned by [`Am2321::read_all`] when the sensor could not be read.
pub const READ_ALL_ERROR: u32 = 0xFFFF_FFFF;

/// One protocol time unit (in microseconds). Every clock phase lasts this long.
const TIME_UNIT_US: u32 = 10;

/// How long the address frame is held during wake-up. The sensor needs at least 1.5 ms.
const WAKE_UP_HOLD_US: u32 = 2000;

/// Time the sensor needs between a command and its response.
const RESPONSE_WAIT_US: u32 = 2000;

/// Gap between the read address acknowledge and the first response bit (>= 30us).
const READ_SETUP_US: u32 = 3 * TIME_UNIT_US;

/// Function code for reading registers.
const READ_REGISTERS: u8 = 0x03;

/// Length of a measurement response: function code, byte count,
/// 2 humidity bytes, 2 temperature bytes, 2 CRC bytes.
const MEASUREMENT_LEN: usize = 8;

/// Reading returned by the AM2321 sensor.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub relative_humidity: f32,
}

/// Register reads the driver knows how to issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Request {
    /// Model number and version registers, starting at 0x08.
    DeviceId,
    /// Humidity and temperature registers, starting at 0x00.
    Measurement,
}

impl Request {
    fn command(self) -> [u8; 3] {
        match self {
            Request::DeviceId => [READ_REGISTERS, 0x08, 0x07],
            Request::Measurement => [READ_REGISTERS, 0x00, 0x04],
        }
    }

    fn response_len(self) -> usize {
        match self {
            Request::DeviceId => 7,
            Request::Measurement => MEASUREMENT_LEN,
        }
    }
}

/// Bit-banged driver for the AM2321 temperature and humidity sensor.
///
/// The sensor speaks an I2C-like two-wire protocol with its own timing and a
/// wake-up quirk, driven here by toggling two GPIO lines by hand.
pub struct Am2321<SDA, SCL, D> {
    sda: DataLine<SDA>,
    scl: SCL,
    delay: D,
    buffer: [u8; BUFFER_LEN],
    status: WriteStatus,
}

impl<SDA, SCL, DELAY, E> Am2321<SDA, SCL, DELAY>
where
    SDA: DataPin<Error = E>,
    SCL: OutputPin<Error = E>,
    DELAY: DelayNs,
{
    /// Creates a new instance of the AM2321 driver.
    ///
    /// No pin is touched until [`begin`](Self::begin) is called.
    ///
    /// # Arguments
    ///
    /// * `sda` - The data line. Must be switchable between input and output,
    ///   see [`OpenDrain`](crate::OpenDrain) for open-drain configured pins.
    /// * `scl` - The clock line.
    /// * `delay` - A delay provider implementing the `DelayNs` trait.
    pub fn new(sda: SDA, scl: SCL, delay: DELAY) -> Self {
        Am2321 {
            sda: DataLine::new(sda),
            scl,
            delay,
            buffer: [0; BUFFER_LEN],
            status: WriteStatus::None,
        }
    }

    /// Configures both lines as outputs in the idle-high state and clears
    /// the transaction buffer.
    pub fn begin(&mut self) -> Result<(), Am2321Error<E>> {
        self.sda.output()?;
        self.scl.set_high()?;
        self.sda.set_high()?;
        self.buffer = [0; BUFFER_LEN];
        self.status = WriteStatus::None;
        Ok(())
    }

    /// Outcome of the last write transaction.
    pub fn write_status(&self) -> WriteStatus {
        self.status
    }

    /// Current direction of the data line.
    pub fn data_direction(&self) -> Direction {
        self.sda.direction()
    }

    /// Response bytes of the last high-level read operation.
    ///
    /// Bytes past the response length are zero.
    pub fn buffer(&self) -> &[u8; BUFFER_LEN] {
        &self.buffer
    }

    /// Reads the device ID (model number) of the sensor, `0x2321` for an AM2321.
    ///
    /// The 7-byte response carries the model number big-endian at offset 2.
    pub fn device_id(&mut self) -> Result<u16, Am2321Error<E>> {
        self.request(Request::DeviceId)?;
        Ok(u16::from_be_bytes([self.buffer[2], self.buffer[3]]))
    }

    /// Reads a temperature and humidity measurement from the sensor.
    ///
    /// # Returns
    ///
    /// * `Ok(Reading)` if the read is successful and the CRC is valid.
    /// * `Err(Am2321Error)` if the sensor did not acknowledge, a pin failed or
    ///   the CRC does not match.
    pub fn read(&mut self) -> Result<Reading, Am2321Error<E>> {
        let frame = self.measurement()?;
        if !verify_crc(&frame) {
            return Err(Am2321Error::ChecksumMismatch);
        }
        Ok(parse_measurement(&frame))
    }

    /// Reads the device ID, returning [`DEVICE_ID_ERROR`] on failure.
    pub fn read_device_id(&mut self) -> u16 {
        self.device_id().unwrap_or(DEVICE_ID_ERROR)
    }

    /// Reads the temperature in degrees Celsius, returning
    /// [`MEASUREMENT_ERROR`] on failure.
    ///
    /// Bit 15 of the register is a sign bit, so raw 0x8065 reads as -10.1
    /// rather than the 3286.9 of a plain unsigned decode.
    ///
    /// The response CRC is not checked, use [`read`](Self::read) for that.
    pub fn read_temperature(&mut self) -> f32 {
        self.measurement()
            .map(|frame| parse_measurement(&frame).temperature)
            .unwrap_or(MEASUREMENT_ERROR)
    }

    /// Reads the relative humidity in percent, returning
    /// [`MEASUREMENT_ERROR`] on failure.
    ///
    /// The response CRC is not checked, use [`read`](Self::read) for that.
    pub fn read_humidity(&mut self) -> f32 {
        self.measurement()
            .map(|frame| parse_measurement(&frame).relative_humidity)
            .unwrap_or(MEASUREMENT_ERROR)
    }

    /// Reads humidity and temperature as raw register values packed into one
    /// word, humidity x10 in the high half and temperature x10 in the low
    /// half. Returns [`READ_ALL_ERROR`] on failure.
    pub fn read_all(&mut self) -> u32 {
        self.measurement()
            .map(|frame| u32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]]))
            .unwrap_or(READ_ALL_ERROR)
    }

    /// Wakes the sensor from its sleep state.
    ///
    /// The sleeping sensor does not acknowledge its address, but it needs the
    /// acknowledge clock and the address frame held for at least 1.5 ms.
    pub fn wake_up(&mut self) -> Result<(), Am2321Error<E>> {
        self.start()?;
        self.send_byte(DEVICE_ADDRESS)?;
        // No ack while waking up
        self.test_ack()?;
        self.delay.delay_us(WAKE_UP_HOLD_US);
        self.stop()
    }

    /// Writes `bytes` to the device at `address`.
    ///
    /// Every byte, including the address, must be acknowledged. On the first
    /// missing acknowledge the transaction is abandoned without a stop
    /// condition and [`write_status`](Self::write_status) records the failure.
    pub fn write_bytes(&mut self, address: u8, bytes: &[u8]) -> Result<(), Am2321Error<E>> {
        self.start()?;

        self.send_byte(address)?;
        if !self.test_ack()? {
            return Err(self.nack(Am2321Error::AddressNotAcknowledged));
        }

        for &byte in bytes {
            self.send_byte(byte)?;
            if !self.test_ack()? {
                return Err(self.nack(Am2321Error::DataNotAcknowledged));
            }
        }

        self.stop()
    }

    /// Reads `buffer.len()` bytes from the device at `address`.
    ///
    /// Every byte but the last is acknowledged, the last one is not. An empty
    /// buffer reads nothing.
    pub fn read_bytes(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Am2321Error<E>> {
        let Some((last, head)) = buffer.split_last_mut() else {
            return Ok(());
        };

        self.start()?;

        self.send_byte(address | 0x01)?;
        if !self.test_ack()? {
            return Err(self.nack(Am2321Error::AddressNotAcknowledged));
        }

        self.delay.delay_us(READ_SETUP_US);

        for byte in head.iter_mut() {
            *byte = self.receive_byte()?;
            self.ack()?;
        }
        *last = self.receive_byte()?;
        self.no_ack()?;

        self.stop()
    }

    /// Transmits one byte, most significant bit first.
    ///
    /// Must be followed by [`test_ack`](Self::test_ack).
    pub fn send_byte(&mut self, byte: u8) -> Result<(), Am2321Error<E>> {
        self.sda.output()?;
        self.sda.set_high()?;

        for bit_offset in 0..8 {
            self.scl.set_low()?;
            self.wait();
            self.sda.set_level((byte >> (7 - bit_offset)) & 0b1 == 1)?;
            self.scl.set_high()?;
            self.wait();
        }

        self.scl.set_low()?;
        Ok(())
    }

    /// Receives one byte, most significant bit first.
    ///
    /// Must be followed by [`ack`](Self::ack), or [`no_ack`](Self::no_ack)
    /// after the last byte.
    pub fn receive_byte(&mut self) -> Result<u8, Am2321Error<E>> {
        let mut byte: u8 = 0;

        self.sda.input()?;

        for _ in 0..8 {
            self.scl.set_low()?;
            self.wait();
            byte <<= 1;
            self.scl.set_high()?;
            self.wait();
            if self.sda.is_high()? {
                byte |= 0x01;
            }
        }

        self.scl.set_low()?;
        Ok(byte)
    }

    /// Start condition: data falls while the clock is high.
    pub fn start(&mut self) -> Result<(), Am2321Error<E>> {
        self.sda.output()?;
        self.sda.set_high()?;
        self.scl.set_high()?;
        self.wait();

        self.sda.set_low()?;
        self.wait();

        self.scl.set_low()?;
        Ok(())
    }

    /// Stop condition: data rises while the clock is high.
    pub fn stop(&mut self) -> Result<(), Am2321Error<E>> {
        self.sda.output()?;
        self.sda.set_low()?;
        self.wait();

        self.scl.set_high()?;
        self.wait();

        self.sda.set_high()?;
        Ok(())
    }

    /// Acknowledges a received byte.
    pub fn ack(&mut self) -> Result<(), Am2321Error<E>> {
        self.sda.output()?;
        self.sda.set_low()?;
        self.scl.set_low()?;
        self.wait();

        self.scl.set_high()?;
        self.wait();

        self.scl.set_low()?;
        self.sda.set_high()?;
        Ok(())
    }

    /// Declines further bytes after the last one received.
    pub fn no_ack(&mut self) -> Result<(), Am2321Error<E>> {
        self.sda.output()?;
        self.sda.set_high()?;
        self.scl.set_low()?;
        self.wait();

        self.scl.set_high()?;
        self.wait();

        self.sda.set_high()?;
        self.scl.set_low()?;
        Ok(())
    }

    /// Clocks the acknowledge bit of the sensor.
    ///
    /// Returns `true` if the sensor pulled the data line low.
    pub fn test_ack(&mut self) -> Result<bool, Am2321Error<E>> {
        self.scl.set_low()?;
        self.sda.input()?;
        self.wait();

        self.scl.set_high()?;
        self.wait();

        let ack = self.sda.is_low()?;

        self.scl.set_low()?;
        self.sda.output()?;
        self.sda.set_high()?;

        Ok(ack)
    }

    /// Runs one register read: wake-up, command write, response read.
    ///
    /// The response lands at the start of the cleared transaction buffer.
    fn request(&mut self, request: Request) -> Result<(), Am2321Error<E>> {
        self.buffer = [0; BUFFER_LEN];
        self.status = WriteStatus::None;

        self.wake_up()?;
        self.write_bytes(DEVICE_ADDRESS, &request.command())?;

        self.delay.delay_us(RESPONSE_WAIT_US);

        let mut buffer = [0; BUFFER_LEN];
        let read = self.read_bytes(DEVICE_ADDRESS, &mut buffer[..request.response_len()]);
        self.buffer = buffer;

        // Release the lines even if the read was not acknowledged
        let released = self.release_lines();
        read?;
        released
    }

    /// Reads a measurement frame without checking its CRC.
    fn measurement(&mut self) -> Result<[u8; MEASUREMENT_LEN], Am2321Error<E>> {
        self.request(Request::Measurement)?;

        let mut frame = [0; MEASUREMENT_LEN];
        frame.copy_from_slice(&self.buffer[..MEASUREMENT_LEN]);

        #[cfg(feature = "defmt")]
        if !verify_crc(&frame) {
            defmt::warn!("AM2321 measurement CRC mismatch: {:x}", frame);
        }

        Ok(frame)
    }

    fn release_lines(&mut self) -> Result<(), Am2321Error<E>> {
        self.sda.output()?;
        self.scl.set_high()?;
        self.sda.set_high()?;
        Ok(())
    }

    /// Records an acknowledge failure in the write status and passes the error on.
    fn nack(&mut self, error: Am2321Error<E>) -> Am2321Error<E> {
        self.status = match error {
            Am2321Error::AddressNotAcknowledged => WriteStatus::AddressNotAcknowledged,
            Am2321Error::DataNotAcknowledged => WriteStatus::DataNotAcknowledged,
            Am2321Error::ChecksumMismatch | Am2321Error::PinError(_) => return error,
        };

        #[cfg(feature = "defmt")]
        defmt::debug!("AM2321 acknowledge missing: {}", self.status);

        error
    }

    #[inline]
    fn wait(&mut self) {
        self.delay.delay_us(TIME_UNIT_US);
    }
}

/// Converts a measurement frame into a `Reading`.
///
/// Both values are big-endian tenths. The top bit of the temperature is a
/// sign bit, the rest its magnitude.
fn parse_measurement(frame: &[u8; MEASUREMENT_LEN]) -> Reading {
    let joined_humidity = u16::from_be_bytes([frame[2], frame[3]]);
    let relative_humidity = joined_humidity as f32 / 10.0;

    let is_temp_negative = (frame[4] >> 7) != 0;
    let temp_hi = frame[4] & 0b0111_1111;
    let joined_temp = u16::from_be_bytes([temp_hi, frame[5]]);
    let mut temperature = joined_temp as f32 / 10.0;
    if is_temp_negative {
        temperature = -temperature;
    }

    Reading {
        temperature,
        relative_humidity,
    }
}
