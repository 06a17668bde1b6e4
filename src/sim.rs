//! Simulated AM2321 on an open-drain two-wire bus.
//!
//! Both simulated pins share one [`Bus`]. Every level change is checked for a
//! start condition, a stop condition or a clock edge and handed to the
//! [`Peer`], which answers the way the real sensor does: it sleeps until an
//! address frame wakes it, acknowledges while awake and serves register
//! reads with a CRC-16/MODBUS trailer.

use std::{cell::RefCell, convert::Infallible, rc::Rc};

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::am2321::DEVICE_ADDRESS;
use crate::checksum::crc16;
use crate::line::DataPin;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    /// Shifting in the address or a data byte.
    Receiving,
    /// Holding our acknowledge (or its absence) for one clock pulse.
    AckSlot(After),
    /// Shifting out response bytes.
    Transmitting,
    /// Sampling the acknowledge of the driver after a response byte.
    DriverAck,
    /// Not addressed, or done. Waiting for the next start condition.
    Ignoring,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum After {
    Receive,
    Transmit,
    Ignore,
}

/// Behaviour and observations of the simulated sensor.
pub struct Peer {
    pub registers: [u8; 16],
    pub awake: bool,
    /// Acknowledge the address while awake.
    pub acknowledge_address: bool,
    /// Index of the data byte to reject.
    pub reject_data_byte: Option<usize>,
    /// Flip a bit of the CRC of every response.
    pub corrupt_crc: bool,
    /// Every byte clocked in, address bytes included.
    pub received: Vec<u8>,
    /// Data bytes that were acknowledged.
    pub accepted: Vec<u8>,
    /// Clock pulses while serving a read.
    pub read_clocks: usize,
    /// Completed write transactions (start, acknowledged bytes, stop).
    pub writes: usize,

    state: State,
    sda: bool,
    shift: u8,
    bits: u8,
    expect_address: bool,
    writing: bool,
    command: Vec<u8>,
    response: Vec<u8>,
    position: usize,
    driver_acked: bool,
}

impl Peer {
    /// A sleeping sensor reporting the given raw humidity and temperature.
    pub fn am2321(humidity: u16, temperature: u16) -> Self {
        let mut registers = [0; 16];
        registers[0..2].copy_from_slice(&humidity.to_be_bytes());
        registers[2..4].copy_from_slice(&temperature.to_be_bytes());
        // Model number
        registers[0x08..0x0A].copy_from_slice(&0x2321u16.to_be_bytes());

        Peer {
            registers,
            awake: false,
            acknowledge_address: true,
            reject_data_byte: None,
            corrupt_crc: false,
            received: Vec::new(),
            accepted: Vec::new(),
            read_clocks: 0,
            writes: 0,
            state: State::Idle,
            sda: true,
            shift: 0,
            bits: 0,
            expect_address: false,
            writing: false,
            command: Vec::new(),
            response: Vec::new(),
            position: 0,
            driver_acked: false,
        }
    }

    fn on_start(&mut self) {
        self.state = State::Receiving;
        self.sda = true;
        self.shift = 0;
        self.bits = 0;
        self.expect_address = true;
    }

    fn on_stop(&mut self) {
        if self.writing && !self.command.is_empty() {
            self.writes += 1;
            self.prepare_response();
        } else if self.state == State::Ignoring && !self.response.is_empty() && !self.writing {
            // A served read sends the sensor back to sleep
            self.awake = false;
            self.response.clear();
        }
        self.writing = false;
        self.state = State::Idle;
        self.sda = true;
    }

    fn on_rise(&mut self, sda: bool) {
        match self.state {
            State::Receiving => {
                self.shift = (self.shift << 1) | sda as u8;
                self.bits += 1;
            }
            State::Transmitting => {
                self.bits += 1;
                self.read_clocks += 1;
            }
            State::DriverAck => {
                self.driver_acked = !sda;
                self.read_clocks += 1;
            }
            _ => {}
        }
    }

    fn on_fall(&mut self) {
        match self.state {
            State::Receiving if self.bits == 8 => {
                let byte = self.shift;
                self.shift = 0;
                self.bits = 0;
                self.received.push(byte);
                let (ack, then) = self.accept(byte);
                self.sda = !ack;
                self.state = State::AckSlot(then);
            }
            State::AckSlot(then) => {
                self.sda = true;
                self.state = match then {
                    After::Receive => State::Receiving,
                    After::Transmit => {
                        self.position = 0;
                        self.begin_byte();
                        State::Transmitting
                    }
                    After::Ignore => State::Ignoring,
                };
            }
            State::Transmitting if self.bits == 8 => {
                self.sda = true;
                self.state = State::DriverAck;
            }
            State::Transmitting => {
                self.sda = self.current_byte() & (0x80 >> self.bits) != 0;
            }
            State::DriverAck => {
                if self.driver_acked {
                    self.position += 1;
                    self.begin_byte();
                    self.state = State::Transmitting;
                } else {
                    self.sda = true;
                    self.state = State::Ignoring;
                }
            }
            _ => {}
        }
    }

    /// Decides whether to acknowledge a byte just clocked in.
    fn accept(&mut self, byte: u8) -> (bool, After) {
        if self.expect_address {
            self.expect_address = false;
            if byte & 0xFE != DEVICE_ADDRESS {
                return (false, After::Ignore);
            }
            if !self.awake {
                // The address frame wakes the sensor but is not acknowledged
                self.awake = true;
                return (false, After::Ignore);
            }
            if !self.acknowledge_address {
                return (false, After::Ignore);
            }
            if byte & 0x01 == 0 {
                self.writing = true;
                self.command.clear();
                (true, After::Receive)
            } else {
                (true, After::Transmit)
            }
        } else {
            if self.reject_data_byte == Some(self.command.len()) {
                return (false, After::Ignore);
            }
            self.command.push(byte);
            self.accepted.push(byte);
            (true, After::Receive)
        }
    }

    fn prepare_response(&mut self) {
        self.response.clear();
        let [function, start, count] = self.command[..] else {
            return;
        };
        if function != 0x03 {
            return;
        }

        self.response.push(function);
        self.response.push(count);
        for register in start..start.saturating_add(count) {
            let value = self.registers.get(register as usize).copied().unwrap_or(0);
            self.response.push(value);
        }
        let mut crc = crc16(&self.response);
        if self.corrupt_crc {
            crc ^= 0x0001;
        }
        self.response.extend_from_slice(&crc.to_le_bytes());
    }

    fn current_byte(&self) -> u8 {
        self.response.get(self.position).copied().unwrap_or(0xFF)
    }

    /// Puts the first bit of the current response byte on the line.
    fn begin_byte(&mut self) {
        self.bits = 0;
        self.sda = self.current_byte() & 0x80 != 0;
    }
}

/// Line levels of the shared bus plus the sensor attached to it.
pub struct Bus {
    pub peer: Peer,
    scl: bool,
    driver_output: bool,
    driver_level: bool,
}

impl Bus {
    /// Level on the data line: low if anyone pulls it low.
    fn sda(&self) -> bool {
        (!self.driver_output || self.driver_level) && self.peer.sda
    }

    fn drive(&mut self, change: impl FnOnce(&mut Self)) {
        let (scl, sda) = (self.scl, self.sda());
        change(self);
        let (new_scl, new_sda) = (self.scl, self.sda());

        if scl && new_scl && sda != new_sda {
            if new_sda {
                self.peer.on_stop();
            } else {
                self.peer.on_start();
            }
        } else if !scl && new_scl {
            self.peer.on_rise(new_sda);
        } else if scl && !new_scl {
            self.peer.on_fall();
        }
    }
}

pub struct SimSda(Rc<RefCell<Bus>>);

pub struct SimScl(Rc<RefCell<Bus>>);

/// Attaches `peer` to a fresh bus with both lines pulled high.
pub fn bus(peer: Peer) -> (SimSda, SimScl, Rc<RefCell<Bus>>) {
    let bus = Rc::new(RefCell::new(Bus {
        peer,
        scl: true,
        driver_output: false,
        driver_level: true,
    }));
    (SimSda(bus.clone()), SimScl(bus.clone()), bus)
}

impl ErrorType for SimSda {
    type Error = Infallible;
}

impl OutputPin for SimSda {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().drive(|bus| bus.driver_level = false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().drive(|bus| bus.driver_level = true);
        Ok(())
    }
}

impl InputPin for SimSda {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let bus = self.0.borrow();
        assert!(!bus.driver_output, "sampled SDA while driving it");
        Ok(bus.sda())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

impl DataPin for SimSda {
    fn set_as_input(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().drive(|bus| bus.driver_output = false);
        Ok(())
    }

    fn set_as_output(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().drive(|bus| bus.driver_output = true);
        Ok(())
    }
}

impl ErrorType for SimScl {
    type Error = Infallible;
}

impl OutputPin for SimScl {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().drive(|bus| bus.scl = false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().drive(|bus| bus.scl = true);
        Ok(())
    }
}
