//! MAX7219 7-segment driver, the adapter's debug visualization. Not part of
//! the functional contract: the core only sees it through `DebugDisplay`.

use log::trace;

use crate::core::traits::DebugDisplay;

/// The 3-wire shift interface (data in, clock, chip select).
pub trait ShiftPins {
    fn set_data(&mut self, level: bool);
    fn set_clock(&mut self, level: bool);
    fn set_chip_select(&mut self, level: bool);
}

mod registers {
    pub const INTENSITY: u8 = 0x0A;
    pub const SCAN_LIMIT: u8 = 0x0B;
    pub const SHUTDOWN: u8 = 0x0C;
    pub const DISPLAY_TEST: u8 = 0x0F;
}

/// Segment patterns for hex digits 0-F, common cathode.
const SEGMENT_TABLE: [u8; 16] = [
    0b0111_1110, // 0
    0b0011_0000, // 1
    0b0110_1101, // 2
    0b0111_1001, // 3
    0b0011_0011, // 4
    0b0101_1011, // 5
    0b0101_1111, // 6
    0b0111_0000, // 7
    0b0111_1111, // 8
    0b0111_1011, // 9
    0b0111_0111, // A
    0b0001_1111, // b
    0b0100_1110, // C
    0b0011_1101, // d
    0b0100_1111, // E
    0b0100_0111, // F
];

pub struct Max7219<S: ShiftPins> {
    pins: S,
}

impl<S: ShiftPins> Max7219<S> {
    pub fn new(pins: S) -> Self {
        let mut display = Max7219 { pins };
        display.pins.set_chip_select(true);
        display.pins.set_clock(true);
        display.init();
        display
    }

    fn init(&mut self) {
        self.push(registers::DISPLAY_TEST, 0x00); // test mode off
        self.push(registers::SHUTDOWN, 0x01); // normal operation
        self.push(registers::SCAN_LIMIT, 0x07); // digits 0 thru 7
        self.push(registers::INTENSITY, 0x0F); // max brightness
    }

    fn shift_out(&mut self, byte: u8) {
        for bit in (0..8).rev() {
            self.pins.set_data((byte >> bit) & 1 == 1);
            self.pins.set_clock(true);
            self.pins.set_clock(false);
        }
    }

    /// One register write: address byte then value byte, MSB first, latched
    /// on the chip-select rising edge.
    pub fn push(&mut self, register: u8, value: u8) {
        self.pins.set_chip_select(false);
        self.shift_out(register);
        self.shift_out(value);
        self.pins.set_chip_select(true);
    }

    /// Turns all eight digits off.
    pub fn blank(&mut self) {
        for digit in (1..=8).rev() {
            self.push(digit, 0x00);
        }
    }

    /// Address on the four left digits, two dark digits, data on the two
    /// right digits.
    pub fn show_cycle(&mut self, address: u16, data: u8) {
        self.push(0x08, SEGMENT_TABLE[(address >> 12) as usize & 0x0F]);
        self.push(0x07, SEGMENT_TABLE[(address >> 8) as usize & 0x0F]);
        self.push(0x06, SEGMENT_TABLE[(address >> 4) as usize & 0x0F]);
        self.push(0x05, SEGMENT_TABLE[address as usize & 0x0F]);

        self.push(0x04, 0x00);
        self.push(0x03, 0x00);

        self.push(0x02, SEGMENT_TABLE[(data >> 4) as usize & 0x0F]);
        self.push(0x01, SEGMENT_TABLE[data as usize & 0x0F]);
    }
}

impl<S: ShiftPins> DebugDisplay for Max7219<S> {
    fn show(&mut self, address: u16, data: u8) {
        trace!("display {address:#06x} / {data:#04x}");
        self.blank();
        self.show_cycle(address, data);
    }
}
