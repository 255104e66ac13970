//! Sender-side peripherals
//!
//! The sender loop reaches the hardware through three traits: an ultrasonic
//! range sensor, an RFID tag reader and a small text display.

mod sim;

pub use sim::{ConsoleDisplay, SimulatedRangeSensor, SimulatedTagReader};

use anyhow::Result;
use std::fmt::Write;
use tracing::warn;

/// Display width in pixels
pub const DISPLAY_WIDTH: u32 = 128;

/// Display height in pixels
pub const DISPLAY_HEIGHT: u32 = 32;

/// Ultrasonic range sensor
pub trait RangeSensor {
    /// Distance to the nearest object in centimeters
    fn read_distance_cm(&mut self) -> Result<f64>;
}

/// RFID reader polled once per cycle
pub trait TagReader {
    /// UID of a tag in the field, if any
    fn poll_tag(&mut self) -> Result<Option<[u8; 4]>>;
}

/// Monochrome text display
pub trait StatusDisplay {
    fn clear(&mut self);

    /// Draw text with its top-left corner at pixel (x, y)
    fn text(&mut self, text: &str, x: u32, y: u32);

    /// Push the frame buffer to the panel
    fn show(&mut self);
}

/// Display used when the panel failed to initialize
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl StatusDisplay for NullDisplay {
    fn clear(&mut self) {}

    fn text(&mut self, _text: &str, _x: u32, _y: u32) {}

    fn show(&mut self) {}
}

/// Open the console display, degrading to [`NullDisplay`] on failure
pub fn init_display(width: u32, height: u32) -> Box<dyn StatusDisplay> {
    match ConsoleDisplay::new(width, height) {
        Ok(display) => Box::new(display),
        Err(e) => {
            warn!("[SENDER] Display unavailable, continuing without it: {}", e);
            Box::new(NullDisplay)
        }
    }
}

impl<T: StatusDisplay + ?Sized> StatusDisplay for Box<T> {
    fn clear(&mut self) {
        (**self).clear()
    }

    fn text(&mut self, text: &str, x: u32, y: u32) {
        (**self).text(text, x, y)
    }

    fn show(&mut self) {
        (**self).show()
    }
}

/// Render a tag UID as uppercase hex, e.g. `786E5C3E`
pub fn uid_hex(uid: &[u8; 4]) -> String {
    let mut out = String::with_capacity(8);
    for byte in uid {
        let _ = write!(out, "{:02X}", byte);
    }
    out
}
