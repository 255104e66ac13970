//! Simulated sender hardware for host runs

use anyhow::{bail, Result};
use rand::Rng;
use tracing::{debug, info};

use super::{RangeSensor, StatusDisplay, TagReader};

/// Glyph cell size of the panel font
const GLYPH_PX: u32 = 8;

/// Range sensor wandering between near and far readings
pub struct SimulatedRangeSensor {
    /// Probability that a read times out with no echo
    timeout_probability: f64,
}

impl SimulatedRangeSensor {
    pub fn new(timeout_probability: f64) -> Self {
        Self {
            timeout_probability: timeout_probability.clamp(0.0, 1.0),
        }
    }
}

impl Default for SimulatedRangeSensor {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl RangeSensor for SimulatedRangeSensor {
    fn read_distance_cm(&mut self) -> Result<f64> {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.timeout_probability) {
            bail!("echo timeout");
        }
        let distance = rng.gen_range(2.0_f64..120.0);
        debug!("[SIM] distance={:.1} cm", distance);
        Ok(distance)
    }
}

/// Tag reader that occasionally sees one of a fixed set of cards
pub struct SimulatedTagReader {
    cards: Vec<[u8; 4]>,
    present_probability: f64,
}

impl SimulatedTagReader {
    pub fn new(cards: Vec<[u8; 4]>, present_probability: f64) -> Self {
        Self {
            cards,
            present_probability: present_probability.clamp(0.0, 1.0),
        }
    }

    /// One authorized card and one stranger
    pub fn default_cards() -> Vec<[u8; 4]> {
        vec![[0x78, 0x6e, 0x5c, 0x3e], [0xde, 0xad, 0xbe, 0xef]]
    }
}

impl TagReader for SimulatedTagReader {
    fn poll_tag(&mut self) -> Result<Option<[u8; 4]>> {
        let mut rng = rand::thread_rng();
        if self.cards.is_empty() || !rng.gen_bool(self.present_probability) {
            return Ok(None);
        }
        let card = self.cards[rng.gen_range(0..self.cards.len())];
        Ok(Some(card))
    }
}

/// Text frame buffer logged on every `show`
pub struct ConsoleDisplay {
    width: u32,
    height: u32,
    lines: Vec<(u32, u32, String)>,
    frames: u64,
}

impl ConsoleDisplay {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width < GLYPH_PX || height < GLYPH_PX {
            bail!("panel {}x{} too small for text", width, height);
        }
        info!("[SENDER] Display initialized ({}x{})", width, height);
        Ok(Self {
            width,
            height,
            lines: Vec::new(),
            frames: 0,
        })
    }

    /// Text currently in the frame buffer, in draw order
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|(_, _, text)| text.as_str())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl StatusDisplay for ConsoleDisplay {
    fn clear(&mut self) {
        self.lines.clear();
    }

    fn text(&mut self, text: &str, x: u32, y: u32) {
        if x >= self.width || y.saturating_add(GLYPH_PX) > self.height {
            return;
        }
        // Clip to the glyphs that fit on the row
        let columns = ((self.width - x) / GLYPH_PX) as usize;
        let clipped: String = text.chars().take(columns).collect();
        self.lines.push((x, y, clipped));
    }

    fn show(&mut self) {
        self.frames += 1;
        let frame: Vec<&str> = self.lines().collect();
        info!("[SENDER] Display: {}", frame.join(" | "));
    }
}
