use super::{word_at, Datum};

const TYPE_MASK: u32 = 0x0600_0000;
const TYPE_HEADER: u32 = 0x0200_0000;
const TYPE_DATA: u32 = 0x0000_0000;
const TYPE_TRAILER: u32 = 0x0400_0000;

/// Decoder for CAEN V7XX-series ADC/QDC modules.
///
/// Payloads are 32-bit words framed by a header (carrying the geo address)
/// and a trailer. Data words are only valid between the two; anything else
/// is skipped word by word.
#[derive(Debug)]
pub struct V7xxDecoder {
    idx: usize,
    geo: i32,
    edge: i32,
    in_event: bool,
}

impl V7xxDecoder {
    pub fn new() -> Self {
        Self {
            idx: 0,
            geo: -1,
            edge: 0,
            in_event: false,
        }
    }

    pub fn decode(&mut self, payload: &[u8]) -> Option<Datum> {
        loop {
            let word = word_at(payload, self.idx)?;
            self.idx += 1;

            match word & TYPE_MASK {
                TYPE_HEADER => {
                    self.geo = ((word >> 27) & 0x1f) as i32;
                    self.in_event = true;
                }
                TYPE_DATA if self.in_event => {
                    return Some(Datum {
                        geo: self.geo,
                        ch: ((word >> 16) & 0x1f) as i32,
                        edge: self.edge,
                        value: (word & 0x1fff) as i32,
                    });
                }
                TYPE_TRAILER => {
                    self.in_event = false;
                }
                _ => {}
            }
        }
    }
}

impl Default for V7xxDecoder {
    fn default() -> Self {
        Self::new()
    }
}
