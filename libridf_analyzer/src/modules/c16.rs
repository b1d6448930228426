use super::Datum;

/// Decoder for the C16 RFSoC sampler.
///
/// The payload is a flat run of 16-bit little-endian ADC samples with no
/// header or trailer framing. Every word is data; the channel index simply
/// counts up from zero as samples are consumed.
#[derive(Debug, Default)]
pub struct C16Decoder {
    idx: usize,
    ch: i32,
}

impl C16Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, payload: &[u8]) -> Option<Datum> {
        let start = self.idx * 2;
        let bytes = payload.get(start..start + 2)?;
        let word = u16::from_le_bytes(bytes.try_into().unwrap());

        self.idx += 1;
        let ch = self.ch;
        self.ch += 1;

        Some(Datum {
            geo: 0,
            ch,
            edge: 0,
            value: word as i32,
        })
    }
}
