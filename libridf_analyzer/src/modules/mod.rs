//! Decoders for the digitizer module families found in RIDF segments.
//!
//! Every decoder is a small cursor over one segment payload. A call to
//! `decode` consumes words until it can emit one `(geo, ch, edge, value)`
//! datum or the payload ends. Decoders live exactly as long as one segment;
//! the parser builds a fresh one at every segment boundary.

mod c16;
mod fit;
mod madc;
mod v1290;
mod v7xx;

pub use c16::C16Decoder;
pub use fit::FitDecoder;
pub use madc::MadcDecoder;
pub use v1290::V1290Decoder;
pub use v7xx::V7xxDecoder;

use super::constants::{MODULE_C16, MODULE_FIT, MODULE_MADC, MODULE_V1290, MODULE_V7XX};

/// One decoded quantity from a segment payload.
///
/// `geo` is the geographical address set by the module's header words (-1
/// when no header has been seen). For modules without per-word edge bits,
/// `edge` carries the last value set, matching the hardware convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datum {
    pub geo: i32,
    pub ch: i32,
    pub edge: i32,
    pub value: i32,
}

/// The decoder family selected by a segment id's module field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    C16,
    V7xx,
    V1290,
    Madc,
    Fit,
    /// No decoder for this module id; payload words pass through untouched.
    Raw,
}

/// Tagged union over the per-family decoder states.
#[derive(Debug)]
pub enum ModuleDecoder {
    C16(C16Decoder),
    V7xx(V7xxDecoder),
    V1290(V1290Decoder),
    Madc(MadcDecoder),
    Fit(FitDecoder),
    Raw(RawDecoder),
}

impl ModuleDecoder {
    /// Select the decoder family for a module id (the low 8 bits of a
    /// segment id). Unknown ids fall back to raw passthrough.
    pub fn for_module(module: u32) -> Self {
        match module {
            MODULE_C16 => Self::C16(C16Decoder::new()),
            MODULE_V7XX => Self::V7xx(V7xxDecoder::new()),
            MODULE_V1290 => Self::V1290(V1290Decoder::new()),
            MODULE_MADC => Self::Madc(MadcDecoder::new()),
            MODULE_FIT => Self::Fit(FitDecoder::new()),
            _ => Self::Raw(RawDecoder::new()),
        }
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            Self::C16(_) => ModuleKind::C16,
            Self::V7xx(_) => ModuleKind::V7xx,
            Self::V1290(_) => ModuleKind::V1290,
            Self::Madc(_) => ModuleKind::Madc,
            Self::Fit(_) => ModuleKind::Fit,
            Self::Raw(_) => ModuleKind::Raw,
        }
    }

    /// Advance through `payload` until the next datum, or None at payload end
    pub fn decode(&mut self, payload: &[u8]) -> Option<Datum> {
        match self {
            Self::C16(d) => d.decode(payload),
            Self::V7xx(d) => d.decode(payload),
            Self::V1290(d) => d.decode(payload),
            Self::Madc(d) => d.decode(payload),
            Self::Fit(d) => d.decode(payload),
            Self::Raw(d) => d.decode(payload),
        }
    }
}

/// Passthrough for unknown module ids: each 32-bit little-endian payload
/// word is surfaced verbatim in `value` with `geo = ch = edge = 0`.
#[derive(Debug, Default)]
pub struct RawDecoder {
    idx: usize,
}

impl RawDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, payload: &[u8]) -> Option<Datum> {
        let word = word_at(payload, self.idx)?;
        self.idx += 1;
        Some(Datum {
            geo: 0,
            ch: 0,
            edge: 0,
            value: word as i32,
        })
    }
}

/// Read the 32-bit little-endian word at word index `idx` of `payload`.
/// Returns None when the payload has no complete word there.
pub(crate) fn word_at(payload: &[u8], idx: usize) -> Option<u32> {
    let start = idx.checked_mul(4)?;
    let bytes = payload.get(start..start + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().unwrap()))
}

#[cfg(test)]
pub(crate) fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}
