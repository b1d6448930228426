use fxhash::FxHashMap;

use super::constants::{CHANNELS_PER_DETECTOR, MAX_WAVEFORM_SAMPLES};
use super::parser::Event;

/// The eight channel waveforms of one RFSoC board; empty vectors mean the
/// channel carried no samples this event.
pub type DetectorWaveforms = [Vec<i16>; CHANNELS_PER_DETECTOR];

/// Waveforms of one event keyed by detector id.
#[derive(Debug, Default)]
pub struct EventWaveforms {
    pub detectors: FxHashMap<i32, DetectorWaveforms>,
}

impl EventWaveforms {
    pub fn get(&self, detector: i32) -> Option<&DetectorWaveforms> {
        self.detectors.get(&detector)
    }

    /// Detector ids present in this event, in ascending order.
    pub fn detector_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.detectors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Bookkeeping counters from assembling one event.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblyStats {
    pub segments: usize,
    pub samples: usize,
    pub skipped_channels: usize,
}

/// Collect the RFSoC sample streams of one event into per-channel vectors.
///
/// The segment id's detector field keys the board and its focal-plane field
/// is the channel. Raw 16-bit samples drop their four LSBs (arithmetic
/// shift, so the sign survives). Channels outside 0..=7 are counted and
/// discarded; a channel already filled this event is overwritten by the
/// later segment.
pub fn assemble_event(event: &mut Event<'_>) -> (EventWaveforms, AssemblyStats) {
    let mut waveforms = EventWaveforms::default();
    let mut stats = AssemblyStats::default();

    while let Some(mut segment) = event.next_segment() {
        stats.segments += 1;
        let detector = segment.id().detector();
        let channel = segment.id().focal_plane();

        let mut samples: Vec<i16> = Vec::new();
        while let Some(datum) = segment.next_datum() {
            if samples.len() < MAX_WAVEFORM_SAMPLES {
                samples.push((datum.value as i16) >> 4);
            }
        }
        stats.samples += samples.len();

        if samples.is_empty() {
            continue;
        }
        if channel < 0 || channel >= CHANNELS_PER_DETECTOR as i32 {
            stats.skipped_channels += 1;
            continue;
        }

        waveforms.detectors.entry(detector).or_default()[channel as usize] = samples;
    }

    (waveforms, stats)
}
