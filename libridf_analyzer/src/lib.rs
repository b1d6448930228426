//! # libridf_analyzer
//!
//! libridf_analyzer decodes RIDF (RIKEN Data Format) data streams and runs a
//! pulse-analysis pipeline on the RFSoC waveform segments found in them. It
//! handles both offline files written by the DAQ and live data pulled block
//! by block from the event-builder information service.
//!
//! The library is the core behind the RFSoC commissioning tools: it exposes
//! pull-style iterators over the record hierarchy and pure analysis
//! functions. Histogramming, tree output, terminal progress and waveform
//! displays belong to the tools that call it.
//!
//! ## Stream model
//!
//! A RIDF stream is a concatenation of blocks. Each block starts with an
//! 8-byte header whose first little-endian word carries the block length in
//! 16-bit words (low 22 bits). Inside a block, records nest: every record
//! header packs a classification id (bits 22..27) and the record length,
//! again in 16-bit words. The ids that matter here:
//!
//! ```text
//! 3   event record                 event number at +8, segments from +12
//! 6   timestamped event record     event number at +8, timestamp at +12,
//!                                  segments from +20
//! 4   segment record               segment id at +8, payload from +12
//! 8   block-sequence marker        used to detect fresh blocks online
//! ```
//!
//! The parser walks this hierarchy as a chain of borrowing iterators:
//! [`parser::RidfParser::next_event`] yields an event, the event yields
//! segments, and each segment decodes its payload into `(geo, ch, edge,
//! value)` data through the module decoder selected by its segment id. A
//! segment id packs `device / focal-plane / detector / module` fields; the
//! module field picks the decoder:
//!
//! ```text
//! 0    C16 RFSoC sampler (16-bit raw waveforms)
//! 21   CAEN V7XX ADC/QDC
//! 25   CAEN V1290 multihit TDC
//! 32   Mesytec MADC-32
//! 47   FIT TDC
//! any other value: raw 32-bit passthrough
//! ```
//!
//! ## Online pulling
//!
//! [`ridf_pull::RidfPull`] opens one short TCP connection per request to the
//! event builder on port 17516, asks for the current raw block (command 10)
//! and hands it over only when the block-sequence number has advanced, so an
//! idle DAQ reads as "no new data" rather than duplicate blocks.
//!
//! ## Waveform analysis
//!
//! For RFSoC segments, [`assembler::assemble_event`] collects the sample
//! streams into per-`(detector, channel)` vectors (dropping the 4-bit pad
//! the firmware appends). [`analysis::analyze`] then extracts baseline and
//! RMS, amplitude and peak position, nine constant-fraction times at 10..90%
//! of the amplitude, an optional digital-CFD time, and the 10-90% risetime.
//! [`pipeline::AnalysisPipeline`] strings these together for whole events.
//!
//! ## Configuration
//!
//! Analysis parameters come from a JSON document with three layers: global
//! settings, a default detector, and per-detector entries with optional
//! per-channel overrides. Resolution is most-specific-wins, field by field:
//!
//! ```json
//! {
//!   "global": {
//!     "sample_rate_ns": 2.0,
//!     "polarity": "negative",
//!     "baseline_start": 0,
//!     "baseline_end": 50,
//!     "ma_window_size": 1,
//!     "dcfd_enabled": false,
//!     "dcfd_delay": 3,
//!     "dcfd_fraction": 0.3
//!   },
//!   "detectors": {
//!     "default": { "enabled": true },
//!     "1": {
//!       "polarity": "positive",
//!       "channels": {
//!         "2": { "baseline_end": 80 }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Unknown keys are ignored. A recognized key holding the wrong type logs a
//! warning and keeps its default; a structurally broken document is refused.
//! [`config::write_template`] produces a commented starting point with every
//! recognized field.

pub mod analysis;
pub mod assembler;
pub mod config;
pub mod constants;
pub mod error;
pub mod modules;
pub mod parser;
pub mod pipeline;
pub mod ridf_file;
pub mod ridf_pull;
pub mod segment_id;
