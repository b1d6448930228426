use std::path::Path;

use human_bytes::human_bytes;
use serde::Serialize;

use super::analysis::{analyze, AnalysisResult};
use super::assembler::assemble_event;
use super::config::AnalysisConfig;
use super::error::{ParserError, PipelineError};
use super::parser::RidfParser;

/// Analysis of one detector channel within one event.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelAnalysis {
    pub detector: i32,
    pub channel: i32,
    pub nsample: usize,
    pub result: AnalysisResult,
}

/// All channel analyses of one event.
#[derive(Debug, Clone, Serialize)]
pub struct EventAnalyses {
    pub event_number: u32,
    pub timestamp: u64,
    pub channels: Vec<ChannelAnalysis>,
}

/// Running totals over the lifetime of a pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub events: u64,
    pub segments: u64,
    pub samples: u64,
    pub skipped_channels: u64,
    pub analyzed_channels: u64,
}

/// Drives the parser event by event and runs the waveform analysis on every
/// assembled channel.
///
/// The pipeline is a thin loop over the core pieces: pull an event, collect
/// its RFSoC waveforms, resolve the per-channel parameters, analyze. What
/// happens with the results (trees, histograms, displays) is the caller's
/// business.
#[derive(Debug)]
pub struct AnalysisPipeline {
    parser: RidfParser,
    config: AnalysisConfig,
    stats: PipelineStats,
}

impl AnalysisPipeline {
    /// Open a RIDF file, loading the analysis configuration from
    /// `config_path` or falling back to the built-in defaults.
    pub fn from_file(ridf: &Path, config_path: Option<&Path>) -> Result<Self, PipelineError> {
        let config = match config_path {
            Some(path) => AnalysisConfig::read_config_file(path)?,
            None => AnalysisConfig::default_config(),
        };

        if let Ok(meta) = std::fs::metadata(ridf) {
            spdlog::info!(
                "Streaming {:?} ({})",
                ridf.file_name().unwrap_or(ridf.as_os_str()),
                human_bytes(meta.len() as f64)
            );
        }

        Ok(Self::with_parser(RidfParser::open(ridf)?, config))
    }

    /// Attach to a live event builder.
    pub fn online(host: &str, config: AnalysisConfig) -> Self {
        spdlog::info!("Online mode: pulling blocks from {}", host);
        Self::with_parser(RidfParser::connect(host), config)
    }

    pub fn with_parser(parser: RidfParser, config: AnalysisConfig) -> Self {
        Self {
            parser,
            config,
            stats: PipelineStats::default(),
        }
    }

    /// Analyze the next event in the stream.
    ///
    /// `Err(NoData)` is transient: for files it means a block boundary was
    /// crossed, online it means nothing fresh has arrived; call again (after
    /// a pause, online). `Err(EndOfStream)` ends the run.
    pub fn next_event(&mut self) -> Result<EventAnalyses, ParserError> {
        let mut event = self.parser.next_event()?;
        let event_number = event.number();
        let timestamp = event.timestamp();

        let (waveforms, assembly) = assemble_event(&mut event);
        self.stats.events += 1;
        self.stats.segments += assembly.segments as u64;
        self.stats.samples += assembly.samples as u64;
        self.stats.skipped_channels += assembly.skipped_channels as u64;

        let mut channels = Vec::new();
        for detector in waveforms.detector_ids() {
            let det_wfs = waveforms.get(detector).unwrap();
            for (channel, samples) in det_wfs.iter().enumerate() {
                if samples.is_empty() {
                    continue;
                }
                let result = match self.config.resolve(detector, channel as i32) {
                    Some(params) => analyze(samples, &params),
                    // Unresolvable parameters mark the channel invalid
                    None => AnalysisResult::invalid(),
                };
                self.stats.analyzed_channels += 1;
                channels.push(ChannelAnalysis {
                    detector,
                    channel: channel as i32,
                    nsample: samples.len(),
                    result,
                });
            }
        }

        Ok(EventAnalyses {
            event_number,
            timestamp,
            channels,
        })
    }

    /// Restart a file-backed pipeline from the top of the stream.
    pub fn rewind(&mut self) -> Result<(), ParserError> {
        self.parser.rewind()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Log the end-of-run totals.
    pub fn log_summary(&self) {
        spdlog::info!(
            "Analysis done: {} events, {} segments, {} total samples, {} segments skipped (ch outside 0-7)",
            self.stats.events,
            self.stats.segments,
            self.stats.samples,
            self.stats.skipped_channels
        );
    }
}
