//! End-to-end test: write a synthetic two-block RIDF file, stream it through
//! the parser and the analysis pipeline, and verify framing, decoding and
//! pulse analysis against the values the file was built from.

use std::io::Write;

use libridf_analyzer::config::AnalysisConfig;
use libridf_analyzer::error::ParserError;
use libridf_analyzer::modules::ModuleKind;
use libridf_analyzer::parser::RidfParser;
use libridf_analyzer::pipeline::AnalysisPipeline;
use libridf_analyzer::segment_id::SegmentId;
use tempfile::NamedTempFile;

const CID_EVENT: u32 = 3;
const CID_EVENT_TS: u32 = 6;
const CID_SEGMENT: u32 = 4;

fn record_header(cid: u32, len_bytes: usize) -> [u8; 4] {
    ((cid << 22) | (len_bytes / 2) as u32).to_le_bytes()
}

fn segment_record(id: SegmentId, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&record_header(CID_SEGMENT, 12 + payload.len()));
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&id.0.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn event_record(number: u32, segments: &[Vec<u8>]) -> Vec<u8> {
    let body: usize = segments.iter().map(|s| s.len()).sum();
    let mut buf = Vec::new();
    buf.extend_from_slice(&record_header(CID_EVENT, 12 + body));
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&number.to_le_bytes());
    for segment in segments {
        buf.extend_from_slice(segment);
    }
    buf
}

fn event_record_ts(number: u32, timestamp: u64, segments: &[Vec<u8>]) -> Vec<u8> {
    let body: usize = segments.iter().map(|s| s.len()).sum();
    let mut buf = Vec::new();
    buf.extend_from_slice(&record_header(CID_EVENT_TS, 20 + body));
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&number.to_le_bytes());
    buf.extend_from_slice(&timestamp.to_le_bytes());
    for segment in segments {
        buf.extend_from_slice(segment);
    }
    buf
}

fn noise_record(cid: u32, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&record_header(cid, 4 + body.len()));
    buf.extend_from_slice(body);
    buf
}

fn block(records: &[Vec<u8>]) -> Vec<u8> {
    let body: usize = records.iter().map(|r| r.len()).sum();
    let mut buf = Vec::new();
    buf.extend_from_slice(&(((8 + body) / 2) as u32).to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    for record in records {
        buf.extend_from_slice(record);
    }
    buf
}

/// Raw C16 samples for a negative pulse that, after the assembler's 4-bit
/// shift, reads 50 zeros, a ramp down to -90, and 50 zeros.
fn pulse_payload() -> Vec<u8> {
    let mut samples = vec![0i16; 50];
    for k in 0..10i16 {
        samples.push(-(k * 10) << 4);
    }
    samples.extend(vec![0i16; 50]);

    let mut payload = Vec::new();
    for s in samples {
        payload.extend_from_slice(&s.to_le_bytes());
    }
    payload
}

fn v1290_payload() -> Vec<u8> {
    let words: [u32; 4] = [0x4000_0003, 0x0020_0000, 0x0420_001f, 0x8000_0000];
    let mut payload = Vec::new();
    for w in words {
        payload.extend_from_slice(&w.to_le_bytes());
    }
    payload
}

fn write_run() -> NamedTempFile {
    let wf_id = SegmentId::new(0, 0, 1, 0);
    let tdc_id = SegmentId::new(0, 0, 3, 25);

    let first = block(&[
        noise_record(8, &[0u8; 12]),
        event_record_ts(100, 0x0123_4567_89ab, &[segment_record(wf_id, &pulse_payload())]),
        noise_record(12, &[0u8; 8]),
        event_record(101, &[segment_record(tdc_id, &v1290_payload())]),
    ]);
    let second = block(&[event_record_ts(
        102,
        0x0123_4567_90ff,
        &[
            segment_record(wf_id, &pulse_payload()),
            segment_record(tdc_id, &v1290_payload()),
        ],
    )]);

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&first).unwrap();
    file.write_all(&second).unwrap();
    file.flush().unwrap();
    file
}

fn analysis_config() -> AnalysisConfig {
    let doc = serde_json::json!({
        "global": { "sample_rate_ns": 1.0, "baseline_start": 0, "baseline_end": 50 },
        "detectors": {
            "default": { "polarity": "negative" }
        }
    });
    AnalysisConfig::from_document(&doc).unwrap()
}

#[test]
fn events_and_segments_stream_in_file_order() {
    let file = write_run();
    let mut parser = RidfParser::open(file.path()).unwrap();

    let mut seen = Vec::new();
    loop {
        match parser.next_event() {
            Ok(mut event) => {
                let mut modules = Vec::new();
                while let Some(segment) = event.next_segment() {
                    modules.push(segment.module());
                }
                seen.push((event.number(), event.timestamp(), modules));
            }
            Err(ParserError::NoData) => continue,
            Err(ParserError::EndOfStream) => break,
            Err(e) => panic!("stream failed: {e}"),
        }
    }

    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].0, 100);
    assert_eq!(seen[0].1, 0x0123_4567_89ab);
    assert_eq!(seen[0].2, vec![ModuleKind::C16]);
    assert_eq!(seen[1].0, 101);
    assert_eq!(seen[1].1, 0);
    assert_eq!(seen[1].2, vec![ModuleKind::V1290]);
    assert_eq!(seen[2].0, 102);
    assert_eq!(seen[2].2, vec![ModuleKind::C16, ModuleKind::V1290]);
}

#[test]
fn v1290_segment_decodes_two_hits() {
    let file = write_run();
    let mut parser = RidfParser::open(file.path()).unwrap();

    // Skip to event 101
    let _ = parser.next_event().unwrap();
    let mut event = parser.next_event().unwrap();
    assert_eq!(event.number(), 101);

    let mut segment = event.next_segment().unwrap();
    let first = segment.next_datum().unwrap();
    assert_eq!((first.geo, first.ch, first.edge, first.value), (3, 1, 0, 0));
    let second = segment.next_datum().unwrap();
    assert_eq!((second.geo, second.ch, second.edge, second.value), (3, 1, 1, 0x1f));
    assert!(segment.next_datum().is_none());
}

#[test]
fn pipeline_analyzes_the_whole_run() {
    let file = write_run();
    let parser = RidfParser::open(file.path()).unwrap();
    let mut pipeline = AnalysisPipeline::with_parser(parser, analysis_config());

    let mut analyses = Vec::new();
    loop {
        match pipeline.next_event() {
            Ok(event) => analyses.push(event),
            Err(ParserError::NoData) => continue,
            Err(ParserError::EndOfStream) => break,
            Err(e) => panic!("pipeline failed: {e}"),
        }
    }
    pipeline.log_summary();

    assert_eq!(analyses.len(), 3);

    // Events 100 and 102 carry the waveform on detector 1 channel 0
    for idx in [0usize, 2] {
        let ch = analyses[idx]
            .channels
            .iter()
            .find(|c| c.detector == 1)
            .unwrap();
        assert_eq!((ch.channel, ch.nsample), (0, 110));
        assert!(ch.result.valid);
        assert!((ch.result.amplitude - 90.0).abs() < 1e-6);
        assert_eq!(ch.result.peak_sample, 59);
        assert!((ch.result.cfd_times[4] - 54.5).abs() < 1e-4);
        assert!(ch.result.risetime > 0.0);
    }

    // The TDC segment assembles into a two-hit pseudo-waveform that is far
    // too short for the baseline window, so its analysis is invalid
    assert_eq!(analyses[1].channels.len(), 1);
    let tdc = &analyses[1].channels[0];
    assert_eq!((tdc.detector, tdc.channel, tdc.nsample), (3, 0, 2));
    assert!(!tdc.result.valid);

    let stats = pipeline.stats();
    assert_eq!(stats.events, 3);
    assert_eq!(stats.segments, 4);
    assert_eq!(stats.analyzed_channels, 4);
}

#[test]
fn survey_lists_every_segment_in_the_run() {
    let file = write_run();
    let mut parser = RidfParser::open(file.path()).unwrap();

    let ids = parser.survey_segments().unwrap();
    let modules: Vec<u32> = ids.iter().map(|id| id.module()).collect();
    assert_eq!(modules, vec![0, 25, 0, 25]);
}
