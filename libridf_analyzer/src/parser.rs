use std::path::Path;

use super::constants::{
    BLOCK_BUFFER_SIZE, BLOCK_HEADER_SIZE, CID_EVENT, CID_EVENT_TS, CID_SEGMENT,
    RECORD_CID_MASK, RECORD_CID_SHIFT, RECORD_HEADER_SIZE, RECORD_SIZE_MASK, SIZE_UNIT,
};
use super::error::{ParserError, RidfFileError};
use super::modules::{Datum, ModuleDecoder, ModuleKind};
use super::ridf_file::RidfFile;
use super::ridf_pull::RidfPull;
use super::segment_id::SegmentId;

/// Byte offset of the event number within an event record.
const EVENT_NUMBER_OFFSET: usize = 8;
/// Byte offset of the timestamp within a timestamped event record.
const EVENT_TS_OFFSET: usize = 12;
/// First segment byte for plain / timestamped event records.
const EVENT_PAYLOAD_OFFSET: usize = 12;
const EVENT_TS_PAYLOAD_OFFSET: usize = 20;
/// Segment id and payload offsets within a segment record.
const SEGMENT_ID_OFFSET: usize = 8;
const SEGMENT_PAYLOAD_OFFSET: usize = 12;

#[derive(Debug)]
enum BlockSource {
    File(RidfFile),
    Online(RidfPull),
}

/// Decoded form of one 32-bit record header.
#[derive(Debug, Clone, Copy)]
struct RecordHeader {
    cid: u32,
    len: usize,
}

fn record_header_at(block: &[u8], offset: usize) -> Option<RecordHeader> {
    let bytes = block.get(offset..offset + RECORD_HEADER_SIZE)?;
    let word = u32::from_le_bytes(bytes.try_into().unwrap());
    Some(RecordHeader {
        cid: (word >> RECORD_CID_SHIFT) & RECORD_CID_MASK,
        len: ((word & RECORD_SIZE_MASK) as usize) * SIZE_UNIT,
    })
}

fn u32_at(block: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(block[offset..offset + 4].try_into().unwrap())
}

fn u64_at(block: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(block[offset..offset + 8].try_into().unwrap())
}

/// Streaming parser over the RIDF record hierarchy.
///
/// The parser owns one block buffer and refills it from its source as the
/// walk consumes events. `next_event` hands out an [`Event`] that borrows
/// the buffer; segments and data are then pulled from the event. The borrow
/// chain (parser → event → segment) guarantees a single live decoder and
/// keeps the buffer stable underneath it.
#[derive(Debug)]
pub struct RidfParser {
    source: BlockSource,
    block: Vec<u8>,
    block_len: usize,
    /// Next scan offset; 0 means a fresh block is needed.
    cursor: usize,
}

impl RidfParser {
    /// Open an on-disk RIDF file for streaming.
    pub fn open(path: &Path) -> Result<Self, ParserError> {
        let file = RidfFile::open(path)?;
        Ok(Self::with_source(BlockSource::File(file)))
    }

    /// Attach to the event builder on `host` for live pulling.
    pub fn connect(host: &str) -> Self {
        Self::with_source(BlockSource::Online(RidfPull::new(host)))
    }

    /// Attach to an event builder on a non-standard port.
    pub fn connect_port(host: &str, port: u16) -> Self {
        Self::with_source(BlockSource::Online(RidfPull::with_port(host, port)))
    }

    fn with_source(source: BlockSource) -> Self {
        Self {
            source,
            block: vec![0u8; BLOCK_BUFFER_SIZE],
            block_len: 0,
            cursor: 0,
        }
    }

    /// Restart the stream from the first block. File sources only.
    pub fn rewind(&mut self) -> Result<(), ParserError> {
        match &mut self.source {
            BlockSource::File(file) => {
                file.rewind()?;
                self.block_len = 0;
                self.cursor = 0;
                Ok(())
            }
            BlockSource::Online(_) => Err(ParserError::NotRewindable),
        }
    }

    /// True when blocks come from a file and the stream is restartable.
    pub fn is_file(&self) -> bool {
        matches!(self.source, BlockSource::File(_))
    }

    fn fetch_block(&mut self) -> Result<(), ParserError> {
        let len = match &mut self.source {
            BlockSource::File(file) => match file.next_block(&mut self.block) {
                Ok(len) => len,
                Err(RidfFileError::EndOfFile) => return Err(ParserError::EndOfStream),
                Err(e) => return Err(e.into()),
            },
            BlockSource::Online(puller) => puller.pull(&mut self.block)?,
        };

        if len == 0 {
            self.block_len = 0;
            return Err(ParserError::NoData);
        }
        self.block_len = len;
        self.cursor = BLOCK_HEADER_SIZE;
        Ok(())
    }

    /// Advance to the next event record in the stream.
    ///
    /// `Err(NoData)` means the current block is spent (file) or the event
    /// builder had nothing fresh (online); calling again continues with the
    /// next block. `Err(EndOfStream)` is terminal.
    pub fn next_event(&mut self) -> Result<Event<'_>, ParserError> {
        if self.cursor == 0 {
            self.fetch_block()?;
        }

        let mut n = self.cursor;
        while n + RECORD_HEADER_SIZE <= self.block_len {
            let hd = match record_header_at(&self.block, n) {
                Some(hd) => hd,
                None => break,
            };
            if hd.len == 0 || n + hd.len > self.block_len {
                spdlog::warn!(
                    "malformed record at block offset {} (cid {}, {} bytes); discarding rest of block",
                    n,
                    hd.cid,
                    hd.len
                );
                self.cursor = 0;
                return Err(ParserError::NoData);
            }

            if hd.cid == CID_EVENT || hd.cid == CID_EVENT_TS {
                let payload_offset = if hd.cid == CID_EVENT_TS {
                    EVENT_TS_PAYLOAD_OFFSET
                } else {
                    EVENT_PAYLOAD_OFFSET
                };
                if hd.len < payload_offset {
                    spdlog::warn!(
                        "event record at block offset {} too short ({} bytes); skipping",
                        n,
                        hd.len
                    );
                    n += hd.len;
                    continue;
                }

                let number = u32_at(&self.block, n + EVENT_NUMBER_OFFSET);
                let timestamp = if hd.cid == CID_EVENT_TS {
                    u64_at(&self.block, n + EVENT_TS_OFFSET)
                } else {
                    0
                };

                let next = n + hd.len;
                self.cursor = if next + RECORD_HEADER_SIZE <= self.block_len {
                    next
                } else {
                    0
                };

                return Ok(Event {
                    block: &self.block[..self.block_len],
                    number,
                    timestamp,
                    cursor: n + payload_offset,
                    end: next,
                });
            }

            n += hd.len;
        }

        // Ran off the block without another event; pull a new one next call
        self.cursor = 0;
        Err(ParserError::NoData)
    }

    /// Walk the remaining stream and collect every segment id in order.
    ///
    /// Intended for file sources, where the whole run can be surveyed; an
    /// online source stops at the first idle pull.
    pub fn survey_segments(&mut self) -> Result<Vec<SegmentId>, ParserError> {
        let mut ids = Vec::new();
        loop {
            match self.next_event() {
                Ok(mut event) => {
                    while let Some(segment) = event.next_segment() {
                        ids.push(segment.id());
                    }
                }
                Err(ParserError::NoData) => {
                    if self.is_file() {
                        continue;
                    }
                    break;
                }
                Err(ParserError::EndOfStream) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(ids)
    }
}

/// One event record, borrowed out of the parser's block buffer.
#[derive(Debug)]
pub struct Event<'blk> {
    block: &'blk [u8],
    number: u32,
    timestamp: u64,
    cursor: usize,
    end: usize,
}

impl Event<'_> {
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Event-builder timestamp; zero for untimestamped event records.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Advance to the next segment record within this event.
    ///
    /// The returned [`Segment`] borrows the event, so at most one segment
    /// (and one decoder) is live at a time.
    pub fn next_segment(&mut self) -> Option<Segment<'_>> {
        while self.cursor + RECORD_HEADER_SIZE <= self.end {
            let hd = record_header_at(self.block, self.cursor)?;
            if hd.len == 0 || self.cursor + hd.len > self.end {
                spdlog::warn!(
                    "malformed segment record at offset {} ({} bytes); abandoning event",
                    self.cursor,
                    hd.len
                );
                self.cursor = self.end;
                return None;
            }

            let start = self.cursor;
            self.cursor += hd.len;

            if hd.cid == CID_SEGMENT && hd.len >= SEGMENT_PAYLOAD_OFFSET {
                let id = SegmentId::from(u32_at(self.block, start + SEGMENT_ID_OFFSET));
                let payload = &self.block[start + SEGMENT_PAYLOAD_OFFSET..start + hd.len];
                return Some(Segment {
                    id,
                    payload,
                    decoder: ModuleDecoder::for_module(id.module()),
                });
            }
        }
        None
    }
}

/// One segment record: its id, payload bytes, and the live module decoder.
#[derive(Debug)]
pub struct Segment<'evt> {
    id: SegmentId,
    payload: &'evt [u8],
    decoder: ModuleDecoder,
}

impl Segment<'_> {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Decoder family chosen from the segment id's module field.
    pub fn module(&self) -> ModuleKind {
        self.decoder.kind()
    }

    /// Raw payload bytes of this segment.
    pub fn payload(&self) -> &[u8] {
        self.payload
    }

    /// Decode the next datum, or None at the end of the segment.
    pub fn next_datum(&mut self) -> Option<Datum> {
        self.decoder.decode(self.payload)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parser_over(blocks: &[Vec<u8>]) -> (RidfParser, NamedTempFile) {
        let mut file = NamedTempFile::new().unwrap();
        for block in blocks {
            file.write_all(block).unwrap();
        }
        file.flush().unwrap();
        let parser = RidfParser::open(file.path()).unwrap();
        (parser, file)
    }

    /// Pull events across block boundaries until the stream ends.
    fn collect_events(parser: &mut RidfParser) -> Vec<(u32, u64)> {
        let mut events = Vec::new();
        loop {
            match parser.next_event() {
                Ok(event) => events.push((event.number(), event.timestamp())),
                Err(ParserError::NoData) => continue,
                Err(ParserError::EndOfStream) => break,
                Err(e) => panic!("unexpected parser error: {e}"),
            }
        }
        events
    }

    #[test]
    fn test_events_surface_in_stream_order() {
        let mut records = Vec::new();
        push_event(&mut records, 1, &[]);
        push_noise(&mut records, 9, &[0u8; 12]);
        push_event_ts(&mut records, 2, 0xdead_beef_0123, &[]);
        push_noise(&mut records, 21, &[0u8; 4]);
        push_event(&mut records, 3, &[]);
        let block = make_block(&records);

        let (mut parser, _file) = parser_over(&[block]);
        let events = collect_events(&mut parser);
        assert_eq!(
            events,
            vec![(1, 0), (2, 0xdead_beef_0123), (3, 0)]
        );
    }

    #[test]
    fn test_events_cross_block_boundaries() {
        let mut first = Vec::new();
        push_event(&mut first, 10, &[]);
        let mut second = Vec::new();
        push_event(&mut second, 11, &[]);
        push_event(&mut second, 12, &[]);

        let (mut parser, _file) = parser_over(&[make_block(&first), make_block(&second)]);
        let events = collect_events(&mut parser);
        assert_eq!(events.iter().map(|e| e.0).collect::<Vec<_>>(), vec![10, 11, 12]);
    }

    #[test]
    fn test_block_with_only_noise_yields_no_events() {
        let mut records = Vec::new();
        push_noise(&mut records, 8, &[0u8; 16]);
        push_noise(&mut records, 5, &[0u8; 8]);

        let (mut parser, _file) = parser_over(&[make_block(&records)]);
        assert!(collect_events(&mut parser).is_empty());
    }

    #[test]
    fn test_zero_length_record_discards_block() {
        // First block: a good event, then a corrupt zero-length record.
        let mut records = Vec::new();
        push_event(&mut records, 1, &[]);
        records.extend_from_slice(&record_header(5, 0).to_le_bytes());
        push_event(&mut records, 99, &[]); // unreachable behind the corruption

        let mut second = Vec::new();
        push_event(&mut second, 2, &[]);

        let (mut parser, _file) = parser_over(&[make_block(&records), make_block(&second)]);
        let events = collect_events(&mut parser);
        // Event 99 is lost with the corrupt block; the stream recovers at 2
        assert_eq!(events.iter().map(|e| e.0).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_overlong_record_discards_block() {
        let mut records = Vec::new();
        push_noise(&mut records, 5, &[0u8; 4]);
        // Claimed length far beyond the block end
        records.extend_from_slice(&record_header(3, 4096).to_le_bytes());

        let mut second = Vec::new();
        push_event(&mut second, 7, &[]);

        let (mut parser, _file) = parser_over(&[make_block(&records), make_block(&second)]);
        let events = collect_events(&mut parser);
        assert_eq!(events.iter().map(|e| e.0).collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn test_segment_walk_and_decoder_dispatch() {
        let id = SegmentId::new(0, 3, 5, 0);
        let samples: [i16; 8] = [100, 200, 300, 400, 500, 400, 300, 200];
        let segment = c16_segment(id, &samples);

        let mut records = Vec::new();
        push_event(&mut records, 7, &[segment]);

        let (mut parser, _file) = parser_over(&[make_block(&records)]);
        let mut event = parser.next_event().unwrap();
        assert_eq!(event.number(), 7);

        let mut segment = event.next_segment().unwrap();
        assert_eq!(segment.id(), id);
        assert_eq!(segment.module(), ModuleKind::C16);

        let mut values = Vec::new();
        while let Some(datum) = segment.next_datum() {
            assert_eq!(datum.geo, 0);
            assert_eq!(datum.edge, 0);
            assert_eq!(datum.ch, values.len() as i32);
            values.push(datum.value);
        }
        assert_eq!(values, vec![100, 200, 300, 400, 500, 400, 300, 200]);

        assert!(event.next_segment().is_none());
    }

    #[test]
    fn test_segments_do_not_leak_across_events() {
        let first_seg = c16_segment(SegmentId::new(0, 0, 1, 0), &[1, 2]);
        let second_seg = c16_segment(SegmentId::new(0, 0, 2, 0), &[3, 4]);

        let mut records = Vec::new();
        push_event(&mut records, 1, &[first_seg]);
        push_event(&mut records, 2, &[second_seg]);

        let (mut parser, _file) = parser_over(&[make_block(&records)]);

        let mut event = parser.next_event().unwrap();
        let segment = event.next_segment().unwrap();
        assert_eq!(segment.id().detector(), 1);
        drop(segment);
        // The second event's segment must not appear in the first event
        assert!(event.next_segment().is_none());

        let mut event = parser.next_event().unwrap();
        let segment = event.next_segment().unwrap();
        assert_eq!(segment.id().detector(), 2);
    }

    #[test]
    fn test_unknown_module_passes_through_raw_words() {
        let id = SegmentId::new(1, 2, 3, 200);
        let mut payload = Vec::new();
        payload.extend_from_slice(&0x1122_3344u32.to_le_bytes());
        payload.extend_from_slice(&0x5566_7788u32.to_le_bytes());
        let mut seg = Vec::new();
        push_segment(&mut seg, id, &payload);

        let mut records = Vec::new();
        push_event(&mut records, 1, &[seg]);

        let (mut parser, _file) = parser_over(&[make_block(&records)]);
        let mut event = parser.next_event().unwrap();
        let mut segment = event.next_segment().unwrap();
        assert_eq!(segment.module(), ModuleKind::Raw);

        assert_eq!(segment.next_datum().unwrap().value as u32, 0x1122_3344);
        assert_eq!(segment.next_datum().unwrap().value as u32, 0x5566_7788);
        assert!(segment.next_datum().is_none());
    }

    #[test]
    fn test_rewind_restarts_file_stream() {
        let mut records = Vec::new();
        push_event(&mut records, 4, &[]);

        let (mut parser, _file) = parser_over(&[make_block(&records)]);
        assert_eq!(collect_events(&mut parser), vec![(4, 0)]);

        parser.rewind().unwrap();
        assert_eq!(collect_events(&mut parser), vec![(4, 0)]);
    }

    #[test]
    fn test_survey_segments() {
        let seg_a = c16_segment(SegmentId::new(0, 0, 1, 0), &[1]);
        let seg_b = c16_segment(SegmentId::new(0, 1, 1, 0), &[2]);
        let seg_c = c16_segment(SegmentId::new(0, 0, 2, 47), &[3]);

        let mut records = Vec::new();
        push_event(&mut records, 1, &[seg_a, seg_b]);
        push_event(&mut records, 2, &[seg_c]);

        let (mut parser, _file) = parser_over(&[make_block(&records)]);
        let ids = parser.survey_segments().unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0].focal_plane(), 0);
        assert_eq!(ids[1].focal_plane(), 1);
        assert_eq!(ids[2].module(), 47);
    }
}
