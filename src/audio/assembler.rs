//! Cuts a chunked byte stream of back-to-back WAV files into segments.
//!
//! The stream carries no length or count header. Every segment starts with
//! the `RIFF` marker and runs until the next marker or the end of the stream,
//! so a segment is only known to be complete once the following marker (or
//! end-of-stream) has been seen. Network reads can split the stream anywhere,
//! including inside a marker.
//!
//! The marker is assumed to appear only at the start of a segment. A payload
//! that happens to contain the bytes `RIFF` would be cut in two.

use log::{debug, warn};

use crate::models::AudioSegment;

/// Signature that begins every segment
pub const SEGMENT_MARKER: [u8; 4] = *b"RIFF";
const MARKER_LEN: usize = SEGMENT_MARKER.len();

/// Incremental segment splitter, one per request
#[derive(Debug, Default)]
pub struct SegmentAssembler {
    /// Bytes received but not yet emitted as a segment
    buffer: Vec<u8>,
    /// Where to resume looking for a leading marker when the buffer has none
    search_offset: usize,
    /// Where to resume looking for the marker that closes the pending segment
    boundary_scan: usize,
    next_index: usize,
    bytes_received: u64,
    bytes_discarded: u64,
    finished: bool,
}

impl SegmentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a network chunk and return every segment it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<AudioSegment> {
        if self.finished {
            warn!("Ignoring {} bytes pushed after end of stream", chunk.len());
            return Vec::new();
        }
        self.bytes_received += chunk.len() as u64;
        self.buffer.extend_from_slice(chunk);
        self.extract(false)
    }

    /// Signal end of stream and flush whatever remains as the final segment
    pub fn finish(&mut self) -> Vec<AudioSegment> {
        if self.finished {
            return Vec::new();
        }
        let segments = self.extract(true);
        self.finished = true;
        segments
    }

    /// Bytes held back waiting for the rest of a segment
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of segments emitted so far
    pub fn segments_emitted(&self) -> usize {
        self.next_index
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Bytes dropped because they preceded the first marker
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn extract(&mut self, network_done: bool) -> Vec<AudioSegment> {
        let mut segments = Vec::new();

        loop {
            if !self.buffer.starts_with(&SEGMENT_MARKER) {
                match find_marker(&self.buffer, self.search_offset) {
                    Some(pos) => {
                        // Anything ahead of the first marker cannot be decoded.
                        if pos > 0 {
                            warn!("Discarding {} bytes before segment marker", pos);
                            self.bytes_discarded += pos as u64;
                            self.buffer.drain(..pos);
                        }
                        self.search_offset = 0;
                        self.boundary_scan = MARKER_LEN;
                    }
                    None if network_done => {
                        let tail = std::mem::take(&mut self.buffer);
                        self.emit(tail, &mut segments);
                        self.search_offset = 0;
                        break;
                    }
                    None => {
                        // Keep the last few bytes scannable: a marker may straddle reads.
                        self.search_offset = self.buffer.len().saturating_sub(MARKER_LEN - 1);
                        break;
                    }
                }
            }

            let from = self.boundary_scan.max(MARKER_LEN);
            match find_marker(&self.buffer, from) {
                Some(next) => {
                    let rest = self.buffer.split_off(next);
                    let segment = std::mem::replace(&mut self.buffer, rest);
                    self.emit(segment, &mut segments);
                    self.boundary_scan = MARKER_LEN;
                }
                None if network_done => {
                    let segment = std::mem::take(&mut self.buffer);
                    self.emit(segment, &mut segments);
                    self.boundary_scan = MARKER_LEN;
                    break;
                }
                None => {
                    self.boundary_scan = self
                        .buffer
                        .len()
                        .saturating_sub(MARKER_LEN - 1)
                        .max(MARKER_LEN);
                    break;
                }
            }
        }

        segments
    }

    fn emit(&mut self, bytes: Vec<u8>, out: &mut Vec<AudioSegment>) {
        // A lone marker, or nothing at all, carries no audio.
        if bytes.is_empty() || bytes.as_slice() == SEGMENT_MARKER {
            debug!("Skipping empty segment ({} bytes)", bytes.len());
            return;
        }
        let segment = AudioSegment::new(self.next_index, bytes);
        debug!("Assembled segment #{} ({} bytes)", segment.index, segment.len());
        self.next_index += 1;
        out.push(segment);
    }
}

/// Position of the first marker at or after `from`
fn find_marker(haystack: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(MARKER_LEN)
        .position(|window| window == SEGMENT_MARKER)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_segment(len: usize, seed: u8) -> Vec<u8> {
        let mut bytes = SEGMENT_MARKER.to_vec();
        // Payload bytes stay below b'F' so they can never spell the marker.
        bytes.extend((0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed) % 60));
        bytes
    }

    fn stream_of(segments: &[Vec<u8>]) -> Vec<u8> {
        segments.concat()
    }

    fn collect_in_chunks(stream: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
        let mut assembler = SegmentAssembler::new();
        let mut out = Vec::new();
        for chunk in stream.chunks(chunk_size.max(1)) {
            out.extend(assembler.push(chunk).into_iter().map(|s| s.bytes));
        }
        out.extend(assembler.finish().into_iter().map(|s| s.bytes));
        out
    }

    #[test]
    fn test_whole_stream_in_one_read() {
        let segments = vec![fake_segment(40, 1), fake_segment(13, 2), fake_segment(90, 3)];
        let stream = stream_of(&segments);
        assert_eq!(collect_in_chunks(&stream, stream.len()), segments);
    }

    #[test]
    fn test_every_split_point_yields_identical_segments() {
        let segments = vec![fake_segment(25, 4), fake_segment(31, 5), fake_segment(8, 6)];
        let stream = stream_of(&segments);

        for split in 0..=stream.len() {
            let mut assembler = SegmentAssembler::new();
            let mut out = Vec::new();
            out.extend(assembler.push(&stream[..split]));
            out.extend(assembler.push(&stream[split..]));
            out.extend(assembler.finish());

            let bytes: Vec<Vec<u8>> = out.iter().map(|s| s.bytes.clone()).collect();
            assert_eq!(bytes, segments, "split at byte {}", split);
            let indices: Vec<usize> = out.iter().map(|s| s.index).collect();
            assert_eq!(indices, vec![0, 1, 2]);
        }
    }

    #[test]
    fn test_one_byte_at_a_time() {
        let segments = vec![fake_segment(50, 7), fake_segment(3, 8), fake_segment(77, 9)];
        let stream = stream_of(&segments);
        assert_eq!(collect_in_chunks(&stream, 1), segments);
    }

    #[test]
    fn test_odd_chunk_sizes() {
        let segments: Vec<Vec<u8>> = (0..6).map(|i| fake_segment(20 + i * 11, i as u8)).collect();
        let stream = stream_of(&segments);
        for chunk_size in [2, 3, 5, 7, 64] {
            assert_eq!(collect_in_chunks(&stream, chunk_size), segments, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_segment_held_until_next_marker_or_end() {
        let first = fake_segment(10, 1);
        let mut assembler = SegmentAssembler::new();

        assert!(assembler.push(&first).is_empty());
        assert_eq!(assembler.pending_len(), first.len());

        // Only part of the next marker has arrived.
        assert!(assembler.push(b"RI").is_empty());

        let emitted = assembler.push(b"FF\x01\x02");
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].bytes, first);

        let last = assembler.finish();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].bytes, b"RIFF\x01\x02".to_vec());
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_empty_stream_emits_nothing() {
        let mut assembler = SegmentAssembler::new();
        assert!(assembler.finish().is_empty());
        assert_eq!(assembler.segments_emitted(), 0);
        assert!(assembler.is_finished());
    }

    #[test]
    fn test_adjacent_markers_are_skipped() {
        let segment = fake_segment(12, 3);
        let mut stream = SEGMENT_MARKER.to_vec();
        stream.extend_from_slice(&segment);
        stream.extend_from_slice(&SEGMENT_MARKER);

        let out = collect_in_chunks(&stream, 5);
        assert_eq!(out, vec![segment]);
    }

    #[test]
    fn test_markerless_tail_flushed_at_end() {
        let mut assembler = SegmentAssembler::new();
        assert!(assembler.push(b"\x00\x01\x02").is_empty());
        let out = assembler.finish();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bytes, b"\x00\x01\x02".to_vec());
    }

    #[test]
    fn test_leading_garbage_is_discarded() {
        let segment = fake_segment(16, 2);
        let mut stream = b"xx".to_vec();
        stream.extend_from_slice(&segment);

        let mut assembler = SegmentAssembler::new();
        let mut out = assembler.push(&stream);
        out.extend(assembler.finish());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bytes, segment);
        assert_eq!(assembler.bytes_discarded(), 2);
        assert_eq!(assembler.bytes_received(), stream.len() as u64);
    }

    #[test]
    fn test_push_after_finish_is_ignored() {
        let mut assembler = SegmentAssembler::new();
        assembler.push(&fake_segment(4, 0));
        assert_eq!(assembler.finish().len(), 1);
        assert!(assembler.push(&fake_segment(4, 0)).is_empty());
        assert!(assembler.finish().is_empty());
    }
}
