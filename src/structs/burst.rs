//! MAT frame layout and the burst buffer writer.
//!
//! ## Frame Layout
//!
//! A MAT frame is exactly 61440 bytes:
//!
//! | Offset | Content |
//! |---|---|
//! | 0..8 | reserved for the caller's burst preamble, never written here |
//! | 8..28 | 20-byte MAT start code |
//! | ..30720 | 12-byte MAT middle code, end offset fixed |
//! | 61416..61440 | 24-byte MAT end code |
//! | elsewhere | access unit payload or zero padding |
//!
//! Marker bytes are applied against pending padding first; whatever the
//! padding does not cover counts into the finalized size of the unit being
//! written, which the padding calculator then deducts from the next gap.
//! This is what holds the output to the nominal constant bitrate.

use std::sync::Arc;

use crate::process::pack::PackerState;

/// Total byte size of one MAT frame.
pub const MAT_FRAME_SIZE: usize = 61440;

/// Reserved region at the head of every frame for the outer burst preamble.
pub const BURST_HEADER_SIZE: usize = 8;

/// MAT start code, occupying bytes 8..28 of every frame.
pub const MAT_START_CODE: [u8; 20] = [
    0x07, 0x9E, 0x00, 0x03, 0x84, 0x01, 0x01, 0x01, 0x80, 0x00, 0x56, 0xA5, 0x3B, 0xF4, 0x81, 0x83,
    0x49, 0x80, 0x77, 0xE0,
];

/// MAT middle code; its last byte always lands at offset 30719.
pub const MAT_MIDDLE_CODE: [u8; 12] = [
    0xC3, 0xC1, 0x42, 0x49, 0x3B, 0xFA, 0x82, 0x83, 0x49, 0x80, 0x77, 0xE0,
];

/// MAT end code; its last byte is always the last byte of the frame.
pub const MAT_END_CODE: [u8; 24] = [
    0xC3, 0xC2, 0xC0, 0xC4, 0x00, 0x00, 0x00, 0x00, 0x11, 0x97, 0x4B, 0x21, 0x78, 0x7C, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

const MIDDLE_CODE_START: usize = 30720 - MAT_MIDDLE_CODE.len();
const END_CODE_START: usize = MAT_FRAME_SIZE - MAT_END_CODE.len();

/// A completed 61440-byte MAT frame, ready for the transport layer.
///
/// The first [`BURST_HEADER_SIZE`] bytes are zero; the caller overlays its
/// own burst preamble there.
#[derive(Debug, Clone)]
pub struct MatFrame {
    pub data: Arc<[u8]>,
}

impl AsRef<[u8]> for MatFrame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// One write request for [`BurstWriter::append`].
///
/// Padding never copies bytes; the destination buffer is already zero.
#[derive(Debug, Clone, Copy)]
pub enum Chunk<'a> {
    Payload(&'a [u8]),
    Padding(usize),
}

impl<'a> Chunk<'a> {
    pub fn len(&self) -> usize {
        match self {
            Chunk::Payload(data) => data.len(),
            Chunk::Padding(len) => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn split(self, at: usize) -> (Chunk<'a>, Chunk<'a>) {
        match self {
            Chunk::Payload(data) => {
                let (head, tail) = data.split_at(at);
                (Chunk::Payload(head), Chunk::Payload(tail))
            }
            Chunk::Padding(len) => (Chunk::Padding(at), Chunk::Padding(len - at)),
        }
    }

    /// Shrinks a padding chunk by the owed bytes a marker just delivered.
    fn shrink(self, by: usize) -> Chunk<'a> {
        match self {
            Chunk::Payload(data) => Chunk::Payload(data),
            Chunk::Padding(len) => Chunk::Padding(len.saturating_sub(by)),
        }
    }
}

/// Owns the MAT frame under construction and places the fixed markers.
#[derive(Debug, Default)]
pub struct BurstWriter {
    frame: Vec<u8>,
    cursor: usize,
}

impl BurstWriter {
    pub fn is_open(&self) -> bool {
        !self.frame.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Opens a fresh zero-filled frame and writes the reserved gap plus the
    /// start code. The 28 bytes are applied against pending padding first;
    /// the shortfall counts as frame content.
    pub fn start_frame(&mut self, state: &mut PackerState) {
        debug_assert!(!self.is_open());

        self.frame = vec![0; MAT_FRAME_SIZE];
        self.frame[BURST_HEADER_SIZE..BURST_HEADER_SIZE + MAT_START_CODE.len()]
            .copy_from_slice(&MAT_START_CODE);
        self.cursor = BURST_HEADER_SIZE + MAT_START_CODE.len();

        Self::account_marker(state, self.cursor);
    }

    /// Writes a chunk at the cursor, inserting the middle and end codes at
    /// their fixed offsets as the write sweeps past them.
    ///
    /// Returns the unwritten remainder (possibly empty) once the frame is
    /// full; the caller must flush via [`Self::take_frame`] before writing
    /// anything further.
    pub fn append<'a>(&mut self, state: &mut PackerState, chunk: Chunk<'a>) -> Option<Chunk<'a>> {
        let len = chunk.len();
        if len == 0 {
            return None;
        }

        debug_assert!(self.is_open());

        // The middle code begins wherever the cursor falls, but its end
        // offset is fixed: split the write at the code start.
        if self.cursor <= MIDDLE_CODE_START && self.cursor + len > MIDDLE_CODE_START {
            let (head, tail) = chunk.split(MIDDLE_CODE_START - self.cursor);
            self.write_chunk(state, head);
            let absorbed = self.write_code(state, &MAT_MIDDLE_CODE);
            return self.append(state, tail.shrink(absorbed));
        }

        // The end code claims the frame's last 24 bytes; anything that
        // would reach them waits for the next frame.
        if self.cursor + len >= END_CODE_START {
            let (head, tail) = chunk.split(END_CODE_START - self.cursor);
            self.write_chunk(state, head);
            let absorbed = self.write_code(state, &MAT_END_CODE);
            return Some(tail.shrink(absorbed));
        }

        self.write_chunk(state, chunk);
        None
    }

    /// Hands over the completed frame. Valid only once the cursor has
    /// reached [`MAT_FRAME_SIZE`].
    pub fn take_frame(&mut self) -> MatFrame {
        debug_assert_eq!(self.cursor, MAT_FRAME_SIZE);

        self.cursor = 0;
        MatFrame {
            data: std::mem::take(&mut self.frame).into(),
        }
    }

    /// Drops any partially written frame.
    pub fn discard(&mut self) {
        self.frame.clear();
        self.cursor = 0;
    }

    fn write_chunk(&mut self, state: &mut PackerState, chunk: Chunk<'_>) {
        match chunk {
            Chunk::Payload(data) => {
                self.frame[self.cursor..self.cursor + data.len()].copy_from_slice(data);
                self.cursor += data.len();
                state.frame_size += data.len();
            }
            Chunk::Padding(len) => {
                self.cursor += len;
                state.pending_padding -= len;
            }
        }
    }

    fn write_code(&mut self, state: &mut PackerState, code: &[u8]) -> usize {
        self.frame[self.cursor..self.cursor + code.len()].copy_from_slice(code);
        self.cursor += code.len();

        Self::account_marker(state, code.len())
    }

    fn account_marker(state: &mut PackerState, len: usize) -> usize {
        let absorbed = state.pending_padding.min(len);
        state.pending_padding -= absorbed;
        state.frame_size += len - absorbed;
        absorbed
    }
}

#[cfg(test)]
fn test_state() -> PackerState {
    PackerState::default()
}

#[test]
fn start_frame_places_start_code() {
    let mut state = test_state();
    let mut writer = BurstWriter::default();

    writer.start_frame(&mut state);
    assert_eq!(writer.cursor(), 28);
    assert_eq!(&writer.frame[..8], &[0u8; 8]);
    assert_eq!(&writer.frame[8..28], &MAT_START_CODE);
    assert_eq!(state.frame_size, 28);
}

#[test]
fn start_frame_absorbs_pending_padding() {
    let mut state = test_state();
    state.pending_padding = 100;

    let mut writer = BurstWriter::default();
    writer.start_frame(&mut state);

    assert_eq!(state.pending_padding, 72);
    assert_eq!(state.frame_size, 0);
}

#[test]
fn middle_code_ends_at_fixed_offset() {
    let mut state = test_state();
    let mut writer = BurstWriter::default();
    writer.start_frame(&mut state);

    // sweep the cursor just short of the middle code with padding
    state.pending_padding = MIDDLE_CODE_START - writer.cursor() - 4;
    let pending = state.pending_padding;
    assert!(writer.append(&mut state, Chunk::Padding(pending)).is_none());
    assert_eq!(writer.cursor(), MIDDLE_CODE_START - 4);

    // a payload write straddling the code start is split around the code
    let payload = [0xABu8; 10];
    assert!(writer.append(&mut state, Chunk::Payload(&payload)).is_none());

    assert_eq!(&writer.frame[30708..30720], &MAT_MIDDLE_CODE);
    assert_eq!(&writer.frame[30704..30708], &payload[..4]);
    assert_eq!(&writer.frame[30720..30726], &payload[4..]);
    assert_eq!(writer.cursor(), 30726);
}

#[test]
fn middle_code_consumes_padding_when_pending() {
    let mut state = test_state();
    let mut writer = BurstWriter::default();
    writer.start_frame(&mut state);
    state.frame_size = 0;

    state.pending_padding = MIDDLE_CODE_START - writer.cursor() + 40;
    let pending = state.pending_padding;
    assert!(writer.append(&mut state, Chunk::Padding(pending)).is_none());

    // 12 of the owed bytes were delivered as the marker itself
    assert_eq!(state.pending_padding, 0);
    assert_eq!(state.frame_size, 0);
    assert_eq!(&writer.frame[30708..30720], &MAT_MIDDLE_CODE);
    assert_eq!(writer.cursor(), 30720 + 40 - 12);
}

#[test]
fn end_code_returns_remainder() {
    let mut state = test_state();
    let mut writer = BurstWriter::default();
    writer.start_frame(&mut state);

    state.pending_padding = MIDDLE_CODE_START + 100;
    let pending = state.pending_padding;
    assert!(writer.append(&mut state, Chunk::Padding(pending)).is_none());

    let gap = END_CODE_START - writer.cursor();
    let payload = vec![0x5Au8; gap + 50];
    let rest = writer
        .append(&mut state, Chunk::Payload(&payload))
        .expect("frame fills");
    assert_eq!(rest.len(), 50);

    assert_eq!(writer.cursor(), MAT_FRAME_SIZE);
    assert_eq!(&writer.frame[END_CODE_START..], &MAT_END_CODE);

    let frame = writer.take_frame();
    assert_eq!(frame.as_ref().len(), MAT_FRAME_SIZE);
    assert!(!writer.is_open());
}

#[test]
fn padding_copies_nothing() {
    let mut state = test_state();
    let mut writer = BurstWriter::default();
    writer.start_frame(&mut state);

    state.pending_padding = 64;
    assert!(writer.append(&mut state, Chunk::Padding(64)).is_none());
    assert_eq!(&writer.frame[28..92], &[0u8; 64]);
    assert_eq!(state.pending_padding, 0);
}
