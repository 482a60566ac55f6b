use std::collections::VecDeque;

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::{debug, trace, warn};

use crate::log_or_err;
use crate::structs::burst::{BurstWriter, Chunk, MAT_FRAME_SIZE, MatFrame};
use crate::structs::sync::MajorSync;
use crate::utils::errors::PackError;
use crate::utils::timing::{padding_for_gap, samples_per_unit};

/// Nominal number of access units carried by one MAT frame.
pub const UNITS_PER_MAT_FRAME: usize = 24;

/// Pending padding beyond this many bytes is a stream discontinuity and
/// triggers a full reset rather than ever being drained.
pub const MAX_PENDING_PADDING: usize = 5 * MAT_FRAME_SIZE;

/// Outcome of feeding one access unit to the packer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackStatus {
    /// The unit was written into the open MAT frame.
    Packed,
    /// No major sync has been seen yet; the unit was dropped.
    AwaitingSync,
    /// The padding guard tripped; the packer reset and dropped the unit.
    Discontinuity,
}

/// Mutable packer state, owned by [`MatPacker`] and threaded through the
/// burst writer calls.
#[derive(Debug)]
pub struct PackerState {
    /// Failure level for validation findings; anything at or below this
    /// level fails the call instead of being logged.
    pub fail_level: log::Level,

    pub rate_class: u8,

    /// Predicted output timing, advanced by one unit's samples per call
    /// and re-anchored by every major sync that carries the field.
    pub output_timing: u16,
    pub output_timing_valid: bool,

    /// Frame-time field of the previous unit, `None` right after a reset.
    pub prev_frame_time: Option<u16>,

    /// Finalized byte size of the previous unit: payload plus any marker
    /// or start-code bytes that pending padding did not cover.
    pub prev_frame_size: usize,
    /// Running size accumulator for the unit currently being written.
    pub frame_size: usize,

    /// Zero-padding bytes owed to the bitrate schedule, drained before the
    /// next payload write.
    pub pending_padding: usize,

    /// Samples accumulated into the open MAT frame.
    pub frame_samples: usize,
    /// Cumulative sample drift against the nominal 24-units-per-frame
    /// assumption, carried across frames.
    pub samples_offset: i64,

    pub synced: bool,
    pub warned_padding: bool,
}

impl Default for PackerState {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            rate_class: 0,
            output_timing: 0,
            output_timing_valid: false,
            prev_frame_time: None,
            prev_frame_size: 0,
            frame_size: 0,
            pending_padding: 0,
            frame_samples: 0,
            samples_offset: 0,
            synced: false,
            warned_padding: false,
        }
    }
}

/// Packs a stream of TrueHD access units into fixed-size MAT frames.
///
/// Feed one access unit per [`push_unit`](Self::push_unit) call; completed
/// 61440-byte frames accumulate in an internal FIFO and are drained through
/// [`next_frame`](Self::next_frame) or the [`Iterator`] implementation.
///
/// The packer starts out unsynced and drops units until the first major
/// sync supplies a rate class. A seek or other discontinuity is detected
/// through the padding guard and handled with an internal [`reset`]
/// (losing at most the partially written frame, never queued ones).
///
/// [`reset`]: Self::reset
///
/// # Example
///
/// ```rust,no_run
/// use matpack::process::pack::MatPacker;
///
/// let mut packer = MatPacker::default();
///
/// # let access_units: Vec<Vec<u8>> = Vec::new();
/// for au in &access_units {
///     packer.push_unit(au)?;
///
///     while let Some(frame) = packer.next_frame() {
///         // hand the 61440-byte frame to the transport layer
///         assert_eq!(frame.as_ref().len(), 61440);
///     }
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct MatPacker {
    state: PackerState,
    writer: BurstWriter,
    queue: VecDeque<MatFrame>,
}

impl MatPacker {
    /// Processes one access unit, writing zero or more completed MAT
    /// frames to the output queue.
    pub fn push_unit(&mut self, unit: &[u8]) -> Result<PackStatus> {
        if unit.len() < 4 {
            bail!(PackError::UnitTooShort(unit.len()));
        }

        match MajorSync::read(unit) {
            Ok(Some(ms)) => {
                self.state.rate_class = ms.rate_class;

                if let Some(read) = ms.output_timing {
                    if self.state.output_timing_valid && read != self.state.output_timing {
                        log_or_err!(
                            self.state,
                            Warn,
                            anyhow!(PackError::OutputTimingMismatch {
                                read,
                                expected: self.state.output_timing,
                            })
                        );
                    }
                    self.state.output_timing = read;
                    self.state.output_timing_valid = true;
                }

                if !self.state.synced {
                    trace!("major sync found, rate_class = {}", ms.rate_class);
                    self.state.synced = true;
                }
            }
            Ok(None) => {}
            Err(e) => debug!("skipping malformed major sync: {e}"),
        }

        if !self.state.synced {
            return Ok(PackStatus::AwaitingSync);
        }

        // keep the predicted timeline monotonic between major syncs
        let samples = samples_per_unit(self.state.rate_class);
        self.state.output_timing = self.state.output_timing.wrapping_add(samples as u16);

        let frame_time = u16::from_be_bytes([unit[2], unit[3]]);
        if let Some(prev) = self.state.prev_frame_time {
            let delta = frame_time.wrapping_sub(prev);
            let padding = padding_for_gap(delta, self.state.rate_class, self.state.prev_frame_size);
            self.state.pending_padding += padding;

            if self.state.pending_padding > MAX_PENDING_PADDING {
                warn!(
                    "{}",
                    PackError::PaddingOverflow {
                        pending: self.state.pending_padding,
                        max: MAX_PENDING_PADDING,
                    }
                );
                self.reset();
                return Ok(PackStatus::Discontinuity);
            }

            if padding > MAT_FRAME_SIZE && !self.state.warned_padding {
                warn!("Unusual gap between access units: {padding} padding bytes owed");
                self.state.warned_padding = true;
            }
        }

        self.state.prev_frame_time = Some(frame_time);

        if !self.writer.is_open() {
            self.writer.start_frame(&mut self.state);
        }

        while self.state.pending_padding > 0 {
            let pending = self.state.pending_padding;
            if self
                .writer
                .append(&mut self.state, Chunk::Padding(pending))
                .is_some()
            {
                self.flush_frame();
                self.writer.start_frame(&mut self.state);
            }
        }

        // the unit's samples belong to the frame its payload starts in
        self.state.frame_samples += samples;

        let mut chunk = Chunk::Payload(unit);
        while let Some(rest) = self.writer.append(&mut self.state, chunk) {
            self.flush_frame();
            self.writer.start_frame(&mut self.state);
            chunk = rest;
        }

        self.state.prev_frame_size = self.state.frame_size;
        self.state.frame_size = 0;

        Ok(PackStatus::Packed)
    }

    /// Aborts the current stream position and waits for the next major
    /// sync. Safe between any two [`push_unit`](Self::push_unit) calls.
    ///
    /// Discards a partially written frame; completed frames stay queued.
    pub fn reset(&mut self) {
        self.state = PackerState {
            fail_level: self.state.fail_level,
            ..Default::default()
        };
        self.writer.discard();
    }

    /// Pops the oldest completed MAT frame, if any.
    pub fn next_frame(&mut self) -> Option<MatFrame> {
        self.queue.pop_front()
    }

    /// Number of completed frames awaiting [`next_frame`](Self::next_frame).
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Cumulative sample drift against the nominal 24 units per frame.
    pub fn samples_offset(&self) -> i64 {
        self.state.samples_offset
    }

    /// Sets the failure level for validation findings.
    ///
    /// - `log::Level::Error`: only fail on Error level messages (default)
    /// - `log::Level::Warn`: fail on Warning level and above (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.state.fail_level = level;
    }

    fn flush_frame(&mut self) {
        let frame = self.writer.take_frame();

        let nominal = UNITS_PER_MAT_FRAME * samples_per_unit(self.state.rate_class);
        if self.state.frame_samples != nominal {
            self.state.samples_offset += self.state.frame_samples as i64 - nominal as i64;
            trace!(
                "MAT frame carries {} samples, drift now {}",
                self.state.frame_samples, self.state.samples_offset
            );
        }
        self.state.frame_samples = 0;

        self.queue.push_back(frame);
    }
}

impl Iterator for MatPacker {
    type Item = MatFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}

#[cfg(test)]
use crate::structs::burst::{MAT_END_CODE, MAT_MIDDLE_CODE, MAT_START_CODE};
#[cfg(test)]
use crate::structs::sync::{synthetic_major_sync, synthetic_unit};

#[test]
fn fills_one_frame_at_nominal_rate() -> Result<()> {
    let mut packer = MatPacker::default();

    // rate class 0: 40 samples per unit, 2560 bytes of spacing
    assert_eq!(
        packer.push_unit(&synthetic_major_sync(0, Some(0), 0, 2500))?,
        PackStatus::Packed
    );

    for i in 1..24u16 {
        assert_eq!(
            packer.push_unit(&synthetic_unit(i * 40, 2500))?,
            PackStatus::Packed
        );
        assert_eq!(packer.queued(), 0);
    }

    // 24 units account for 23 spacings plus one finalized size; the frame
    // completes while the 25th unit's padding drains
    assert_eq!(
        packer.push_unit(&synthetic_unit(24 * 40, 2500))?,
        PackStatus::Packed
    );
    assert_eq!(packer.queued(), 1);
    assert_eq!(packer.samples_offset(), 0);

    let frame = packer.next_frame().unwrap();
    let data = frame.as_ref();
    assert_eq!(data.len(), MAT_FRAME_SIZE);
    assert_eq!(&data[..8], &[0u8; 8]);
    assert_eq!(&data[8..28], &MAT_START_CODE);
    assert_eq!(&data[30708..30720], &MAT_MIDDLE_CODE);
    assert_eq!(&data[61416..], &MAT_END_CODE);
    Ok(())
}

#[test]
fn frames_repeat_across_the_stream() -> Result<()> {
    let mut packer = MatPacker::default();

    packer.push_unit(&synthetic_major_sync(0, Some(0), 0, 2500))?;
    for i in 1..49u16 {
        packer.push_unit(&synthetic_unit(i * 40, 2500))?;
    }
    assert_eq!(packer.queued(), 2);

    for frame in packer.by_ref().take(2) {
        let data = frame.as_ref();
        assert_eq!(&data[8..28], &MAT_START_CODE);
        assert_eq!(&data[30708..30720], &MAT_MIDDLE_CODE);
        assert_eq!(&data[61416..], &MAT_END_CODE);
    }
    assert_eq!(packer.queued(), 0);
    Ok(())
}

#[test]
fn unit_before_sync_is_dropped() -> Result<()> {
    let mut packer = MatPacker::default();

    assert_eq!(
        packer.push_unit(&synthetic_unit(0, 10))?,
        PackStatus::AwaitingSync
    );
    assert_eq!(packer.queued(), 0);
    assert!(!packer.writer.is_open());
    Ok(())
}

#[test]
fn discontinuity_resets_but_keeps_queued_frames() -> Result<()> {
    let mut packer = MatPacker::default();

    packer.push_unit(&synthetic_major_sync(0, Some(0), 0, 2500))?;
    for i in 1..49u16 {
        packer.push_unit(&synthetic_unit(i * 40, 2500))?;
    }
    assert_eq!(packer.queued(), 2);
    assert!(packer.writer.is_open());

    // a sharp regression reads as a huge forward jump in wrapped
    // arithmetic and blows past the padding guard
    let regressed = 1920u16.wrapping_sub(30000);
    let status = packer.push_unit(&synthetic_unit(regressed, 2500))?;
    assert_eq!(status, PackStatus::Discontinuity);

    assert_eq!(packer.queued(), 2);
    assert!(!packer.writer.is_open());

    // unsynced until the next major sync arrives
    assert_eq!(
        packer.push_unit(&synthetic_unit(100, 2500))?,
        PackStatus::AwaitingSync
    );
    assert_eq!(
        packer.push_unit(&synthetic_major_sync(0, Some(0), 0, 2500))?,
        PackStatus::Packed
    );
    Ok(())
}

#[test]
fn reset_matches_fresh_instance() -> Result<()> {
    let mut stream = vec![synthetic_major_sync(0, Some(0), 0, 2500)];
    for i in 1..30u16 {
        stream.push(synthetic_unit(i * 40, 2500));
    }

    let mut reused = MatPacker::default();
    for au in &stream {
        reused.push_unit(au)?;
    }
    reused.reset();
    let flushed_before = reused.queued();
    assert_eq!(flushed_before, 1);

    let mut fresh = MatPacker::default();
    for au in &stream {
        reused.push_unit(au)?;
        fresh.push_unit(au)?;
    }
    assert_eq!(reused.queued() - flushed_before, fresh.queued());

    for _ in 0..flushed_before {
        reused.next_frame();
    }
    while let Some(expected) = fresh.next_frame() {
        let actual = reused.next_frame().expect("same frame count");
        assert_eq!(actual.as_ref(), expected.as_ref());
    }
    assert_eq!(reused.queued(), 0);
    Ok(())
}

#[test]
fn output_timing_mismatch_warns_and_adopts() -> Result<()> {
    let mut packer = MatPacker::default();

    packer.push_unit(&synthetic_major_sync(0, Some(0), 0, 2500))?;
    packer.push_unit(&synthetic_unit(40, 2500))?;

    // prediction is 80 after two units; a disagreeing sync only warns and
    // the observed value re-anchors the timeline
    packer.push_unit(&synthetic_major_sync(0, Some(100), 80, 2500))?;
    packer.push_unit(&synthetic_unit(120, 2500))?;
    assert_eq!(
        packer.push_unit(&synthetic_major_sync(0, Some(180), 160, 2500))?,
        PackStatus::Packed
    );
    Ok(())
}

#[test]
fn output_timing_mismatch_fails_in_strict_mode() -> Result<()> {
    let mut packer = MatPacker::default();
    packer.set_fail_level(log::Level::Warn);

    packer.push_unit(&synthetic_major_sync(0, Some(0), 0, 2500))?;
    packer.push_unit(&synthetic_unit(40, 2500))?;

    assert!(
        packer
            .push_unit(&synthetic_major_sync(0, Some(100), 80, 2500))
            .is_err()
    );
    Ok(())
}

#[test]
fn oversized_units_accumulate_negative_drift() -> Result<()> {
    let mut packer = MatPacker::default();

    // 5000-byte units only 40 ticks apart: the frame fills with far fewer
    // than 24 units' worth of samples
    packer.push_unit(&synthetic_major_sync(0, Some(0), 0, 5000))?;
    for i in 1..14u16 {
        packer.push_unit(&synthetic_unit(i * 40, 5000))?;
    }

    assert!(packer.queued() >= 1);
    assert!(packer.samples_offset() < 0);
    Ok(())
}

#[test]
fn tiny_unit_is_rejected() {
    let mut packer = MatPacker::default();
    assert!(packer.push_unit(&[0u8; 3]).is_err());
}
