//! Major sync detection and parsing.
//!
//! ## Sync Pattern
//!
//! **Major Sync** (0xF8726FBA): periodically repeated access units carrying
//! stream configuration ahead of the audio payload.
//!
//! The packetizer only needs two facts from a major sync: the rate class
//! (which fixes the samples-per-unit and the constant-bitrate spacing) and,
//! when the first substream opens with a restart header, the 16-bit
//! `output_timing` anchor.

use anyhow::{Result, bail};

use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::SyncError;

/// Major sync pattern for FBA (Dolby) format streams.
///
/// 32-bit sync word (0xF8726FBA) at bytes 4..8 of a major sync access unit.
pub const MAJOR_SYNC_FBA: u32 = 0xF8_72_6F_BA;

/// Minimum byte length of an access unit that can hold a major sync header.
pub const MIN_MAJOR_SYNC_LEN: usize = 32;

/// Stream configuration extracted from a major sync access unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MajorSync {
    /// 4-bit rate class selecting sample rate and unit spacing.
    pub rate_class: u8,

    /// Output timing anchor from the first substream's restart header,
    /// when present.
    pub output_timing: Option<u16>,
}

impl MajorSync {
    /// Reads the major sync fields from an access unit.
    ///
    /// Returns `Ok(None)` when the unit does not carry the sync pattern
    /// (the common case between major syncs). Fails when the pattern is
    /// present but the header is truncated or malformed.
    pub fn read(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < 8 || u32::from_be_bytes([data[4], data[5], data[6], data[7]]) != MAJOR_SYNC_FBA
        {
            return Ok(None);
        }

        if data.len() < MIN_MAJOR_SYNC_LEN {
            bail!(SyncError::TooShort(data.len()));
        }

        let header_len = Self::header_len(data);
        if header_len > data.len() {
            bail!(SyncError::HeaderTooLong {
                header: header_len,
                len: data.len(),
            });
        }

        let reader = &mut BsIoSliceReader::from_slice(&data[4..]);

        reader.skip_n(32)?;
        let rate_class: u8 = reader.get_n(4)?;

        // channel assignment, reserved, signature and flag fields
        reader.skip_n(85)?;
        let substreams: u8 = reader.get_n(4)?;

        let pos = reader.position()?;
        reader.seek(((header_len - 4) as u64 * 8) as i64 - pos as i64)?;

        let mut extra_words = 0u32;
        for _ in 0..substreams {
            let extra_substream_word = reader.get()?;
            reader.skip_n(15)?;
            if extra_substream_word {
                extra_words += 1;
                reader.skip_n(16)?;
            }
        }

        log::trace!(
            "major sync: rate_class={rate_class}, substreams={substreams}, extra_words={extra_words}"
        );

        // Only the first substream is examined for output timing; a restart
        // header living in a later substream is not picked up here.
        let mut output_timing = None;
        if reader.get()? && reader.get()? {
            reader.skip_n(14)?;
            output_timing = Some(reader.get_n(16)?);
        }

        Ok(Some(Self {
            rate_class,
            output_timing,
        }))
    }

    /// Byte length of the major sync header, counted from the start of the
    /// access unit: 28 bytes, plus the optional extension block signalled
    /// by bit 0 of byte 29 with its 4-bit size in the high nibble of
    /// byte 30.
    fn header_len(data: &[u8]) -> usize {
        if data[29] & 0x01 != 0 {
            28 + 2 + 2 * (data[30] >> 4) as usize
        } else {
            28
        }
    }
}

#[cfg(test)]
pub(crate) fn synthetic_major_sync(
    rate_class: u8,
    output_timing: Option<u16>,
    frame_time: u16,
    total_len: usize,
) -> Vec<u8> {
    assert!(total_len >= 34);
    let mut au = vec![0u8; total_len];

    // nibble + 12-bit length in 16-bit words
    let words = (total_len / 2) as u16 & 0xFFF;
    au[0..2].copy_from_slice(&(0xC000 | words).to_be_bytes());
    au[2..4].copy_from_slice(&frame_time.to_be_bytes());
    au[4..8].copy_from_slice(&MAJOR_SYNC_FBA.to_be_bytes());

    // rate class nibble, then 85 zero bits, then substream count = 1
    au[8] = rate_class << 4;
    au[19] = 0b0000_1000;

    // header ends at byte 28; one 16-bit directory entry without the
    // extra word follows, leaving byte 29 bit 0 (extension flag) clear
    au[28] = 0x00;
    au[29] = 0x00;

    match output_timing {
        Some(timing) => {
            // block header + restart header + 14-bit restart sync 0x31EA
            au[30] = 0xF1;
            au[31] = 0xEA;
            au[32..34].copy_from_slice(&timing.to_be_bytes());
        }
        None => au[30] = 0x00,
    }

    au
}

#[cfg(test)]
pub(crate) fn synthetic_unit(frame_time: u16, total_len: usize) -> Vec<u8> {
    let mut au = vec![0u8; total_len];
    if total_len >= 4 {
        let words = (total_len / 2) as u16 & 0xFFF;
        au[0..2].copy_from_slice(&(0xC000 | words).to_be_bytes());
        au[2..4].copy_from_slice(&frame_time.to_be_bytes());
    }
    au
}

#[test]
fn read_major_sync_with_timing() -> Result<()> {
    let au = synthetic_major_sync(0, Some(0x1234), 0, 2500);
    let ms = MajorSync::read(&au)?.expect("sync pattern present");

    assert_eq!(ms.rate_class, 0);
    assert_eq!(ms.output_timing, Some(0x1234));
    Ok(())
}

#[test]
fn read_major_sync_without_timing() -> Result<()> {
    let au = synthetic_major_sync(2, None, 40, 640);
    let ms = MajorSync::read(&au)?.expect("sync pattern present");

    assert_eq!(ms.rate_class, 2);
    assert_eq!(ms.output_timing, None);
    Ok(())
}

#[test]
fn non_sync_unit_is_not_an_error() -> Result<()> {
    assert_eq!(MajorSync::read(&synthetic_unit(100, 2500))?, None);
    assert_eq!(MajorSync::read(&[0u8; 6])?, None);
    Ok(())
}

#[test]
fn truncated_major_sync_fails() {
    let mut au = synthetic_major_sync(0, Some(0), 0, 64);
    au.truncate(20);
    assert!(MajorSync::read(&au).is_err());
}

#[test]
fn extension_block_extends_header() -> Result<()> {
    let mut au = synthetic_major_sync(1, None, 0, 128);

    // extension flag set, extension_size = 2: header grows to 34 bytes,
    // shifting the directory and the first substream segment
    au[29] = 0x01;
    au[30] = 0x20;
    au[34] = 0x00;
    au[35] = 0x00;
    au[36] = 0xF1;
    au[37] = 0xEA;
    au[38..40].copy_from_slice(&0x00A0u16.to_be_bytes());

    let ms = MajorSync::read(&au)?.expect("sync pattern present");
    assert_eq!(ms.rate_class, 1);
    assert_eq!(ms.output_timing, Some(0x00A0));
    Ok(())
}
