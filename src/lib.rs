#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Packetizer for Dolby TrueHD (MLP) access units into MAT (Metadata-enhanced
//! Audio Transmission) frames for constant-bitrate links.
//!
//! ### Frame Structure
//!
//! **Input**: Access units with a cyclic 16-bit frame-time field and
//! periodic major syncs carrying the rate class.
//! **Output**: Fixed 61440-byte MAT frames with start, middle and end codes
//! at fixed offsets and zero padding spread between access units.
//!
//! ### Bitrate Management
//!
//! The byte distance between consecutive access units on the link is the
//! wrapped frame-time delta scaled by the rate class. Marker bytes are
//! delivered out of that padding budget whenever any is owed, so the output
//! byte rate never drifts from the schedule.
//!
//! ## Quick Start
//!
//! 1. Feed access units to [`process::pack::MatPacker::push_unit`]
//! 2. Drain completed frames via [`process::pack::MatPacker::next_frame`]
//!    or the [`Iterator`] implementation

/// Processing functionality for access unit streams.
///
/// **Packing** ([`process::pack`]): Reassembles access units into
/// fixed-size MAT frames on the constant-bitrate schedule.
pub mod process;

/// Data structures representing MAT format components.
///
/// - **Burst Frames** ([`structs::burst`]): MAT frame layout and markers
/// - **Sync Patterns** ([`structs::sync`]): Major sync detection
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Timing** ([`utils::timing`]): Padding schedule arithmetic
pub mod utils;
