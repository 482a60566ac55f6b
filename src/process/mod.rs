/// Access unit packing into MAT frames.
///
/// Provides the [`MatPacker`](pack::MatPacker) for reassembling TrueHD
/// access units into fixed-size [`MatFrame`](crate::structs::burst::MatFrame)
/// objects on the constant-bitrate schedule.
pub mod pack;
