//! Data structures representing format components.
//!
//! Contains structured representations of the bitstream elements the
//! packetizer touches: major sync headers and the MAT burst frame layout.

pub mod burst;
pub mod sync;
