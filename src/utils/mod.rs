pub mod bitstream_io;
pub mod errors;
pub mod timing;
