pub mod ring_buffer;
pub mod bit_stream;
pub mod match_finder;
pub mod canonical_huff;
