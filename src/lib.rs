//! # LZ4Pack Library
//!
//! Compress binary assets with LZ4 or canonical Huffman coding
//! * `lz4` produces LZ4 frames (modern or legacy) using a hash-chain match
//!   finder with optimal parsing, readable by any conformant LZ4 decoder
//! * `huffman` produces a self-describing canonical Huffman stream and can
//!   read it back
//!
//! The compression/expansion functions are generics that operate on trait objects
//! with bounds `Read` or `Write`.  There are convenience functions for working
//! directly with buffers.
//!
//! ## File Example
//!
//! ```rs
//! use lz4pack::*;
//! let mut in_file = std::fs::File::open("some_input_path").expect("open failed");
//! let mut out_file = std::fs::File::create("some_output_path").expect("create failed");
//! let (in_size,out_size) = lz4::compress(&mut in_file,&mut out_file,&lz4::STD_OPTIONS)
//!     .expect("compression failed");
//! eprintln!("compressed {} into {}",in_size,out_size);
//! ```
//!
//! ## Buffer Example
//!
//! ```rs
//! use lz4pack::*;
//! let test_data = "This is the chaunt of the priests.  The chaunt of the priests of Mung.".as_bytes();
//! let compressed = huffman::compress_slice(test_data,&huffman::STD_OPTIONS).expect("compression failed");
//! let expanded = huffman::expand_slice(&compressed,&huffman::STD_OPTIONS).expect("expansion failed");
//! assert_eq!(test_data.to_vec(),expanded);
//! ```

mod tools;
pub mod lz4;
pub mod huffman;

type DYNERR = Box<dyn std::error::Error>;

/// Codec Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("invalid configuration")]
    InvalidConfig,
    #[error("huffman code exceeds maximum length")]
    CodeTooLong,
    #[error("malformed bitstream")]
    Malformed,
    #[error("file too large")]
    FileTooLarge,
    #[error("symbol table overflow")]
    TableOverflow
}
