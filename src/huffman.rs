//! Canonical Huffman Compression
//!
//! The stream is self-describing.  Because the canonical codes are fully
//! determined by their lengths, the header only has to carry a census of
//! code lengths plus the symbols in canonical order:
//!
//! * 4 bytes: unpacked size, little endian, top 3 bits hold the wasted bit count
//! * 1 byte: number of distinct symbols
//! * 1 byte: maximum code length in bits (this is the length-0 census slot,
//!   repurposed since no code has length zero)
//! * `maxCodeLen` bytes: how many symbols are coded with 1,2,... bits
//! * N bytes: the symbols, in ascending (length, symbol) order
//! * payload bits, MSB first, the trailing byte padded with 1-bits
//!
//! There is no end-of-stream symbol; the decoder stops after producing
//! exactly the unpacked size.  The wasted bit count is informational.

use std::io::{Cursor,Read,Write};
use crate::tools::bit_stream::{BitWriter,BitReader};
use crate::tools::canonical_huff::{self,CanonicalCode,MAX_CODE_BIT_LENGTH,MAX_SYMBOLS};
use crate::DYNERR;

/// the unpacked size must fit in 29 bits, the top 3 carry the wasted bit count
const MAX_UNPACKED_SIZE: usize = (1 << 29) - 1;

/// Options controlling the stream layout
#[derive(Clone)]
pub struct Options {
    /// emit the 4 byte prefix with unpacked size and wasted bits
    pub block_header: bool,
    /// emit the code length census and symbol tables
    pub table_header: bool
}

pub const STD_OPTIONS: Options = Options {
    block_header: true,
    table_header: true
};

/// Main compression function.
/// `expanded_in` is an object with the `Read` trait, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with the `Write` trait, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// The input is buffered in full since the frequency table needs a complete pass.
/// Returns (in_size,out_size) or error.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read, W: Write {
    let mut phrase = Vec::new();
    expanded_in.read_to_end(&mut phrase)?;
    if phrase.len() > MAX_UNPACKED_SIZE {
        return Err(Box::new(crate::Error::FileTooLarge));
    }
    let mut frequency = [0;MAX_SYMBOLS];
    for c in &phrase {
        frequency[*c as usize] += 1;
    }
    let lengths = canonical_huff::code_lengths(&frequency)?;
    let code = CanonicalCode::from_lengths(&lengths);
    let num_symbols = code.symbols().len();
    if num_symbols > u8::MAX as usize {
        // 256 distinct symbols cannot be stated in the 1 byte table length
        return Err(Box::new(crate::Error::TableOverflow));
    }
    let mut output = Vec::new();
    if opt.block_header {
        // wasted bits are patched into the top of byte 3 once known
        output.extend_from_slice(&u32::to_le_bytes(phrase.len() as u32));
    }
    if opt.table_header {
        output.push(num_symbols as u8);
        output.push(code.max_code_len() as u8);
        for k in 1..=code.max_code_len() {
            // counts fit a byte because the total is at most 255 here
            output.push(code.counts()[k] as u8);
        }
        output.extend_from_slice(code.symbols());
    }
    let mut writer = BitWriter::new();
    for c in &phrase {
        let (bits,len) = code.code_of(*c);
        writer.put_code(len as usize,bits);
    }
    log::debug!("payload is {} bits covering {} symbols",writer.len(),phrase.len());
    let (payload,wasted) = writer.finish();
    output.extend_from_slice(&payload);
    if opt.block_header {
        output[3] |= wasted << 5;
    }
    compressed_out.write_all(&output)?;
    Ok((phrase.len() as u64,output.len() as u64))
}

/// Main decompression function.
/// `compressed_in` is an object with the `Read` trait, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `expanded_out` is an object with the `Write` trait, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// The stream must carry both headers, i.e. it must have been produced with
/// `STD_OPTIONS`; headerless streams are not self-describing.
/// Returns (in_size,out_size) or error.
pub fn expand<R,W>(compressed_in: &mut R, expanded_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read, W: Write {
    if !opt.block_header || !opt.table_header {
        return Err(Box::new(crate::Error::InvalidConfig));
    }
    let mut data = Vec::new();
    compressed_in.read_to_end(&mut data)?;
    if data.len() < 6 {
        log::error!("stream of {} bytes is too short for the header",data.len());
        return Err(Box::new(crate::Error::Malformed));
    }
    let unpacked_size = (u32::from_le_bytes([data[0],data[1],data[2],data[3]]) & 0x1fff_ffff) as usize;
    // the wasted bit count (data[3] >> 5) is not needed, termination is by symbol count
    let num_symbols = data[4] as usize;
    let max_code_len = data[5] as usize;
    if max_code_len > MAX_CODE_BIT_LENGTH {
        log::error!("advertised code length {} exceeds the maximum {}",max_code_len,MAX_CODE_BIT_LENGTH);
        return Err(Box::new(crate::Error::Malformed));
    }
    let table_end = 6 + max_code_len + num_symbols;
    if data.len() < table_end {
        log::error!("stream of {} bytes is too short for its tables",data.len());
        return Err(Box::new(crate::Error::Malformed));
    }
    // keep the max-length slot in front so the census is indexed by code size
    let length_table = &data[5..6 + max_code_len];
    let symbols = &data[6 + max_code_len..table_end];
    if data[6..6 + max_code_len].iter().map(|c| *c as usize).sum::<usize>() != num_symbols {
        log::error!("census does not sum to the {} symbols in the table",num_symbols);
        return Err(Box::new(crate::Error::Malformed));
    }
    log::debug!("unpacking {} symbols from an alphabet of {}",unpacked_size,num_symbols);
    let mut reader = BitReader::create(&data[table_end..]);
    let mut output: Vec<u8> = Vec::with_capacity(unpacked_size);
    let mut code: u32 = 0;
    let mut code_size: usize = 0;
    let mut first_code_with_num_bits: u32 = 0;
    let mut start_index_for_num_bits: usize = 0;
    while output.len() < unpacked_size {
        let bit = match reader.get_bit() {
            Some(bit) => bit,
            None => {
                log::error!("payload exhausted after {} of {} symbols",output.len(),unpacked_size);
                return Err(Box::new(crate::Error::Malformed));
            }
        };
        code = (code << 1) | bit as u32;
        code_size += 1;
        if code_size > max_code_len {
            log::error!("no code matched within {} bits",max_code_len);
            return Err(Box::new(crate::Error::Malformed));
        }
        let num_codes = length_table[code_size] as u32;
        // a code is recognized once it falls inside the census range for its size
        if code >= first_code_with_num_bits && code - first_code_with_num_bits < num_codes {
            let idx = start_index_for_num_bits + (code - first_code_with_num_bits) as usize;
            log::trace!("  symbol {} from a {} bit code",symbols[idx],code_size);
            output.push(symbols[idx]);
            code = 0;
            code_size = 0;
            first_code_with_num_bits = 0;
            start_index_for_num_bits = 0;
        } else {
            first_code_with_num_bits = (first_code_with_num_bits + num_codes) << 1;
            start_index_for_num_bits += num_codes as usize;
        }
    }
    expanded_out.write_all(&output)?;
    Ok((data.len() as u64,output.len() as u64))
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    compress(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    expand(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}

// *************** TESTS *****************

#[test]
fn compression_works() {
    let test_data = [0x41];
    let huf_str = "01 00 00 E0 01 01 01 41 7F";
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode(huf_str.replace(" ","")).unwrap());

    let test_data = "abracadabra".as_bytes();
    let huf_str = "0B 00 00 20 05 03 01 00 04 61 62 63 64 72 4E AC 9D";
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode(huf_str.replace(" ","")).unwrap());
}

#[test]
fn empty_input() {
    let compressed = compress_slice(&[],&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,vec![0,0,0,0,0,0]);
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(expanded,Vec::<u8>::new());
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);

    // a wide binary alphabet, skewed so the code lengths spread out
    let mut test_data = Vec::new();
    for sym in 0u32..255 {
        for _i in 0..1 + sym {
            test_data.push(sym as u8);
        }
    }
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn full_alphabet_overflows_the_table() {
    // 256 distinct symbols cannot be stated in the 1 byte table length
    let test_data: Vec<u8> = (0u32..256).map(|sym| sym as u8).collect();
    match compress_slice(&test_data,&STD_OPTIONS) {
        Err(e) => match e.downcast_ref::<crate::Error>() {
            Some(crate::Error::TableOverflow) => {},
            _ => panic!("wrong error kind")
        },
        Ok(_) => panic!("expected an error")
    }
}

#[test]
fn payload_length_matches_frequencies() {
    let test_data = "she sells sea shells by the sea shore".as_bytes();
    let mut frequency = [0;MAX_SYMBOLS];
    for c in test_data {
        frequency[*c as usize] += 1;
    }
    let lengths = canonical_huff::code_lengths(&frequency).expect("tree failed");
    let code = CanonicalCode::from_lengths(&lengths);
    let expected_bits: usize = (0..MAX_SYMBOLS).map(|s| frequency[s] * lengths[s] as usize).sum();

    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let table_len = 6 + code.max_code_len() + code.symbols().len();
    let wasted = (compressed[3] >> 5) as usize;
    assert_eq!((compressed.len() - table_len) * 8 - wasted,expected_bits);
}

#[test]
fn header_options() {
    let test_data = "to be or not to be".as_bytes();
    let full = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let mut opt = STD_OPTIONS;
    opt.block_header = false;
    let headerless = compress_slice(test_data,&opt).expect("compression failed");
    assert_eq!(full.len(),headerless.len() + 4);
    assert_eq!(full[4..],headerless[..]);
    // a headerless stream is not self-describing
    match expand_slice(&headerless,&opt) {
        Err(e) => match e.downcast_ref::<crate::Error>() {
            Some(crate::Error::InvalidConfig) => {},
            _ => panic!("wrong error kind")
        },
        Ok(_) => panic!("expected an error")
    }
}

#[test]
fn decoder_stops_at_the_unpacked_size() {
    // termination is by symbol count, whatever follows the payload is ignored
    let test_data = "mercy mercy me".as_bytes();
    let mut compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    compressed.extend_from_slice(&[0xde,0xad,0xbe,0xef]);
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);
}

#[test]
fn wasted_bits_are_informational() {
    // the decoder never consults the wasted bit count, a wrong one is harmless
    let test_data = "mercy mercy me".as_bytes();
    let mut compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    compressed[3] ^= 0xe0;
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);
}

#[test]
fn malformed_streams_are_rejected() {
    let test_data = "a man a plan a canal panama".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");

    // truncated payload
    let truncated = &compressed[0..compressed.len() - 1];
    assert!(expand_slice(truncated,&STD_OPTIONS).is_err());

    // advertised code length beyond the supported maximum
    let mut corrupt = compressed.clone();
    corrupt[5] = 21;
    assert!(expand_slice(&corrupt,&STD_OPTIONS).is_err());

    // census no longer sums to the symbol count
    let mut corrupt = compressed.clone();
    corrupt[6] = corrupt[6].wrapping_add(1);
    assert!(expand_slice(&corrupt,&STD_OPTIONS).is_err());

    assert!(expand_slice(&[0,0],&STD_OPTIONS).is_err());
}
