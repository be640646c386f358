//! LZ4 Compression with Optimal Parsing
//!
//! This produces byte streams conformant to the LZ4 frame format v1.5.x,
//! readable by any LZ4 decoder.  Both the modern frame (magic `04 22 4D 18`)
//! and the legacy frame (magic `02 21 4C 18`) are supported.
//!
//! At the higher compression levels the token sequence is chosen by a
//! backward dynamic program that minimizes the number of compressed bytes,
//! rather than greedily taking the longest match at each position.  Lower
//! levels trade ratio for speed by bounding the match chain walk.
//!
//! There is no public decoder; LZ4 output is meant for the reference
//! decoders.  A minimal decoder lives with the tests as a self check.

use std::io::{Cursor,Read,Write,BufWriter};
use crate::tools::match_finder::{MatchFinder,Match,MIN_MATCH,BLOCK_END_NO_MATCH,BLOCK_END_LITERALS,
    MAX_DISTANCE,MAX_SAME_LETTER,SHORT_CHAINS_GREEDY};
use crate::DYNERR;

const BUFFER_SIZE: usize = 64 * 1024;
/// the only block size id we emit (7 = 4 MB), the header checksum assumes it
const MAX_BLOCK_SIZE_ID: u8 = 7;
const MAX_BLOCK_SIZE: usize = 4 * 1024 * 1024;
/// the legacy format has a fixed 8 MB block size
const MAX_BLOCK_SIZE_LEGACY: usize = 8 * 1024 * 1024;
/// at most this much of a dictionary seeds the window
const MAX_DICTIONARY: usize = 65536;
const MAGIC: [u8;4] = [0x04,0x22,0x4d,0x18];
const MAGIC_LEGACY: [u8;4] = [0x02,0x21,0x4c,0x18];
/// version 01, no checksums
const FRAME_FLAGS: u8 = 1 << 6;
/// xxhash of the flag and block descriptor bytes, precomputed for this exact pair
const HEADER_CHECKSUM: u8 = 0xdf;

/// Options controlling compression
#[derive(Clone)]
pub struct Options {
    /// compression level: 0 stores blocks verbatim, 1-3 search greedily,
    /// 4-6 add lazy evaluation, 7-9 parse optimally with growing chain budgets
    pub level: usize,
    /// how far back matches may reach, 1 to 65535
    pub window: usize,
    /// emit the legacy frame format
    pub legacy: bool,
    /// bytes to seed the first block's window, only the last 64K are used
    pub dictionary: Option<Vec<u8>>
}

pub const STD_OPTIONS: Options = Options {
    level: 9,
    window: MAX_DISTANCE,
    legacy: false,
    dictionary: None
};

/// Walk backward through one block's matches and shorten each to the length
/// that minimizes the compressed byte count from that position to the end
/// of the block.  Positions losing their match become literals.
fn estimate_costs(matches: &mut [Match]) {
    let block_end = matches.len();
    // cost[i] = fewest compressed bytes covering i..block_end
    let mut cost: Vec<u32> = vec![0;block_end];
    let mut pos_last_match = block_end;
    // the last 5 bytes are always literals, start just ahead of them
    for i in (0..=block_end - (1 + BLOCK_END_LITERALS)).rev() {
        // if coded as a literal; runs of literals need an extra length
        // byte every 255 beyond the first 14
        let num_literals = pos_last_match - i;
        let mut min_cost = cost[i + 1] + 1;
        if num_literals >= 15 && (num_literals - 15) % 255 == 0 {
            min_cost += 1;
        }
        let mut best_length: u32 = 1;
        let mut candidate = matches[i];
        // the match must leave the literal tail inside the block
        if candidate.is_match() && i + candidate.length as usize + BLOCK_END_LITERALS > block_end {
            candidate.length = (block_end - (i + BLOCK_END_LITERALS)) as u32;
        }
        for length in MIN_MATCH..=candidate.length as usize {
            // token plus two offset bytes
            let mut current_cost = cost[i + length] + 1 + 2;
            // very long matches need extra bytes to encode their length
            if length >= 19 {
                current_cost += 1 + (length as u32 - 19) / 255;
            }
            // ties go to the longer match: same byte count, but a long
            // literal run ahead of us may be spared its extra length byte
            if current_cost <= min_cost {
                min_cost = current_cost;
                best_length = length as u32;
            }
            // very long self-referencing matches would make this loop crawl,
            // assume the longest is the best and leave
            if candidate.distance == 1 && candidate.length >= MAX_SAME_LETTER {
                best_length = candidate.length;
                min_cost = cost[i + candidate.length as usize] + 1 + 2 + 1 + (candidate.length - 19) / 255;
                break;
            }
        }
        if best_length >= MIN_MATCH as u32 {
            pos_last_match = i;
        }
        cost[i] = min_cost;
        matches[i].length = best_length;
        if best_length == 1 {
            matches[i].distance = 0;
        }
    }
}

/// Pack one block's literals and matches into LZ4 sequences.
/// `data` is the block itself; match positions index into it.
fn select_best_matches(matches: &[Match],data: &[u8]) -> Vec<u8> {
    let mut result = Vec::new();
    // current run of literals, `to` points one past the last
    let mut literals_from = 0;
    let mut literals_to = 0;
    let mut offset = 0;
    while offset < matches.len() {
        let is_match = matches[offset].is_match();
        let distance = matches[offset].distance;
        let match_length = match is_match {
            true => matches[offset].length as usize,
            false => 1
        };
        if !is_match {
            if literals_from == literals_to {
                literals_from = offset;
                literals_to = offset;
            }
            literals_to += 1;
        }
        offset += match_length;
        let last_token = offset == matches.len();
        if !is_match && !last_token {
            continue;
        }
        // token byte: literal count in the high nibble, match length in the
        // low nibble, 15 meaning "continued in extension bytes"
        let mut num_literals = literals_to - literals_from;
        let mut token: u8 = match num_literals < 15 {
            true => (num_literals as u8) << 4,
            false => 15 << 4
        };
        if is_match && !last_token {
            let coded_length = match_length - MIN_MATCH;
            token |= match coded_length < 15 {
                true => coded_length as u8,
                false => 15
            };
        }
        result.push(token);
        if num_literals >= 15 {
            num_literals -= 15;
            while num_literals >= 255 {
                result.push(255);
                num_literals -= 255;
            }
            // the remainder byte is emitted even when zero
            result.push(num_literals as u8);
        }
        if literals_from != literals_to {
            result.extend_from_slice(&data[literals_from..literals_to]);
            literals_from = 0;
            literals_to = 0;
        }
        // the final token carries only the closing literals
        if last_token {
            break;
        }
        result.push((distance & 0xff) as u8);
        result.push((distance >> 8) as u8);
        let mut coded_length = match_length - MIN_MATCH;
        if coded_length >= 15 {
            coded_length -= 15;
            while coded_length >= 255 {
                result.push(255);
                coded_length -= 255;
            }
            result.push(coded_length as u8);
        }
    }
    result
}

/// Main compression function.
/// `expanded_in` is an object with the `Read` trait, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with the `Write` trait, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// The input is consumed in 4 MB blocks (8 MB legacy); only the trailing 64K
/// window is retained between blocks.
/// Returns (in_size,out_size) or error.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read, W: Write {
    if opt.level > 9 || opt.window < 1 || opt.window > MAX_DISTANCE {
        return Err(Box::new(crate::Error::InvalidConfig));
    }
    let max_chain_length = match opt.level {
        // the window holds only 64K so this is effectively unlimited
        9 => 65536,
        level => level
    };
    let uncompressed = max_chain_length == 0;
    let mut writer = BufWriter::new(compressed_out);
    let mut bytes_out: u64 = 0;
    if opt.legacy {
        writer.write_all(&MAGIC_LEGACY)?;
        bytes_out += 4;
    } else {
        writer.write_all(&MAGIC)?;
        writer.write_all(&[FRAME_FLAGS,MAX_BLOCK_SIZE_ID << 4,HEADER_CHECKSUM])?;
        bytes_out += 7;
    }
    let mut finder = MatchFinder::create(max_chain_length,opt.window);
    // rolling window: data[0] sits at absolute source offset data_zero
    let mut data: Vec<u8> = Vec::new();
    let mut data_zero: usize = 0;
    let mut num_read: usize = 0;
    let mut prefix_len: usize = 0;
    let mut buffer = vec![0;BUFFER_SIZE];
    let mut next_block: usize = 0;
    let mut parse_dictionary = match &opt.dictionary {
        Some(dictionary) => !dictionary.is_empty(),
        None => false
    };
    let max_block_size = match opt.legacy {
        true => MAX_BLOCK_SIZE_LEGACY,
        false => MAX_BLOCK_SIZE
    };
    loop {
        if parse_dictionary {
            if let Some(dictionary) = &opt.dictionary {
                log::debug!("seeding window with {} dictionary bytes",dictionary.len());
                // exactly 64K goes in front of the first block, zero filled if short
                if dictionary.len() < MAX_DICTIONARY {
                    data.resize(MAX_DICTIONARY - dictionary.len(),0);
                    data.extend_from_slice(dictionary);
                } else {
                    data.extend_from_slice(&dictionary[dictionary.len() - MAX_DICTIONARY..]);
                }
                next_block = data.len();
                num_read = data.len();
                prefix_len = data.len();
            }
        }
        while num_read - next_block < max_block_size {
            let incoming = expanded_in.read(&mut buffer)?;
            if incoming == 0 {
                break;
            }
            num_read += incoming;
            data.extend_from_slice(&buffer[0..incoming]);
        }
        if next_block == num_read {
            break;
        }
        let last_block = next_block;
        next_block = std::cmp::min(last_block + max_block_size,num_read);
        let data_block = last_block - data_zero;
        let block_size = next_block - last_block;
        log::debug!("processing block of {} bytes",block_size);
        // the previous block's last positions skipped matching, so they are
        // missing from the chains; back up and hash them before this block,
        // but never past what the trimmed window still holds
        let lookback: usize = if opt.legacy {
            0
        } else if parse_dictionary {
            match &opt.dictionary {
                Some(dictionary) => std::cmp::min(dictionary.len(),MAX_DICTIONARY),
                None => 0
            }
        } else {
            std::cmp::min(data_zero,BLOCK_END_NO_MATCH).min(data_block)
        };
        parse_dictionary = false;
        let mut matches = vec![Match::none();block_size];
        if !uncompressed {
            finder.scan_block(&data,data_zero,last_block,next_block,lookback,&mut matches);
        }
        // cost estimation pays off beyond greedy chains and trivial blocks
        if matches.len() > BLOCK_END_NO_MATCH && max_chain_length > SHORT_CHAINS_GREEDY {
            estimate_costs(&mut matches);
        }
        // the legacy format has no stored-block escape, it always goes
        // through the emitter
        let block = match uncompressed && !opt.legacy {
            true => Vec::new(),
            false => select_best_matches(&matches,&data[data_block..data_block + block_size])
        };
        // did compression do harm?
        let use_compression = opt.legacy || (!uncompressed && block.len() < block_size);
        let num_bytes = match use_compression {
            true => block.len(),
            false => block_size
        };
        log::debug!("writing {} block, {} of {} bytes",
            match use_compression { true => "compressed", false => "stored" },num_bytes,block_size);
        let num_bytes_tagged = match use_compression {
            true => num_bytes as u32,
            false => num_bytes as u32 | 0x8000_0000
        };
        writer.write_all(&u32::to_le_bytes(num_bytes_tagged))?;
        bytes_out += 4;
        if use_compression {
            writer.write_all(&block)?;
        } else {
            writer.write_all(&data[data_block..data_block + num_bytes])?;
        }
        bytes_out += num_bytes as u64;
        if opt.legacy {
            // no matching across legacy blocks
            data_zero += data.len();
            data.clear();
            finder.reset();
        } else if next_block - data_zero > opt.window {
            // drop processed data the window can no longer reach
            let remove = next_block - data_zero - opt.window;
            data_zero += remove;
            data.drain(0..remove);
        }
    }
    if !opt.legacy {
        writer.write_all(&u32::to_le_bytes(0))?;
        bytes_out += 4;
    }
    writer.flush()?;
    Ok(((num_read - prefix_len) as u64,bytes_out))
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    compress(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}

// *************** TESTS *****************

/// Minimal LZ4 frame decoder used to verify round trips.  Match copies go
/// byte at a time since overlapping self-copies are legitimate.
#[cfg(test)]
fn expand_frame(compressed: &[u8],dictionary: Option<&[u8]>) -> Vec<u8> {
    let legacy = compressed[0..4] == MAGIC_LEGACY[..];
    if !legacy {
        assert_eq!(compressed[0..4],MAGIC[..]);
        assert_eq!(compressed[4..7],[FRAME_FLAGS,MAX_BLOCK_SIZE_ID << 4,HEADER_CHECKSUM]);
    }
    let mut ptr = match legacy {
        true => 4,
        false => 7
    };
    let prefix = match dictionary {
        Some(d) => d[d.len().saturating_sub(MAX_DICTIONARY)..].to_vec(),
        None => Vec::new()
    };
    let mut output = prefix.clone();
    while ptr < compressed.len() {
        let tag = u32::from_le_bytes([compressed[ptr],compressed[ptr + 1],compressed[ptr + 2],compressed[ptr + 3]]);
        ptr += 4;
        if tag == 0 && !legacy {
            break;
        }
        let num_bytes = (tag & 0x7fff_ffff) as usize;
        if tag & 0x8000_0000 != 0 {
            output.extend_from_slice(&compressed[ptr..ptr + num_bytes]);
            ptr += num_bytes;
            continue;
        }
        let block_end = ptr + num_bytes;
        while ptr < block_end {
            let token = compressed[ptr];
            ptr += 1;
            let mut num_literals = (token >> 4) as usize;
            if num_literals == 15 {
                loop {
                    let ext = compressed[ptr] as usize;
                    ptr += 1;
                    num_literals += ext;
                    if ext < 255 {
                        break;
                    }
                }
            }
            output.extend_from_slice(&compressed[ptr..ptr + num_literals]);
            ptr += num_literals;
            if ptr >= block_end {
                break;
            }
            let distance = compressed[ptr] as usize + ((compressed[ptr + 1] as usize) << 8);
            assert!(distance >= 1);
            ptr += 2;
            let mut match_length = (token & 15) as usize + MIN_MATCH;
            if token & 15 == 15 {
                loop {
                    let ext = compressed[ptr] as usize;
                    ptr += 1;
                    match_length += ext;
                    if ext < 255 {
                        break;
                    }
                }
            }
            for _k in 0..match_length {
                let byte = output[output.len() - distance];
                output.push(byte);
            }
        }
        assert_eq!(ptr,block_end);
    }
    output[prefix.len()..].to_vec()
}

#[cfg(test)]
fn pseudo_random(count: usize) -> Vec<u8> {
    let mut state: u64 = 0x2545f4914f6cdd1d;
    let mut ans = Vec::with_capacity(count);
    for _i in 0..count {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ans.push((state >> 56) as u8);
    }
    ans
}

#[test]
fn literal_run_extension_bytes() {
    // exactly 15 literals put 15 in the token and a zero remainder byte
    let data: Vec<u8> = (0u8..20).collect();
    let mut matches = vec![Match::none();20];
    matches[15] = Match {
        length: 4,
        distance: 3
    };
    let block = select_best_matches(&matches,&data);
    let mut expected = vec![0xf0,0x00];
    expected.extend_from_slice(&data[0..15]);
    expected.extend_from_slice(&[0x03,0x00]);
    expected.extend_from_slice(&[0x10,data[19]]);
    assert_eq!(block,expected);
}

#[test]
fn match_length_extension_bytes() {
    // a match of 274 codes as 15 in the token, a chained 255, and a zero
    // remainder byte
    let mut data = vec![b'y';274];
    data.extend_from_slice(&[1,2,3,4,5]);
    let mut matches = vec![Match::none();279];
    matches[0] = Match {
        length: 274,
        distance: 1
    };
    let block = select_best_matches(&matches,&data);
    let mut expected = vec![0x0f,0x01,0x00,0xff,0x00];
    expected.push(0x50);
    expected.extend_from_slice(&[1,2,3,4,5]);
    assert_eq!(block,expected);
}

#[test]
fn cost_estimation_trims_and_clears() {
    // a match reaching into the literal tail is shortened, one below the
    // minimum length is dropped and loses its distance
    let mut matches = vec![Match::none();20];
    matches[10] = Match {
        length: 8,
        distance: 2
    };
    matches[5] = Match {
        length: 3,
        distance: 9
    };
    estimate_costs(&mut matches);
    assert_eq!(matches[10].length,5);
    assert_eq!(matches[10].distance,2);
    assert_eq!(matches[5].length,1);
    assert_eq!(matches[5].distance,0);
}

#[test]
fn compression_works() {
    // a short block stays literal and does not pay for itself, so it is stored
    let test_data = "abcabcabcabc".as_bytes();
    let lz4_str = "04 22 4D 18 40 70 DF 0C 00 00 80 61 62 63 61 62 63 61 62 63 61 62 63 00 00 00 00";
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode(lz4_str.replace(" ","")).unwrap());

    // one literal, one match of 14, and the closing 5 literals
    let test_data = [b'a';20];
    let lz4_str = "04 22 4D 18 40 70 DF 0A 00 00 00 1A 61 01 00 50 61 61 61 61 61 00 00 00 00";
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode(lz4_str.replace(" ","")).unwrap());
}

#[test]
fn greedy_parse_keeps_the_literal_tail() {
    // the greedy levels skip the cost estimator, the emitted frame must
    // nevertheless end each block with 5 literals
    let test_data = [b'a';20];
    let lz4_str = "04 22 4D 18 40 70 DF 0A 00 00 00 1A 61 01 00 50 61 61 61 61 61 00 00 00 00";
    let mut opt = STD_OPTIONS;
    opt.level = 1;
    let compressed = compress_slice(&test_data,&opt).expect("compression failed");
    assert_eq!(compressed,hex::decode(lz4_str.replace(" ","")).unwrap());
}

#[test]
fn empty_input() {
    let compressed = compress_slice(&[],&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("04224D184070DF00000000").unwrap());
    assert_eq!(expand_frame(&compressed,None),Vec::<u8>::new());

    let mut opt = STD_OPTIONS;
    opt.legacy = true;
    let compressed = compress_slice(&[],&opt).expect("compression failed");
    assert_eq!(compressed,hex::decode("02214C18").unwrap());
}

#[test]
fn invertibility_all_levels() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".repeat(20);
    for level in 0..=9 {
        let mut opt = STD_OPTIONS;
        opt.level = level;
        let compressed = compress_slice(test_data.as_bytes(),&opt).expect("compression failed");
        assert_eq!(expand_frame(&compressed,None),test_data.as_bytes(),"level {}",level);
    }
}

#[test]
fn long_run_compresses_hard() {
    let test_data = vec![0u8;100000];
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    // the format needs a length extension byte per 255 matched bytes, so a
    // few hundred bytes is as small as a 100K run can get
    assert!(compressed.len() < 600,"got {} bytes",compressed.len());
    assert_eq!(expand_frame(&compressed,None),test_data);
}

#[test]
fn incompressible_block_is_stored() {
    let test_data = pseudo_random(256 * 1024);
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    // tag of the first (only) block has the stored bit set
    assert_eq!(compressed[10] & 0x80,0x80);
    let tag = u32::from_le_bytes([compressed[7],compressed[8],compressed[9],compressed[10]]);
    assert_eq!(tag & 0x7fff_ffff,256 * 1024);
    assert_eq!(compressed[11..11 + 256 * 1024],test_data[..]);
    assert_eq!(expand_frame(&compressed,None),test_data);
}

#[test]
fn legacy_format() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".repeat(20);
    let mut opt = STD_OPTIONS;
    opt.legacy = true;
    let compressed = compress_slice(test_data.as_bytes(),&opt).expect("compression failed");
    assert_eq!(compressed[0..4],MAGIC_LEGACY[..]);
    assert_eq!(expand_frame(&compressed,None),test_data.as_bytes());

    // legacy blocks are always tokenized, even at level 0
    opt.level = 0;
    let compressed = compress_slice(test_data.as_bytes(),&opt).expect("compression failed");
    assert_eq!(expand_frame(&compressed,None),test_data.as_bytes());
    assert!(compressed.len() > test_data.len());
}

#[test]
fn window_override() {
    let test_data = "all work and no play makes jack a dull boy. ".repeat(50);
    let mut opt = STD_OPTIONS;
    opt.window = 32;
    let compressed = compress_slice(test_data.as_bytes(),&opt).expect("compression failed");
    assert_eq!(expand_frame(&compressed,None),test_data.as_bytes());

    opt.window = 0;
    assert!(compress_slice(test_data.as_bytes(),&opt).is_err());
}

#[test]
fn tiny_window_spans_blocks() {
    // with a window smaller than the usual lookback, the trim after the
    // first block leaves fewer bytes behind the boundary than the scan
    // would normally back up over
    let test_data = vec![b'x';5 * 1024 * 1024];
    let mut opt = STD_OPTIONS;
    opt.level = 1;
    opt.window = 5;
    let compressed = compress_slice(&test_data,&opt).expect("compression failed");
    assert_eq!(expand_frame(&compressed,None),test_data);
}

#[test]
fn dictionary_seeds_the_window() {
    let phrase: Vec<u8> = (0..64).collect();
    let mut opt = STD_OPTIONS;
    opt.dictionary = Some(phrase.clone());
    let compressed = compress_slice(&phrase,&opt).expect("compression failed");
    let baseline = compress_slice(&phrase,&STD_OPTIONS).expect("compression failed");
    assert!(compressed.len() < baseline.len());
    assert_eq!(expand_frame(&compressed,Some(&phrase)),phrase);
}

#[test]
fn blocks_share_their_window() {
    // 5 MB of a repeating phrase spans two blocks; the second block may
    // reach back into the first
    let test_data: Vec<u8> = "weather report: partly cloudy, chance of meatballs. "
        .as_bytes().iter().cycle().take(5 * 1024 * 1024).cloned().collect();
    let mut opt = STD_OPTIONS;
    opt.level = 1;
    let compressed = compress_slice(&test_data,&opt).expect("compression failed");
    assert!(compressed.len() < test_data.len() / 10);
    assert_eq!(expand_frame(&compressed,None),test_data);
}

#[test]
fn invalid_levels_are_rejected() {
    let mut opt = STD_OPTIONS;
    opt.level = 10;
    match compress_slice(&[0;32],&opt) {
        Err(e) => match e.downcast_ref::<crate::Error>() {
            Some(crate::Error::InvalidConfig) => {},
            _ => panic!("wrong error kind")
        },
        Ok(_) => panic!("expected an error")
    }
}

#[test]
fn self_referencing_run_expands() {
    // a run copied with distance 1 overlaps itself; decoders copy byte at a
    // time so this is legitimate, and the encoder leans on it for RLE
    let mut test_data = vec![b'x';20000];
    test_data.extend_from_slice("the end".as_bytes());
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    assert_eq!(expand_frame(&compressed,None),test_data);
}
