//! Module to find LZ4 matches with two-level hash chains.
//! This is used by the `lz4` module.
//!
//! The finder keeps a hash table of the most recent position of every
//! 4-byte prefix, plus two 64K rings of backward distances: one chained by
//! hash (fast to build, may contain collisions) and one chained by exact
//! equality of the first four bytes.  The hash chain exists only to build
//! the exact chain; match searching walks the exact chain.

use crate::tools::ring_buffer::RingBuffer;

/// each match must be at least this long
pub const MIN_MATCH: usize = 4;
/// no match may start closer than this to the end of a block
pub const BLOCK_END_NO_MATCH: usize = 12;
/// the last bytes of a block are always literals
pub const BLOCK_END_LITERALS: usize = 5;
/// matches must start within the most recent 64K
pub const MAX_DISTANCE: usize = 65535;
/// runs of one letter longer than this switch to the self-match shortcut
pub const MAX_SAME_LETTER: u32 = 19 + 255 * 256;
/// chains this short are searched greedily
pub const SHORT_CHAINS_GREEDY: usize = 3;
/// chains this short use lazy evaluation, longer ones parse optimally
pub const SHORT_CHAINS_LAZY: usize = 6;

const HASH_BITS: u32 = 20;
const HASH_SIZE: usize = 1 << HASH_BITS;
// multiplier borrowed from the usual linear congruential generators
const HASH_MULTIPLIER: u32 = 22695477;
const NO_LAST_HASH: u32 = 0x7fff_ffff;
const NO_PREVIOUS: u16 = 0;
const PREVIOUS_SIZE: usize = 1 << 16;

/// A match candidate for one source position
#[derive(Clone,Copy)]
pub struct Match {
    /// length of the match, lengths below `MIN_MATCH` mean a literal
    pub length: u32,
    /// how far back the match starts, 0 means no previous occurrence
    pub distance: u16
}

impl Match {
    pub fn none() -> Self {
        Self {
            length: 0,
            distance: 0
        }
    }
    /// true if long enough to tokenize
    pub fn is_match(&self) -> bool {
        self.length >= MIN_MATCH as u32
    }
}

fn four_at(data: &[u8],idx: usize) -> u32 {
    u32::from_le_bytes([data[idx],data[idx + 1],data[idx + 2],data[idx + 3]])
}

fn hash_of(four: u32) -> usize {
    (four.wrapping_mul(HASH_MULTIPLIER) >> (32 - HASH_BITS)) as usize & (HASH_SIZE - 1)
}

/// Structure to perform the match finding stage of compression.
/// Positions are absolute source offsets; the caller passes its window
/// buffer along with the absolute offset of the buffer's first byte, so
/// chains can survive from block to block.
pub struct MatchFinder {
    /// most recent absolute position of each hash
    last_hash: Vec<u32>,
    /// distance to the previous position sharing the hash, collisions included
    previous_hash: RingBuffer<u16>,
    /// distance to the previous position whose first four bytes match exactly
    previous_exact: RingBuffer<u16>,
    /// how many candidates to examine per position
    max_chain_length: usize,
    /// how far back a match may start
    max_distance: usize
}

impl MatchFinder {
    pub fn create(max_chain_length: usize,max_distance: usize) -> Self {
        Self {
            last_hash: vec![NO_LAST_HASH;HASH_SIZE],
            previous_hash: RingBuffer::create(NO_PREVIOUS,PREVIOUS_SIZE),
            previous_exact: RingBuffer::create(NO_PREVIOUS,PREVIOUS_SIZE),
            max_chain_length,
            max_distance
        }
    }
    /// forget all chains, used between legacy blocks which must not share a window
    pub fn reset(&mut self) {
        for slot in self.last_hash.iter_mut() {
            *slot = NO_LAST_HASH;
        }
        self.previous_hash.reset(NO_PREVIOUS);
        self.previous_exact.reset(NO_PREVIOUS);
    }
    /// Fill `matches` with the longest match found at every position of the
    /// block spanning absolute offsets `last_block..next_block`.  `data` holds
    /// the window, `data_zero` is the absolute offset of `data[0]`.  The scan
    /// starts `lookback` bytes before the block to prime the chains with
    /// positions the previous block skipped; nothing is emitted for those.
    /// Greedy and lazy gearing (short chains) skip positions inside found matches.
    pub fn scan_block(&mut self,data: &[u8],data_zero: usize,last_block: usize,next_block: usize,lookback: usize,matches: &mut [Match]) {
        let block_size = next_block - last_block;
        let data_block = last_block - data_zero;
        let is_greedy = self.max_chain_length <= SHORT_CHAINS_GREEDY;
        let is_lazy = !is_greedy && self.max_chain_length <= SHORT_CHAINS_LAZY;
        let mut skip_matches: u32 = 0;
        let mut lazy_evaluation = false;
        for i in -(lookback as i64)..block_size as i64 {
            // no matching near the end of the block
            if i + BLOCK_END_NO_MATCH as i64 > block_size as i64 {
                continue;
            }
            let pos = (last_block as i64 + i) as usize;
            let idx = (data_block as i64 + i) as usize;
            // a long run of one letter keeps its predecessor's match, shortened by one
            if i > 0 && data[idx] == data[idx - 1] {
                let prev = matches[(i - 1) as usize];
                if prev.distance == 1 && prev.length > MAX_SAME_LETTER {
                    matches[i as usize] = Match {
                        length: prev.length - 1,
                        distance: 1
                    };
                    continue;
                }
            }
            let four = four_at(data,idx);
            let hash = hash_of(four);
            let last = self.last_hash[hash];
            self.last_hash[hash] = pos as u32;
            if last == NO_LAST_HASH || pos - last as usize > self.max_distance {
                self.previous_hash.set_abs(pos,NO_PREVIOUS);
                self.previous_exact.set_abs(pos,NO_PREVIOUS);
                continue;
            }
            let mut distance = pos - last as usize;
            self.previous_hash.set_abs(pos,distance as u16);
            // skip over hash collisions so the exact chain links only
            // positions that really start with the same four bytes
            let mut last = last as usize;
            while distance != NO_PREVIOUS as usize {
                let cur_four = four_at(data,last - data_zero);
                if cur_four == four {
                    break;
                }
                // hopping onto an outdated chain shows up as a changed hash
                if hash_of(cur_four) != hash {
                    distance = NO_PREVIOUS as usize;
                    break;
                }
                let next = self.previous_hash.get_abs(last) as usize;
                distance += next;
                if distance > self.max_distance {
                    self.previous_hash.set_abs(last,NO_PREVIOUS);
                    distance = NO_PREVIOUS as usize;
                    break;
                }
                last -= next;
                if next == NO_PREVIOUS as usize || last < data_zero {
                    distance = NO_PREVIOUS as usize;
                    break;
                }
            }
            if distance == NO_PREVIOUS as usize {
                self.previous_exact.set_abs(pos,NO_PREVIOUS);
                continue;
            }
            self.previous_exact.set_abs(pos,distance as u16);
            // the lookback region only primes the chains
            if i < 0 {
                continue;
            }
            if skip_matches > 0 {
                skip_matches -= 1;
                if !lazy_evaluation {
                    continue;
                }
                lazy_evaluation = false;
            }
            let longest = self.find_longest_match(data,pos,data_zero,next_block - BLOCK_END_LITERALS);
            matches[i as usize] = longest;
            if longest.is_match() {
                log::trace!("position {} matches {} bytes at distance {}",pos,longest.length,longest.distance);
            }
            if longest.is_match() && (is_lazy || is_greedy) {
                lazy_evaluation = skip_matches == 0;
                skip_matches = longest.length;
            }
        }
    }
    /// Find the longest match for the position `pos` by walking the exact
    /// chain.  `begin` is the absolute offset of `data[0]`, matching stops
    /// at the absolute offset `end` so the block keeps its literal tail.
    /// Each candidate is checked backward in 4-byte steps over the span a
    /// longer match would have to cover, then scanned forward; candidates
    /// are only accepted when they beat the best length so far.
    pub fn find_longest_match(&self,data: &[u8],pos: usize,begin: usize,end: usize) -> Match {
        let mut result = Match {
            length: 1,
            distance: 0
        };
        let mut steps_left = self.max_chain_length;
        let current = pos - begin;
        let stop = current + end - pos;
        let mut distance = self.previous_exact.get_abs(pos) as usize;
        let mut total_distance = 0;
        while distance != NO_PREVIOUS as usize {
            total_distance += distance;
            if total_distance > self.max_distance {
                break;
            }
            // fetch the next link before examining this candidate
            distance = self.previous_exact.get_abs(pos - total_distance) as usize;
            if steps_left == 0 {
                break;
            }
            steps_left -= 1;
            // a longer match must extend at least one byte past the best so far
            let at_least = current + result.length as usize + 1;
            if at_least > stop {
                break;
            }
            // phase 1: everything between current and at_least must match, 4 bytes at a time
            // (the first four always match, courtesy of the exact chain)
            let mut compare = at_least as i64 - 4;
            let mut ok = true;
            while compare > current as i64 {
                if four_at(data,compare as usize) != four_at(data,compare as usize - total_distance) {
                    ok = false;
                    break;
                }
                compare -= 4;
            }
            if !ok {
                continue;
            }
            // phase 2: scan forward from the first new byte
            let mut compare = at_least;
            while compare + 4 <= stop && four_at(data,compare) == four_at(data,compare - total_distance) {
                compare += 4;
            }
            while compare < stop && data[compare] == data[compare - total_distance] {
                compare += 1;
            }
            result.distance = total_distance as u16;
            result.length = (compare - current) as u32;
        }
        result
    }
}

// *************** TESTS *****************

#[test]
fn finds_repeating_pattern() {
    let data = "abcabcabcabcabcabcab".as_bytes();
    let mut matches = vec![Match::none();data.len()];
    let mut finder = MatchFinder::create(65536,MAX_DISTANCE);
    finder.scan_block(data,0,0,data.len(),0,&mut matches);
    assert!(!matches[0].is_match());
    assert_eq!(matches[3].length,12);
    assert_eq!(matches[3].distance,3);
}

#[test]
fn self_match_shortcut_copies_predecessor() {
    // once a position inside a one-letter run holds a long enough distance-1
    // match, its successors inherit it shortened by one, with no fresh search
    let data = vec![b'x';20];
    let mut matches = vec![Match::none();data.len()];
    matches[0] = Match {
        length: MAX_SAME_LETTER + 10,
        distance: 1
    };
    let mut finder = MatchFinder::create(65536,MAX_DISTANCE);
    finder.scan_block(&data,0,0,data.len(),0,&mut matches);
    for i in 1..=8 {
        assert_eq!(matches[i].length,MAX_SAME_LETTER + 10 - i as u32);
        assert_eq!(matches[i].distance,1);
    }
}

#[test]
fn matches_reach_into_the_previous_block() {
    // distinct byte values guarantee the first copy has no internal matches
    let phrase: Vec<u8> = (0..49).collect();
    let n = phrase.len();
    let data = [phrase.as_slice(),phrase.as_slice()].concat();
    let mut finder = MatchFinder::create(65536,MAX_DISTANCE);
    let mut matches = vec![Match::none();n];
    finder.scan_block(&data,0,0,n,0,&mut matches);
    assert!(matches.iter().all(|m| !m.is_match()));
    let mut matches = vec![Match::none();n];
    finder.scan_block(&data,0,n,2 * n,BLOCK_END_NO_MATCH,&mut matches);
    assert_eq!(matches[0].distance as usize,n);
    assert_eq!(matches[0].length as usize,n - BLOCK_END_LITERALS);
}

#[test]
fn window_limits_the_search() {
    let phrase: Vec<u8> = (0..49).collect();
    let n = phrase.len();
    let data = [phrase.as_slice(),phrase.as_slice()].concat();
    // the second copy starts 49 bytes back, farther than this window allows
    let mut finder = MatchFinder::create(65536,16);
    let mut matches = vec![Match::none();2 * n];
    finder.scan_block(&data,0,0,2 * n,0,&mut matches);
    assert!(matches.iter().all(|m| !m.is_match()));
}

#[test]
fn chain_length_gates_the_search() {
    let data = "abcabcabcabcabcabcab".as_bytes();
    let mut matches = vec![Match::none();data.len()];
    let mut finder = MatchFinder::create(0,MAX_DISTANCE);
    // with no steps allowed, candidates are never examined
    finder.scan_block(data,0,0,data.len(),0,&mut matches);
    assert!(matches.iter().all(|m| !m.is_match()));
}
