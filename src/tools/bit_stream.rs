//! Module to read and write MSB-first bitstreams.
//! This is used by the `huffman` module for the payload coding.

use bit_vec::BitVec;

/// Accumulates bits MSB-first and hands back whole bytes at the end.
/// The trailing partial byte, if any, is padded with 1-bits, the same
/// padding the decoder is told to ignore via the wasted-bit count.
pub struct BitWriter {
    bits: BitVec
}

/// Walks a byte buffer bit by bit, MSB-first.  Running off the end is
/// reported rather than masked, the caller decides whether that is an error.
pub struct BitReader {
    bits: BitVec,
    ptr: usize
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            bits: BitVec::new()
        }
    }
    pub fn put_bit(&mut self,bit: u8) {
        self.bits.push(bit != 0);
    }
    /// output the `num_bits` least significant bits of `code`, MSB first
    pub fn put_code(&mut self,num_bits: usize,code: u32) {
        for i in (0..num_bits).rev() {
            self.bits.push(code & (1 << i) != 0);
        }
    }
    /// number of bits written so far
    pub fn len(&self) -> usize {
        self.bits.len()
    }
    /// Pad the trailing byte with 1-bits up to the next byte boundary and
    /// return the bytes along with the number of padding bits.  An already
    /// aligned stream gets no padding byte.
    pub fn finish(mut self) -> (Vec<u8>,u8) {
        let wasted = ((8 - self.bits.len() % 8) % 8) as u8;
        for _i in 0..wasted {
            self.bits.push(true);
        }
        (self.bits.to_bytes(),wasted)
    }
}

impl BitReader {
    pub fn create(dat: &[u8]) -> Self {
        Self {
            bits: BitVec::from_bytes(dat),
            ptr: 0
        }
    }
    /// get the next bit, `None` if the source ran out
    pub fn get_bit(&mut self) -> Option<u8> {
        match self.bits.get(self.ptr) {
            Some(bit) => {
                self.ptr += 1;
                Some(bit as u8)
            },
            None => None
        }
    }
}

// *************** TESTS *****************

#[test]
fn writer_pads_with_ones() {
    let mut writer = BitWriter::new();
    writer.put_code(3,0b010);
    let (bytes,wasted) = writer.finish();
    assert_eq!(bytes,vec![0b0101_1111]);
    assert_eq!(wasted,5);
}

#[test]
fn writer_aligned_stream_gets_no_padding() {
    let mut writer = BitWriter::new();
    writer.put_code(8,0xa5);
    let (bytes,wasted) = writer.finish();
    assert_eq!(bytes,vec![0xa5]);
    assert_eq!(wasted,0);

    let (bytes,wasted) = BitWriter::new().finish();
    assert_eq!(bytes,Vec::<u8>::new());
    assert_eq!(wasted,0);
}

#[test]
fn reader_is_msb_first() {
    let mut reader = BitReader::create(&[0b1100_0001]);
    let expected = [1,1,0,0,0,0,0,1];
    for i in 0..8 {
        assert_eq!(reader.get_bit(),Some(expected[i]));
    }
    assert_eq!(reader.get_bit(),None);
}

#[test]
fn round_trip() {
    let mut writer = BitWriter::new();
    writer.put_code(5,0b10110);
    writer.put_code(11,0b101_0101_0101);
    let (bytes,wasted) = writer.finish();
    assert_eq!(wasted,0);
    let mut reader = BitReader::create(&bytes);
    let mut code: u32 = 0;
    for _i in 0..5 {
        code = (code << 1) | reader.get_bit().unwrap() as u32;
    }
    assert_eq!(code,0b10110);
    code = 0;
    for _i in 0..11 {
        code = (code << 1) | reader.get_bit().unwrap() as u32;
    }
    assert_eq!(code,0b101_0101_0101);
}
