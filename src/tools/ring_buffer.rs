//! Ring buffer for LZ type chain tables
use num_traits::PrimInt;

/// Fixed size array addressed by absolute position modulo its length.
/// The match finder keeps its two 64K distance chains in these, so an
/// entry is silently recycled once the window moves 64K past it.
pub struct RingBuffer<T: PrimInt> {
    buf: Vec<T>,
    n: usize
}

impl <T: PrimInt> RingBuffer<T> {
    pub fn create(fill: T,n: usize) -> Self {
        Self {
            buf: vec![fill;n],
            n
        }
    }
    /// get value at absolute position
    pub fn get_abs(&self,abs: usize) -> T {
        self.buf[abs % self.n]
    }
    /// set value at absolute position
    pub fn set_abs(&mut self,abs: usize,val: T) {
        self.buf[abs % self.n] = val;
    }
    /// restore every slot to `fill`, used when chains must not cross a boundary
    pub fn reset(&mut self,fill: T) {
        for slot in self.buf.iter_mut() {
            *slot = fill;
        }
    }
}

#[test]
fn wrapping() {
    let mut ring: RingBuffer<u16> = RingBuffer::create(0,4);
    ring.set_abs(5,7);
    assert_eq!(ring.get_abs(1),7);
    assert_eq!(ring.get_abs(9),7);
    assert_eq!(ring.get_abs(2),0);
}

#[test]
fn resetting() {
    let mut ring: RingBuffer<u16> = RingBuffer::create(1,4);
    ring.set_abs(0,7);
    ring.reset(0);
    for i in 0..4 {
        assert_eq!(ring.get_abs(i),0);
    }
}
