use core::ops::Range;

/// Fixed capacity circular byte buffer.
///
/// Bytes are pushed to the back and popped from the front. The buffer never grows, pushing
/// reports how many bytes fit.
pub struct RingBuf {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
}

impl RingBuf {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes that can be pushed before the buffer is full.
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Returns the index in the underlying buffer for a given logical element index + addend.
    #[inline]
    fn wrap_add(&self, idx: usize, addend: usize) -> usize {
        let logical_index = idx + addend;
        debug_assert!(logical_index < 2 * self.capacity());
        if logical_index >= self.capacity() {
            logical_index - self.capacity()
        } else {
            logical_index
        }
    }

    /// Physical ranges of the first `len` occupied bytes, in logical order.
    fn slice_ranges(&self, len: usize) -> (Range<usize>, Range<usize>) {
        if len == 0 {
            return (0..0, 0..0);
        }

        let head_len = self.capacity() - self.head;

        if head_len >= len {
            (self.head..self.head + len, 0..0)
        } else {
            // can't underflow because of the if condition
            (self.head..self.capacity(), 0..len - head_len)
        }
    }

    /// Physical ranges of the first `len` spare bytes, in logical order.
    fn spare_slice_ranges(&self, len: usize) -> (Range<usize>, Range<usize>) {
        if len == 0 {
            return (0..0, 0..0);
        }

        let tail = self.wrap_add(self.head, self.len);
        let tail_len = self.capacity() - tail;

        if tail_len >= len {
            (tail..tail + len, 0..0)
        } else {
            (tail..self.capacity(), 0..len - tail_len)
        }
    }

    /// Pop up to `dst.len()` bytes from the front into `dst`.
    pub fn pop_into(&mut self, dst: &mut [u8]) -> usize {
        let count = dst.len().min(self.len);
        let (a, b) = self.slice_ranges(count);

        let (dst_a, dst_b) = dst[..count].split_at_mut(a.len());
        dst_a.copy_from_slice(&self.buf[a]);
        dst_b.copy_from_slice(&self.buf[b]);

        self.len -= count;
        self.head = if self.len == 0 {
            0
        } else {
            self.wrap_add(self.head, count)
        };

        count
    }

    /// Push up to `src.len()` bytes to the back.
    pub fn push_from(&mut self, src: &[u8]) -> usize {
        let count = src.len().min(self.free());
        let (a, b) = self.spare_slice_ranges(count);

        let (src_a, src_b) = src[..count].split_at(a.len());
        self.buf[a].copy_from_slice(src_a);
        self.buf[b].copy_from_slice(src_b);

        self.len += count;

        count
    }
}
