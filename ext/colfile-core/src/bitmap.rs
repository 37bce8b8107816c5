//! Bit-packed validity masks, least significant bit first.

/// One bit per row: set means valid, unset means null
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
    len: usize,
}

impl Bitmap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(len: usize) -> Self {
        Self {
            bits: Vec::with_capacity(len.div_ceil(8)),
            len: 0,
        }
    }

    /// A bitmap of `len` bits, all set to `value`
    pub fn filled(len: usize, value: bool) -> Self {
        let fill = if value { 0xff } else { 0 };
        let mut bitmap = Self {
            bits: vec![fill; len.div_ceil(8)],
            len,
        };
        bitmap.clear_tail();
        bitmap
    }

    /// Wrap packed bytes; returns `None` if `bytes` is too short for `len` bits
    pub fn from_packed(bytes: Vec<u8>, len: usize) -> Option<Self> {
        if bytes.len() != len.div_ceil(8) {
            return None;
        }
        let mut bitmap = Self { bits: bytes, len };
        bitmap.clear_tail();
        Some(bitmap)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len);
        self.bits[idx / 8] & (1 << (idx % 8)) != 0
    }

    #[inline]
    pub fn set(&mut self, idx: usize, value: bool) {
        debug_assert!(idx < self.len);
        if value {
            self.bits[idx / 8] |= 1 << (idx % 8);
        } else {
            self.bits[idx / 8] &= !(1 << (idx % 8));
        }
    }

    pub fn push(&mut self, value: bool) {
        if self.len % 8 == 0 {
            self.bits.push(0);
        }
        self.len += 1;
        self.set(self.len - 1, value);
    }

    /// Append `len` bits of `other` starting at `offset`
    pub fn extend_from(&mut self, other: &Bitmap, offset: usize, len: usize) {
        if self.len % 8 == 0 && offset % 8 == 0 {
            let start = offset / 8;
            let end = (offset + len).div_ceil(8);
            self.bits.extend_from_slice(&other.bits[start..end]);
            self.len += len;
            self.clear_tail();
            return;
        }
        for idx in offset..offset + len {
            self.push(other.get(idx));
        }
    }

    /// Copy of bits `[offset, offset + len)`
    pub fn slice(&self, offset: usize, len: usize) -> Bitmap {
        let mut out = Bitmap::with_capacity(len);
        out.extend_from(self, offset, len);
        out
    }

    /// Number of unset bits
    pub fn count_unset(&self) -> usize {
        let set: usize = self.bits.iter().map(|b| b.count_ones() as usize).sum();
        self.len - set
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |idx| self.get(idx))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Bits past `len` in the last byte are always zero so that equality and
    /// counting only see live bits.
    fn clear_tail(&mut self) {
        let rem = self.len % 8;
        if rem != 0 {
            if let Some(last) = self.bits.last_mut() {
                *last &= (1u8 << rem) - 1;
            }
        }
    }
}

impl FromIterator<bool> for Bitmap {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut bitmap = Bitmap::with_capacity(iter.size_hint().0);
        for value in iter {
            bitmap.push(value);
        }
        bitmap
    }
}
