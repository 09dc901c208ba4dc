//! Fixed-capacity bit-set.
//!
//! A [`Bitmap`] tracks which slots of a small, fixed-size identifier space are
//! in use. It has no interior locking: callers that share one across threads
//! keep it behind their own lock, so that a scan and the following mark happen
//! under the same critical section ([`Bitmap::acquire_first_zero`] and
//! [`Bitmap::acquire_zero_area`] do both in one call).

const WORD_BITS: usize = u64::BITS as usize;

/// Number of `u64` words needed to hold `bits` bits.
///
/// Meant for the const parameter of [`Bitmap`]:
///
/// ```
/// use common::bitmap::{Bitmap, words_for};
///
/// let map: Bitmap<{ words_for(128) }> = Bitmap::new(128);
/// assert_eq!(map.len(), 128);
/// ```
pub const fn words_for(bits: usize) -> usize {
    bits.div_ceil(WORD_BITS)
}

/// A bit-set of `len` bits backed by `N` words.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap<const N: usize> {
    words: [u64; N],
    len: usize,
}

impl<const N: usize> Bitmap<N> {
    /// Creates an all-clear bitmap holding `len` bits.
    ///
    /// # Panics
    ///
    /// Panics if `len` does not fit in `N` words.
    pub const fn new(len: usize) -> Self {
        assert!(len <= N * WORD_BITS, "bitmap length exceeds storage");
        Self {
            words: [0; N],
            len,
        }
    }

    /// Number of addressable bits.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn split(bit: usize) -> (usize, u64) {
        (bit / WORD_BITS, 1u64 << (bit % WORD_BITS))
    }

    /// Returns whether `bit` is set. Out-of-range bits read as clear.
    pub fn is_set(&self, bit: usize) -> bool {
        if bit >= self.len {
            return false;
        }
        let (word, mask) = Self::split(bit);
        self.words[word] & mask != 0
    }

    /// Sets `bit`, returning its previous value.
    ///
    /// Out-of-range bits are ignored and report `false`.
    pub fn set(&mut self, bit: usize) -> bool {
        if bit >= self.len {
            return false;
        }
        let (word, mask) = Self::split(bit);
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        was_set
    }

    /// Clears `bit`, returning its previous value.
    pub fn clear(&mut self, bit: usize) -> bool {
        if bit >= self.len {
            return false;
        }
        let (word, mask) = Self::split(bit);
        let was_set = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        was_set
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Index of the first clear bit, if any.
    pub fn find_first_zero(&self) -> Option<usize> {
        for (i, word) in self.words.iter().enumerate() {
            if *word != u64::MAX {
                let bit = i * WORD_BITS + word.trailing_ones() as usize;
                return (bit < self.len).then_some(bit);
            }
        }
        None
    }

    /// Start of the first run of `count` clear bits, if any.
    pub fn find_zero_area(&self, count: usize) -> Option<usize> {
        if count == 0 || count > self.len {
            return None;
        }

        let mut start = 0;
        let mut run = 0;
        for bit in 0..self.len {
            if self.is_set(bit) {
                run = 0;
                start = bit + 1;
            } else {
                run += 1;
                if run == count {
                    return Some(start);
                }
            }
        }
        None
    }

    /// Finds the first clear bit and sets it.
    pub fn acquire_first_zero(&mut self) -> Option<usize> {
        let bit = self.find_first_zero()?;
        self.set(bit);
        Some(bit)
    }

    /// Finds the first run of `count` clear bits and sets all of them.
    pub fn acquire_zero_area(&mut self, count: usize) -> Option<usize> {
        let start = self.find_zero_area(count)?;
        for bit in start..start + count {
            self.set(bit);
        }
        Some(start)
    }

    /// Returns whether every bit of `start..start + count` is clear and in range.
    pub fn is_area_clear(&self, start: usize, count: usize) -> bool {
        match start.checked_add(count) {
            Some(end) if end <= self.len => (start..end).all(|bit| !self.is_set(bit)),
            _ => false,
        }
    }

    /// Clears `start..start + count`.
    ///
    /// Returns `true` only if every bit in the range was set beforehand; a
    /// `false` result means part of the range was already free.
    pub fn release_area(&mut self, start: usize, count: usize) -> bool {
        let mut all_set = start.saturating_add(count) <= self.len;
        for bit in start..start.saturating_add(count).min(self.len) {
            all_set &= self.clear(bit);
        }
        all_set
    }
}

impl<const N: usize> core::fmt::Debug for Bitmap<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bitmap")
            .field("len", &self.len)
            .field("used", &self.count_ones())
            .finish()
    }
}
