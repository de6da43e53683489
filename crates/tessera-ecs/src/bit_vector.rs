//! Growable bit-set used as the component mask of entities and filters.

use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, BitOr};

const WORD_BITS: usize = 64;
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Set of small integers stored as 64-bit words. Grows upward, never shrinks.
#[derive(Debug, Clone, Default)]
pub struct BitVector {
    words: Vec<u64>,
}

impl BitVector {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Create a vector able to hold `bits` bits without growing.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            words: vec![0; bits.div_ceil(WORD_BITS)],
        }
    }

    #[inline]
    fn split(index: usize) -> (usize, u64) {
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }

    /// Adds a value to the set.
    #[inline]
    pub fn set(&mut self, index: usize) {
        let (word, bit) = Self::split(index);
        if word >= self.words.len() {
            let mut len = self.words.len().max(1);
            while len <= word {
                len *= 2;
            }
            self.words.resize(len, 0);
        }
        self.words[word] |= bit;
    }

    /// Removes a value from the set.
    #[inline]
    pub fn unset(&mut self, index: usize) {
        let (word, bit) = Self::split(index);
        if let Some(w) = self.words.get_mut(word) {
            *w &= !bit;
        }
    }

    /// Returns `true` if this set contains the specified integer.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        let (word, bit) = Self::split(index);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    /// Clears all bits, keeping the allocated words.
    #[inline]
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of bits held without growing.
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Every bit of `other` is also set in `self`.
    pub fn is_superset_of(&self, other: &BitVector) -> bool {
        other.words.iter().enumerate().all(|(i, &theirs)| {
            let ours = self.words.get(i).copied().unwrap_or(0);
            ours & theirs == theirs
        })
    }

    /// At least one bit is set in both.
    pub fn intersects(&self, other: &BitVector) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Set bits in ascending order.
    pub fn ones(&self) -> Ones<'_> {
        Ones {
            words: &self.words,
            word: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    /// Words up to and including the last non-zero one.
    fn significant(&self) -> &[u64] {
        let len = self
            .words
            .iter()
            .rposition(|&w| w != 0)
            .map_or(0, |i| i + 1);
        &self.words[..len]
    }

    /// FNV-1a fold over the significant words, independent of allocated length.
    pub fn hash_id(&self) -> u64 {
        self.significant().iter().fold(FNV_OFFSET, |hash, &word| {
            word.to_le_bytes()
                .iter()
                .fold(hash, |h, &byte| (h ^ byte as u64).wrapping_mul(FNV_PRIME))
        })
    }
}

impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for BitVector {}

impl Hash for BitVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_id());
    }
}

impl<'a> BitOr for &'a BitVector {
    type Output = BitVector;

    fn bitor(self, rhs: Self) -> BitVector {
        let (long, short) = if self.words.len() >= rhs.words.len() {
            (self, rhs)
        } else {
            (rhs, self)
        };
        let mut words = long.words.clone();
        for (w, s) in words.iter_mut().zip(short.words.iter()) {
            *w |= s;
        }
        BitVector { words }
    }
}

impl<'a> BitAnd for &'a BitVector {
    type Output = BitVector;

    fn bitand(self, rhs: Self) -> BitVector {
        BitVector {
            words: self
                .words
                .iter()
                .zip(rhs.words.iter())
                .map(|(a, b)| a & b)
                .collect(),
        }
    }
}

impl FromIterator<usize> for BitVector {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut bits = BitVector::new();
        for i in iter {
            bits.set(i);
        }
        bits
    }
}

/// Iterator over the set bits of a [`BitVector`].
pub struct Ones<'a> {
    words: &'a [u64],
    word: usize,
    current: u64,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word * WORD_BITS + bit);
            }
            self.word += 1;
            self.current = *self.words.get(self.word)?;
        }
    }
}
