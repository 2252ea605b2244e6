//! Coalitions: subsets of a membership set.
//!
//! A [`Coalition`] is a bitset over member indices. Sets of up to 64 members use a
//! single `u64` mask; larger sets use a word vector. Because members are ordered by id,
//! the bitset is a canonical, hashable key for the memoization cache.

use std::fmt;

const WORD_BITS: usize = u64::BITS as usize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Bits {
    Mask(u64),
    Wide(Box<[u64]>),
}

/// A subset of the members of one membership set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coalition {
    bits: Bits,
}

impl Coalition {
    /// The empty coalition over a set of `n` members.
    #[must_use]
    pub fn empty(n: usize) -> Self {
        let bits = if n <= WORD_BITS {
            Bits::Mask(0)
        } else {
            Bits::Wide(vec![0; n.div_ceil(WORD_BITS)].into_boxed_slice())
        };
        Self { bits }
    }

    /// The grand coalition of all `n` members.
    #[must_use]
    pub fn full(n: usize) -> Self {
        Self::from_indices(n, 0..n)
    }

    /// Builds a coalition of `n` possible members from member indices.
    #[must_use]
    pub fn from_indices<I>(n: usize, indices: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut coalition = Self::empty(n);
        for i in indices {
            coalition.insert(i);
        }
        coalition
    }

    /// Builds a coalition directly from a mask (sets of at most 64 members).
    #[must_use]
    pub const fn from_mask(mask: u64) -> Self {
        Self {
            bits: Bits::Mask(mask),
        }
    }

    /// The mask of a coalition over at most 64 members.
    #[must_use]
    pub fn mask(&self) -> Option<u64> {
        match &self.bits {
            Bits::Mask(mask) => Some(*mask),
            Bits::Wide(_) => None,
        }
    }

    /// Adds member `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is outside the coalition's universe.
    pub fn insert(&mut self, i: usize) {
        match &mut self.bits {
            Bits::Mask(mask) => {
                assert!(i < WORD_BITS, "member index {i} out of range");
                *mask |= 1 << i;
            }
            Bits::Wide(words) => words[i / WORD_BITS] |= 1 << (i % WORD_BITS),
        }
    }

    /// Removes member `i`.
    pub fn remove(&mut self, i: usize) {
        match &mut self.bits {
            Bits::Mask(mask) => {
                if i < WORD_BITS {
                    *mask &= !(1 << i);
                }
            }
            Bits::Wide(words) => {
                if let Some(word) = words.get_mut(i / WORD_BITS) {
                    *word &= !(1 << (i % WORD_BITS));
                }
            }
        }
    }

    /// Returns a copy with member `i` added.
    #[must_use]
    pub fn with(&self, i: usize) -> Self {
        let mut next = self.clone();
        next.insert(i);
        next
    }

    #[must_use]
    pub fn contains(&self, i: usize) -> bool {
        match &self.bits {
            Bits::Mask(mask) => i < WORD_BITS && mask & (1 << i) != 0,
            Bits::Wide(words) => words
                .get(i / WORD_BITS)
                .is_some_and(|word| word & (1 << (i % WORD_BITS)) != 0),
        }
    }

    /// Number of members in the coalition.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.bits {
            Bits::Mask(mask) => mask.count_ones() as usize,
            Bits::Wide(words) => words.iter().map(|w| w.count_ones() as usize).sum(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.bits {
            Bits::Mask(mask) => *mask == 0,
            Bits::Wide(words) => words.iter().all(|w| *w == 0),
        }
    }

    /// Member indices in ascending order.
    pub fn members(&self) -> impl Iterator<Item = usize> + '_ {
        let words: &[u64] = match &self.bits {
            Bits::Mask(mask) => std::slice::from_ref(mask),
            Bits::Wide(words) => words,
        };
        words.iter().enumerate().flat_map(|(w, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                (rest != 0).then(|| {
                    let bit = rest.trailing_zeros() as usize;
                    rest &= rest - 1;
                    w * WORD_BITS + bit
                })
            })
        })
    }

    /// Lowercase hex rendering of the bitset, most significant word first.
    ///
    /// This is the key under which coalition values are persisted.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.bits {
            Bits::Mask(mask) => format!("{mask:x}"),
            Bits::Wide(words) => {
                let mut key = String::new();
                for (i, word) in words.iter().rev().enumerate() {
                    if i == 0 {
                        key.push_str(&format!("{word:x}"));
                    } else {
                        key.push_str(&format!("{word:016x}"));
                    }
                }
                key
            }
        }
    }

    /// Parses a key produced by [`Coalition::key`] for a set of `n` members.
    ///
    /// Returns `None` if the key is malformed or names members outside the set.
    #[must_use]
    pub fn from_key(n: usize, key: &str) -> Option<Self> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let mut coalition = Self::empty(n);
        let digits = key.trim_start_matches('0');
        for (pos, c) in digits.chars().rev().enumerate() {
            let nibble = c.to_digit(16)?;
            for bit in 0..4 {
                if nibble & (1 << bit) != 0 {
                    let i = pos * 4 + bit;
                    if i >= n {
                        return None;
                    }
                    coalition.insert(i);
                }
            }
        }
        Some(coalition)
    }
}

impl fmt::Display for Coalition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, member) in self.members().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{member}")?;
        }
        f.write_str("}")
    }
}
