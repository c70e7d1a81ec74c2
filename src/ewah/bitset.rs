//! Uncompressed bitset
//!
//! The working form of every bitset before encoding. Bits past `len` in the
//! last word are always zero.

/// A fixed-length bitset backed by `u64` words
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// Create a bitset of `len` clear bits
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; words_for(len)],
            len,
        }
    }

    /// Create a bitset of `len` set bits
    pub fn full(len: usize) -> Self {
        let mut set = Self {
            words: vec![u64::MAX; words_for(len)],
            len,
        };
        set.clear_padding();
        set
    }

    /// Build from raw words, clearing any bits past `len`
    pub fn from_words(mut words: Vec<u64>, len: usize) -> Self {
        words.resize(words_for(len), 0);
        let mut set = Self { words, len };
        set.clear_padding();
        set
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn get(&self, bit: usize) -> bool {
        assert!(bit < self.len, "bit {} out of range {}", bit, self.len);
        self.words[bit / 64] & (1 << (bit % 64)) != 0
    }

    pub fn set(&mut self, bit: usize) {
        assert!(bit < self.len, "bit {} out of range {}", bit, self.len);
        self.words[bit / 64] |= 1 << (bit % 64);
    }

    pub fn clear(&mut self, bit: usize) {
        assert!(bit < self.len, "bit {} out of range {}", bit, self.len);
        self.words[bit / 64] &= !(1 << (bit % 64));
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// First clear bit at or after `from`
    pub fn first_clear_from(&self, from: usize) -> Option<usize> {
        if from >= self.len {
            return None;
        }
        let mut index = from / 64;
        // Treat bits below `from` in the first word as set.
        let mut word = self.words[index] | ((1u64 << (from % 64)) - 1);
        loop {
            if word != u64::MAX {
                let bit = index * 64 + (!word).trailing_zeros() as usize;
                return (bit < self.len).then_some(bit);
            }
            index += 1;
            if index >= self.words.len() {
                return None;
            }
            word = self.words[index];
        }
    }

    /// Iterate over the indices of set bits in ascending order
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(index * 64 + bit)
            })
        })
    }

    /// Bitwise OR; the result has the longer length
    pub fn or(&self, other: &BitSet) -> BitSet {
        let len = self.len.max(other.len);
        let words = (0..words_for(len))
            .map(|i| self.word_or_zero(i) | other.word_or_zero(i))
            .collect();
        BitSet { words, len }
    }

    /// Bitwise AND; the result has the longer length
    pub fn and(&self, other: &BitSet) -> BitSet {
        let len = self.len.max(other.len);
        let words = (0..words_for(len))
            .map(|i| self.word_or_zero(i) & other.word_or_zero(i))
            .collect();
        BitSet { words, len }
    }

    fn word_or_zero(&self, index: usize) -> u64 {
        self.words.get(index).copied().unwrap_or(0)
    }

    fn clear_padding(&mut self) {
        let tail = self.len % 64;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }
}

/// Words needed to hold `len` bits
pub(crate) fn words_for(len: usize) -> usize {
    len.div_ceil(64)
}
