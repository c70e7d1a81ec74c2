//! EWAH encoder and decoder
//!
//! `EwahWriter` builds a canonical stream (all-zero and all-one words always
//! become fills). `EwahReader` walks a stream chunk by chunk without
//! expanding it and is shared by `decode` and the set operations.

use crate::error::{Result, StoreError};

use super::bitset::{words_for, BitSet};
use super::{LITERAL_COUNT_MAX, RUN_LENGTH_MAX};

const FILL_BIT: u64 = 1;
const RUN_SHIFT: u32 = 1;
const RUN_MASK: u64 = RUN_LENGTH_MAX;
const LITERAL_SHIFT: u32 = 33;

/// Encode a bitset as an EWAH word stream
pub fn encode(set: &BitSet) -> Vec<u64> {
    let mut writer = EwahWriter::new();
    for &word in set.words() {
        writer.push_literal(word);
    }
    writer.finish()
}

/// Decode a word stream holding exactly `len` bits
pub fn decode(stream: &[u64], len: usize) -> Result<BitSet> {
    let expected = words_for(len);
    let mut words = Vec::with_capacity(expected);
    let mut reader = EwahReader::new(stream);

    while let Some(chunk) = reader.next_chunk()? {
        match chunk {
            Chunk::Fill { bit, words: run } => {
                let run = run as usize;
                if words.len() + run > expected {
                    return Err(overrun(expected));
                }
                let fill = if bit { u64::MAX } else { 0 };
                words.resize(words.len() + run, fill);
            }
            Chunk::Literal(word) => {
                if words.len() + 1 > expected {
                    return Err(overrun(expected));
                }
                words.push(word);
            }
        }
    }

    if words.len() != expected {
        return Err(StoreError::Corruption(format!(
            "ewah stream decodes to {} words, expected {}",
            words.len(),
            expected
        )));
    }

    let tail = len % 64;
    if tail != 0 && words[expected - 1] >> tail != 0 {
        return Err(StoreError::Corruption(
            "ewah stream sets bits past the bitset length".to_string(),
        ));
    }

    Ok(BitSet::from_words(words, len))
}

/// Upper bound on the stream length for a bitset of `len` bits
pub fn max_encoded_words(len: usize) -> usize {
    let words = words_for(len);
    words + words / LITERAL_COUNT_MAX as usize + 1
}

fn overrun(expected: usize) -> StoreError {
    StoreError::Corruption(format!(
        "ewah stream decodes past the expected {} words",
        expected
    ))
}

// =============================================================================
// Writer
// =============================================================================

/// Incremental builder of a canonical EWAH stream
#[derive(Debug, Default)]
pub struct EwahWriter {
    out: Vec<u64>,
    /// Index of the marker currently accepting runs/literals
    marker: Option<usize>,
}

impl EwahWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `count` words that are all `bit`
    pub fn push_fill(&mut self, bit: bool, mut count: u64) {
        while count > 0 {
            let index = match self.marker {
                Some(index)
                    if literal_count(self.out[index]) == 0
                        && (run_length(self.out[index]) == 0
                            || fill_bit(self.out[index]) == bit)
                        && run_length(self.out[index]) < RUN_LENGTH_MAX =>
                {
                    index
                }
                _ => self.start_marker(),
            };
            let marker = self.out[index];
            let take = count.min(RUN_LENGTH_MAX - run_length(marker));
            self.out[index] = make_marker(bit, run_length(marker) + take, 0);
            count -= take;
        }
    }

    /// Append one word; all-zero and all-one words become fills
    pub fn push_literal(&mut self, word: u64) {
        match word {
            0 => self.push_fill(false, 1),
            u64::MAX => self.push_fill(true, 1),
            _ => {
                let index = match self.marker {
                    Some(index) if literal_count(self.out[index]) < LITERAL_COUNT_MAX => index,
                    _ => self.start_marker(),
                };
                let marker = self.out[index];
                self.out[index] = make_marker(
                    fill_bit(marker),
                    run_length(marker),
                    literal_count(marker) + 1,
                );
                self.out.push(word);
            }
        }
    }

    pub fn finish(self) -> Vec<u64> {
        self.out
    }

    fn start_marker(&mut self) -> usize {
        self.out.push(0);
        let index = self.out.len() - 1;
        self.marker = Some(index);
        index
    }
}

// =============================================================================
// Reader
// =============================================================================

/// One step of a stream: a run of identical words or a single literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    Fill { bit: bool, words: u64 },
    Literal(u64),
}

/// Chunk-at-a-time cursor over a word stream
#[derive(Debug)]
pub struct EwahReader<'a> {
    stream: &'a [u64],
    position: usize,
    run_left: u64,
    run_bit: bool,
    literals_left: u64,
}

impl<'a> EwahReader<'a> {
    pub fn new(stream: &'a [u64]) -> Self {
        Self {
            stream,
            position: 0,
            run_left: 0,
            run_bit: false,
            literals_left: 0,
        }
    }

    /// Next chunk, or `None` at the end of the stream
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        loop {
            if self.run_left > 0 {
                let words = self.run_left;
                self.run_left = 0;
                return Ok(Some(Chunk::Fill {
                    bit: self.run_bit,
                    words,
                }));
            }
            if self.literals_left > 0 {
                self.literals_left -= 1;
                let word = self.stream[self.position];
                self.position += 1;
                return Ok(Some(Chunk::Literal(word)));
            }
            if self.position >= self.stream.len() {
                return Ok(None);
            }

            let marker = self.stream[self.position];
            self.position += 1;
            let literals = literal_count(marker);
            let remaining = (self.stream.len() - self.position) as u64;
            if literals > remaining {
                return Err(StoreError::Corruption(format!(
                    "ewah marker at word {} claims {} literals, {} words remain",
                    self.position - 1,
                    literals,
                    remaining
                )));
            }
            self.run_bit = fill_bit(marker);
            self.run_left = run_length(marker);
            self.literals_left = literals;
        }
    }
}

// =============================================================================
// Marker helpers
// =============================================================================

fn make_marker(bit: bool, run: u64, literals: u64) -> u64 {
    debug_assert!(run <= RUN_LENGTH_MAX && literals <= LITERAL_COUNT_MAX);
    (bit as u64) | (run << RUN_SHIFT) | (literals << LITERAL_SHIFT)
}

fn fill_bit(marker: u64) -> bool {
    marker & FILL_BIT != 0
}

fn run_length(marker: u64) -> u64 {
    (marker >> RUN_SHIFT) & RUN_MASK
}

fn literal_count(marker: u64) -> u64 {
    marker >> LITERAL_SHIFT
}
