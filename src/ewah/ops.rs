//! Set operations on compressed streams
//!
//! Both operands are consumed chunk by chunk. When one side holds an
//! absorbing fill (zeros for AND, ones for OR) the other side is skipped
//! over in bulk, so long runs never get expanded.

use crate::error::{Result, StoreError};

use super::bitset::words_for;
use super::codec::{Chunk, EwahReader, EwahWriter};

#[derive(Debug, Clone, Copy)]
enum Op {
    Or,
    And,
}

impl Op {
    fn word(self, a: u64, b: u64) -> u64 {
        match self {
            Op::Or => a | b,
            Op::And => a & b,
        }
    }

    /// Fill value that decides the result regardless of the other side
    fn absorbing(self) -> bool {
        matches!(self, Op::Or)
    }
}

/// Union of two encoded bitsets; the result has `max(a_len, b_len)` bits
pub fn union(a: &[u64], a_len: usize, b: &[u64], b_len: usize) -> Result<Vec<u64>> {
    combine(Op::Or, a, a_len, b, b_len)
}

/// Intersection of two encoded bitsets; the result has `max(a_len, b_len)` bits
pub fn intersection(a: &[u64], a_len: usize, b: &[u64], b_len: usize) -> Result<Vec<u64>> {
    combine(Op::And, a, a_len, b, b_len)
}

fn combine(op: Op, a: &[u64], a_len: usize, b: &[u64], b_len: usize) -> Result<Vec<u64>> {
    let total = words_for(a_len.max(b_len)) as u64;
    let mut left = Operand::new(a, words_for(a_len) as u64);
    let mut right = Operand::new(b, words_for(b_len) as u64);
    let mut writer = EwahWriter::new();
    let mut produced = 0u64;

    while produced < total {
        let step = match (left.peek()?, right.peek()?) {
            (Chunk::Fill { bit: x, words: n }, Chunk::Fill { bit: y, words: m }) => {
                let k = n.min(m).min(total - produced);
                writer.push_fill(op.word(fill(x), fill(y)) == u64::MAX, k);
                k
            }
            (Chunk::Fill { bit, words: n }, Chunk::Literal(word))
            | (Chunk::Literal(word), Chunk::Fill { bit, words: n }) => {
                if bit == op.absorbing() {
                    // The fill decides every word it covers.
                    let k = n.min(total - produced);
                    writer.push_fill(bit, k);
                    k
                } else {
                    writer.push_literal(op.word(fill(bit), word));
                    1
                }
            }
            (Chunk::Literal(x), Chunk::Literal(y)) => {
                writer.push_literal(op.word(x, y));
                1
            }
        };
        left.consume(step)?;
        right.consume(step)?;
        produced += step;
    }

    left.finish()?;
    right.finish()?;
    Ok(writer.finish())
}

fn fill(bit: bool) -> u64 {
    if bit {
        u64::MAX
    } else {
        0
    }
}

/// A reader that pads with zero fill past its own length
struct Operand<'a> {
    reader: EwahReader<'a>,
    words: u64,
    consumed: u64,
    current: Option<Chunk>,
}

impl<'a> Operand<'a> {
    fn new(stream: &'a [u64], words: u64) -> Self {
        Self {
            reader: EwahReader::new(stream),
            words,
            consumed: 0,
            current: None,
        }
    }

    fn peek(&mut self) -> Result<Chunk> {
        if self.consumed >= self.words {
            return Ok(Chunk::Fill {
                bit: false,
                words: u64::MAX,
            });
        }
        if self.current.is_none() {
            self.current = self.reader.next_chunk()?;
            if self.current.is_none() {
                return Err(StoreError::Corruption(format!(
                    "ewah stream ends after {} of {} words",
                    self.consumed, self.words
                )));
            }
        }
        match self.current {
            Some(Chunk::Fill { bit, words }) => Ok(Chunk::Fill {
                bit,
                words: words.min(self.words - self.consumed),
            }),
            Some(chunk) => Ok(chunk),
            None => unreachable!("chunk loaded above"),
        }
    }

    /// Skip `count` words, crossing chunk boundaries as needed
    fn consume(&mut self, mut count: u64) -> Result<()> {
        while count > 0 {
            if self.consumed >= self.words {
                return Ok(());
            }
            self.peek()?;
            match self.current.take() {
                Some(Chunk::Fill { bit, words }) => {
                    let take = count.min(words);
                    if words > take {
                        self.current = Some(Chunk::Fill {
                            bit,
                            words: words - take,
                        });
                    }
                    self.consumed += take;
                    count -= take;
                }
                Some(Chunk::Literal(_)) => {
                    self.consumed += 1;
                    count -= 1;
                }
                None => unreachable!("peek loads a chunk"),
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if self.consumed > self.words {
            return Err(StoreError::Corruption(
                "ewah stream is longer than its bitset".to_string(),
            ));
        }
        if self.current.is_some() || self.reader.next_chunk()?.is_some() {
            return Err(StoreError::Corruption(
                "ewah stream has words past its bitset length".to_string(),
            ));
        }
        Ok(())
    }
}
