use std::collections::HashMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::{Rng, thread_rng};

/// Configuration errors reported when building a chain. A mid-generation
/// dead end is not an error; generation just stops early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The block size must be at least one.
    InvalidBlockSize(usize),
    /// The sample corpus contained no words.
    EmptyCorpus,
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::InvalidBlockSize(size) => write!(f, "invalid block size: {size}"),
            ChainError::EmptyCorpus => write!(f, "sample corpus contains no words"),
        }
    }
}

impl std::error::Error for ChainError {}

/// Word-level Markov chain of order `block_size`.
///
/// The sample is split into whitespace-delimited words; every
/// `block_size`-word window records its first `block_size - 1` words as a
/// key and the final word as an observed continuation. Continuations keep
/// duplicates, so uniform sampling is frequency-weighted by construction.
#[derive(Debug, Clone)]
pub struct WordChain {
    block_size: usize,
    chain: HashMap<Vec<String>, Vec<String>>,
}

impl WordChain {
    pub fn new(sample: &str, block_size: usize) -> Result<Self, ChainError> {
        if block_size == 0 {
            return Err(ChainError::InvalidBlockSize(block_size));
        }
        let words: Vec<&str> = sample.split_whitespace().collect();
        if words.is_empty() {
            return Err(ChainError::EmptyCorpus);
        }
        let mut chain: HashMap<Vec<String>, Vec<String>> = HashMap::new();
        for window in words.windows(block_size) {
            let key = window[..block_size - 1]
                .iter()
                .map(|word| (*word).to_string())
                .collect();
            chain
                .entry(key)
                .or_default()
                .push(window[block_size - 1].to_string());
        }
        Ok(WordChain { block_size, chain })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// True when the corpus was shorter than the block size, leaving no
    /// observed windows. Generation from an empty chain yields an empty
    /// string.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Generates at most `max_words` words. See [`generate_with_rng`].
    ///
    /// [`generate_with_rng`]: WordChain::generate_with_rng
    pub fn generate(&self, max_words: usize) -> String {
        self.generate_with_rng(&mut thread_rng(), max_words)
    }

    /// Generates at most `max_words` words using the provided RNG.
    ///
    /// Starts from a uniformly random observed key (whose words open the
    /// output), then repeatedly samples a continuation and advances the
    /// key by dropping its first word and appending the pick. Stops at the
    /// word budget or on a dead end; the budget is never overshot.
    pub fn generate_with_rng<R: Rng>(&self, rng: &mut R, max_words: usize) -> String {
        if max_words == 0 || self.chain.is_empty() {
            return String::new();
        }
        let keys: Vec<&Vec<String>> = self.chain.keys().collect();
        let seed = keys[rng.gen_range(0..keys.len())];
        let mut output: Vec<String> = seed.iter().take(max_words).cloned().collect();
        let mut key = seed.clone();
        while output.len() < max_words {
            let Some(next) = self.chain.get(&key).and_then(|c| c.choose(rng)) else {
                break;
            };
            output.push(next.clone());
            if self.block_size > 1 {
                key.remove(0);
                key.push(next.clone());
            }
        }
        output.join(" ")
    }
}

/// Builds a chain from `sample` and generates a pseudo-thought of
/// approximately `length` words. The budget handed to the chain is
/// `length / block_size`, rounded; dead ends may leave the output
/// shorter, but it never exceeds the budget.
pub fn generate_thought(
    sample: &str,
    block_size: usize,
    length: usize,
) -> Result<String, ChainError> {
    let chain = WordChain::new(sample, block_size)?;
    let max_words = (length as f64 / block_size as f64).round() as usize;
    Ok(chain.generate(max_words))
}

/// Joins a user's thoughts into one sample and generates from it.
pub fn generate_from_corpus<I, S>(
    thoughts: I,
    block_size: usize,
    length: usize,
) -> Result<String, ChainError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let sample = thoughts
        .into_iter()
        .map(|t| t.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    generate_thought(&sample, block_size, length)
}
