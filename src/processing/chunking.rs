//! Token-budgeted semantic chunking.
//!
//! Chunks are produced by `semchunk-rs` with token counts from the `cl100k_base` BPE
//! encoding. A sliding overlap then prefixes each chunk with the tail of its predecessor so
//! that sentences spanning a boundary stay retrievable. When the BPE tables cannot be loaded
//! the splitter falls back to counting whitespace-separated words.
//!
//! Defaults are 512 tokens per chunk with 64 tokens of overlap: small enough that the top
//! three chunks plus the question fit comfortably in any current completion model, large
//! enough that a paragraph usually stays whole.

use super::types::ChunkingError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::cl100k_base;

pub(crate) type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const ENCODING: &str = "cl100k_base";

/// Splits document text into overlapping token-bounded chunks.
#[derive(Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
    token_counter: TokenCounter,
}

impl TextSplitter {
    /// Build a splitter with a BPE token counter.
    ///
    /// Overlap is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        let token_counter = match bpe_token_counter() {
            Ok(counter) => counter,
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "Tokenizer unavailable; falling back to whitespace counter"
                );
                whitespace_token_counter()
            }
        };
        Self::with_counter(chunk_size, overlap, token_counter)
    }

    pub(crate) fn with_counter(
        chunk_size: usize,
        overlap: usize,
        token_counter: TokenCounter,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            token_counter,
        })
    }

    /// Token budget per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Count tokens the way chunk budgets are enforced.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.token_counter.as_ref()(text)
    }

    /// Split `text`; returns no chunks for blank input.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let counter = Arc::clone(&self.token_counter);
        let chunker = Chunker::new(
            self.chunk_size,
            Box::new(move |segment: &str| counter.as_ref()(segment)),
        );
        let base_chunks: Vec<String> = chunker
            .chunk(text)
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .collect();
        self.apply_overlap(base_chunks)
    }

    fn apply_overlap(&self, chunks: Vec<String>) -> Vec<String> {
        if self.overlap == 0 || chunks.len() < 2 {
            return chunks;
        }

        let mut overlapped = Vec::with_capacity(chunks.len());
        let mut previous: Option<String> = None;
        for current in chunks {
            let chunk = match &previous {
                None => current.clone(),
                Some(previous) => {
                    let tail = suffix_within_budget(previous, self.overlap, &self.token_counter);
                    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
                    combined.push_str(tail);
                    let needs_space = !tail.is_empty()
                        && !tail.ends_with(char::is_whitespace)
                        && !current.starts_with(char::is_whitespace);
                    if needs_space {
                        combined.push(' ');
                    }
                    combined.push_str(&current);
                    suffix_within_budget(&combined, self.chunk_size, &self.token_counter)
                        .to_string()
                }
            };
            overlapped.push(chunk);
            previous = Some(current);
        }
        overlapped
    }
}

/// Longest suffix of `text` (trimmed at the start) whose token count fits `budget`.
///
/// Token counts only shrink as the start moves right, so the cut is binary searched over
/// char boundaries and the counter runs a logarithmic number of times.
fn suffix_within_budget<'a>(text: &'a str, budget: usize, counter: &TokenCounter) -> &'a str {
    if budget == 0 {
        return "";
    }
    let fits = |offset: usize| counter.as_ref()(text[offset..].trim_start()) <= budget;
    if fits(0) {
        return text.trim_start();
    }

    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    // boundaries[low] overflows the budget, boundaries[high] fits (the empty suffix always does).
    let (mut low, mut high) = (0, boundaries.len() - 1);
    while high - low > 1 {
        let mid = low + (high - low) / 2;
        if fits(boundaries[mid]) {
            high = mid;
        } else {
            low = mid;
        }
    }
    text[boundaries[high]..].trim_start()
}

fn bpe_token_counter() -> Result<TokenCounter, ChunkingError> {
    let encoding = cl100k_base().map_err(|source| ChunkingError::Tokenizer {
        encoding: ENCODING.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}
