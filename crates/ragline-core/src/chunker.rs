//! Sentence-aware text chunking
//!
//! Text is cut into sentence-like segments and greedily packed into chunks of
//! at most `limit` characters. Segments longer than the limit are sliced into
//! fixed-size pieces. Lengths are counted in `char`s, not bytes.

use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result, TextChunk};

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_LIMIT: usize = 200;

static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence boundary pattern is valid"));

/// Chunker bound to a validated limit.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    limit: usize,
}

impl Chunker {
    pub fn new(limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(Error::InvalidArgument(
                "chunk limit must be a positive integer".to_string(),
            ));
        }
        Ok(Self { limit })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Split `text` into ordinal-tagged chunks.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        pack_segments(text, self.limit)
            .into_iter()
            .enumerate()
            .map(|(ordinal, content)| TextChunk { content, ordinal })
            .collect()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            limit: DEFAULT_CHUNK_LIMIT,
        }
    }
}

/// Split `text` into chunks of at most `limit` characters.
///
/// Returns [`Error::InvalidArgument`] when `limit` is zero.
pub fn split_into_chunks(text: &str, limit: usize) -> Result<Vec<String>> {
    let chunker = Chunker::new(limit)?;
    Ok(pack_segments(text, chunker.limit))
}

/// Segments end after `.`, `!` or `?` when followed by whitespace. The
/// punctuation stays with its segment and the whitespace run is dropped.
fn sentence_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        // the punctuation mark is a single ASCII byte
        let end = boundary.start() + 1;
        segments.push(&text[start..end]);
        start = boundary.end();
    }
    segments.push(&text[start..]);
    segments
}

fn pack_segments(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = Buffer::default();

    for segment in sentence_segments(text) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        if segment.chars().count() > limit {
            buffer.flush_into(&mut chunks);
            chunks.extend(fixed_slices(segment, limit));
            continue;
        }

        if !buffer.try_append(segment, limit) {
            buffer.flush_into(&mut chunks);
            buffer.start(segment);
        }
    }

    buffer.flush_into(&mut chunks);
    chunks
}

fn fixed_slices(segment: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = segment.chars().collect();
    chars
        .chunks(limit)
        .map(|slice| slice.iter().collect())
        .collect()
}

#[derive(Default)]
struct Buffer {
    text: String,
    len: usize,
}

impl Buffer {
    fn start(&mut self, segment: &str) {
        self.text.push_str(segment);
        self.len = segment.chars().count();
    }

    /// Append with a single separating space if the result still fits.
    fn try_append(&mut self, segment: &str, limit: usize) -> bool {
        let segment_len = segment.chars().count();
        if self.text.is_empty() {
            self.start(segment);
            return true;
        }
        if self.len + 1 + segment_len > limit {
            return false;
        }
        self.text.push(' ');
        self.text.push_str(segment);
        self.len += 1 + segment_len;
        true
    }

    fn flush_into(&mut self, chunks: &mut Vec<String>) {
        if !self.text.is_empty() {
            chunks.push(std::mem::take(&mut self.text));
        }
        self.len = 0;
    }
}
