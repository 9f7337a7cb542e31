//! Document text chunkers.
//!
//! Splits document text into bounded, retrievable passages in one of two
//! modes:
//!
//! - **Fixed-window** ([`chunk_fixed`]): slide a window forward by
//!   `chunk_size - overlap`, snapping each cut to the nearest sentence or
//!   paragraph boundary in the back half of the window so chunks end on
//!   natural breaks. The configured overlap is carried into the next
//!   window so information spanning a cut is not lost.
//! - **Semantic** ([`chunk_semantic`]): split into sentences, embed them
//!   in one batch, and cut a new chunk wherever adjacent-sentence
//!   similarity drops below a threshold, yielding variable-length,
//!   topically coherent chunks at the cost of embedding calls during
//!   chunking.
//!
//! Sizes are byte lengths snapped to UTF-8 character boundaries, a rough
//! characters approximation. Blank or whitespace-only input yields zero
//! chunks (not an error); non-empty text shorter than one chunk yields
//! exactly one chunk.

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::Result;
use crate::models::{Chunk, ChunkMode, ChunkParams};
use crate::RetrievalError;

/// Split text into chunks using the mode selected in `params`.
///
/// The embedder is only consulted in semantic mode.
pub async fn chunk_text(
    text: &str,
    params: &ChunkParams,
    embedder: &dyn Embedder,
) -> Result<Vec<Chunk>> {
    match params.mode {
        ChunkMode::Fixed => chunk_fixed(text, params),
        ChunkMode::Semantic => chunk_semantic(text, params, embedder).await,
    }
}

/// Fixed-window chunking with boundary snapping and overlap.
///
/// # Guarantees
///
/// - Chunk sequence ids are contiguous: `0, 1, 2, …, N-1`.
/// - Each chunk is at most `chunk_size` bytes before trimming.
/// - Consecutive windows share `overlap` bytes except where that would
///   stall the scan (overlap larger than the snapped cut advance).
/// - The union of windows covers the (truncated) source text.
pub fn chunk_fixed(text: &str, params: &ChunkParams) -> Result<Vec<Chunk>> {
    params.validate()?;

    let text = truncate_to(text, params.max_document_chars);
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let n = text.len();
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut start = 0usize;
    let mut last_cut = 0usize;

    while start < n {
        let hard_end = snap_to_char_boundary(text, (start + params.chunk_size).min(n));
        let cut = if hard_end >= n {
            n
        } else {
            // Prefer a sentence/paragraph break in the back half of the
            // window; past cuts are off-limits so the scan always advances.
            let floor = snap_to_char_boundary(
                text,
                (start + params.chunk_size / 2).max(last_cut + 1).min(hard_end),
            );
            boundary_before(text, floor, hard_end).unwrap_or(hard_end)
        };

        let piece = text[start..cut].trim();
        if !piece.is_empty() {
            chunks.push(Chunk::new(chunks.len(), piece));
        }

        if cut >= n {
            break;
        }
        last_cut = cut;

        let mut next = snap_to_char_boundary(text, cut.saturating_sub(params.overlap));
        if next <= start {
            // Overlap would re-open the same window; drop it for this step.
            next = cut;
        }
        start = next;
    }

    Ok(chunks)
}

/// Semantic chunking: cut where adjacent-sentence similarity drops below
/// `params.similarity_threshold`, or where the size cap would be exceeded.
///
/// All sentences are embedded in a single batch call.
pub async fn chunk_semantic(
    text: &str,
    params: &ChunkParams,
    embedder: &dyn Embedder,
) -> Result<Vec<Chunk>> {
    params.validate()?;

    let text = truncate_to(text, params.max_document_chars);
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return Ok(Vec::new());
    }
    if sentences.len() == 1 {
        return Ok(vec![Chunk::new(0, sentences.into_iter().next().unwrap())]);
    }

    let vectors = embedder.embed_batch(&sentences).await?;
    if vectors.len() != sentences.len() {
        return Err(RetrievalError::EmbeddingServiceUnavailable(format!(
            "expected {} sentence embeddings, got {}",
            sentences.len(),
            vectors.len()
        )));
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current = sentences[0].clone();

    for (i, sentence) in sentences.iter().enumerate().skip(1) {
        let sim = cosine_similarity(&vectors[i - 1], &vectors[i]);
        let topic_shift = sim < params.similarity_threshold;
        let would_overflow = current.len() + 1 + sentence.len() > params.chunk_size;

        if topic_shift || would_overflow {
            chunks.push(Chunk::new(chunks.len(), current.clone()));
            current = sentence.clone();
        } else {
            current.push(' ');
            current.push_str(sentence);
        }
    }
    chunks.push(Chunk::new(chunks.len(), current));

    Ok(chunks)
}

/// Split text into trimmed sentences.
///
/// A sentence ends at `.`, `!`, or `?` followed by whitespace (or end of
/// input), or at a newline. Empty fragments are dropped; a trailing
/// fragment without terminal punctuation is kept.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let terminal = matches!(c, '.' | '!' | '?')
            && chars.peek().map_or(true, |next| next.is_whitespace());
        if terminal || c == '\n' {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// Last sentence or paragraph boundary in `(floor, ceil]`, if any.
///
/// A boundary is the byte position just after a newline, or just after
/// `.`/`!`/`?` when the following character is whitespace.
fn boundary_before(text: &str, floor: usize, ceil: usize) -> Option<usize> {
    let mut best = None;
    for (offset, c) in text[floor..ceil].char_indices() {
        let end = floor + offset + c.len_utf8();
        let is_boundary = match c {
            '\n' => true,
            '.' | '!' | '?' => text[end..]
                .chars()
                .next()
                .map_or(true, |next| next.is_whitespace()),
            _ => false,
        };
        if is_boundary {
            best = Some(end);
        }
    }
    best
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Cap document length before chunking.
fn truncate_to(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        text
    } else {
        &text[..snap_to_char_boundary(text, max_bytes)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    fn params(chunk_size: usize, overlap: usize) -> ChunkParams {
        ChunkParams {
            mode: ChunkMode::Fixed,
            chunk_size,
            overlap,
            ..Default::default()
        }
    }

    #[test]
    fn test_blank_text_yields_no_chunks() {
        assert!(chunk_fixed("", &params(100, 20)).unwrap().is_empty());
        assert!(chunk_fixed("   \n\t  ", &params(100, 20)).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_fixed("Hello, world!", &params(1000, 200)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].seq, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_sequence_ids_contiguous() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} is here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_fixed(&text, &params(80, 20)).unwrap();
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.seq, i);
        }
    }

    #[test]
    fn test_chunks_respect_size_cap() {
        let text = "word ".repeat(500);
        for c in chunk_fixed(&text, &params(100, 25)).unwrap() {
            assert!(c.text.len() <= 100, "chunk too large: {}", c.text.len());
        }
    }

    #[test]
    fn test_cuts_snap_to_sentence_boundaries() {
        let text = (0..30)
            .map(|i| format!("This is sentence {}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_fixed(&text, &params(120, 30)).unwrap();
        assert!(chunks.len() > 1);
        // Every non-final chunk should end on a sentence break.
        for c in &chunks[..chunks.len() - 1] {
            assert!(
                c.text.ends_with('.'),
                "chunk does not end at a boundary: {:?}",
                c.text
            );
        }
    }

    #[test]
    fn test_overlap_repeats_boundary_text() {
        let text = (0..30)
            .map(|i| format!("This is sentence {}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_fixed(&text, &params(120, 40)).unwrap();
        assert!(chunks.len() > 1);
        // The head of each following chunk re-appears at the tail of its
        // predecessor.
        for pair in chunks.windows(2) {
            let head: String = pair[1].text.chars().take(10).collect();
            assert!(
                pair[0].text.contains(&head),
                "no overlap between {:?} and {:?}",
                pair[0].text,
                pair[1].text
            );
        }
    }

    #[test]
    fn test_coverage_of_source_text() {
        let text = (0..25)
            .map(|i| format!("Coverage sentence {} talks about topic {}.", i, i % 5))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_fixed(&text, &params(90, 20)).unwrap();
        for sentence in split_sentences(&text) {
            assert!(
                chunks.iter().any(|c| c.text.contains(&sentence)),
                "sentence lost: {:?}",
                sentence
            );
        }
    }

    #[test]
    fn test_no_boundaries_terminates_and_covers() {
        // Pathological input: no sentence breaks, aggressive overlap.
        let text = "a".repeat(5000);
        let chunks = chunk_fixed(&text, &params(100, 90)).unwrap();
        assert!(!chunks.is_empty());
        let total: usize = chunks.iter().map(|c| c.text.len()).sum();
        assert!(total >= 5000);
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = chunk_fixed(text, &params(12, 3)).unwrap();
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_truncation_cap_applies() {
        let text = "word ".repeat(200);
        let capped = ChunkParams {
            max_document_chars: 50,
            ..params(1000, 0)
        };
        let chunks = chunk_fixed(&text, &capped).unwrap();
        let total: usize = chunks.iter().map(|c| c.text.len()).sum();
        assert!(total <= 50);
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(chunk_fixed("text", &params(100, 100)).is_err());
        assert!(chunk_fixed("text", &params(0, 0)).is_err());
    }

    #[test]
    fn test_split_sentences_basic() {
        let sentences = split_sentences("The cat sat on the mat. The dog ran in the park.");
        assert_eq!(
            sentences,
            vec!["The cat sat on the mat.", "The dog ran in the park."]
        );
    }

    #[test]
    fn test_split_sentences_newlines_and_fragments() {
        let sentences = split_sentences("First line\nSecond line? Trailing fragment");
        assert_eq!(
            sentences,
            vec!["First line", "Second line?", "Trailing fragment"]
        );
    }

    #[test]
    fn test_split_sentences_decimal_not_split() {
        let sentences = split_sentences("The fee is 3.5 percent per year.");
        assert_eq!(sentences.len(), 1);
    }

    #[tokio::test]
    async fn test_semantic_cuts_on_topic_shift() {
        let embedder = HashingEmbedder::default();
        let p = ChunkParams {
            mode: ChunkMode::Semantic,
            ..Default::default()
        };
        let chunks = chunk_text(
            "The cat sat on the mat. The dog ran in the park.",
            &p,
            &embedder,
        )
        .await
        .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "The cat sat on the mat.");
        assert_eq!(chunks[1].text, "The dog ran in the park.");
    }

    #[tokio::test]
    async fn test_semantic_groups_similar_sentences() {
        let embedder = HashingEmbedder::default();
        let p = ChunkParams {
            mode: ChunkMode::Semantic,
            similarity_threshold: 0.3,
            ..Default::default()
        };
        // Near-identical sentences stay in one chunk at a low threshold.
        let chunks = chunk_semantic(
            "The tenant pays rent monthly. The tenant pays rent quarterly.",
            &p,
            &embedder,
        )
        .await
        .unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_semantic_single_sentence() {
        let embedder = HashingEmbedder::default();
        let p = ChunkParams {
            mode: ChunkMode::Semantic,
            ..Default::default()
        };
        let chunks = chunk_semantic("Just one sentence here.", &p, &embedder)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Just one sentence here.");
    }

    #[tokio::test]
    async fn test_semantic_blank_text() {
        let embedder = HashingEmbedder::default();
        let p = ChunkParams {
            mode: ChunkMode::Semantic,
            ..Default::default()
        };
        assert!(chunk_semantic(" \n ", &p, &embedder).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_semantic_respects_size_cap() {
        let embedder = HashingEmbedder::default();
        let p = ChunkParams {
            mode: ChunkMode::Semantic,
            chunk_size: 60,
            similarity_threshold: 0.0,
            ..Default::default()
        };
        // Threshold 0 never cuts on topic; only the size cap forces cuts.
        let text = (0..10)
            .map(|i| format!("Clause {} repeats the same words again.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_semantic(&text, &p, &embedder).await.unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 80);
        }
    }
}
