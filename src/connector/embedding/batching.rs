use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::application::{EmbedOptions, MAX_EMBED_CHARS};
use crate::domain::DomainError;

/// Truncation ladder applied to a failing single text before giving up.
const TRUNCATION_STEPS: &[usize] = &[4_000, 2_000, 500];

/// One raw round-trip to an embedding endpoint. Implemented by each HTTP
/// provider; the recovery logic above it is shared.
#[async_trait]
pub trait EmbedTransport: Send + Sync {
    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError>;
}

/// Cuts `text` at `cap` characters on a char boundary.
fn truncate_chars(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }
    let mut cut = cap;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}

/// Packs prepared texts into sub-batches bounded by both item count and
/// cumulative characters. Every batch holds at least one text.
fn pack_batches(texts: &[String], batch_size: usize, max_batch_chars: usize) -> Vec<Vec<String>> {
    let mut batches = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_chars = 0usize;
    for text in texts {
        let over_count = current.len() >= batch_size.max(1);
        let over_chars = !current.is_empty() && current_chars + text.len() > max_batch_chars;
        if over_count || over_chars {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current_chars += text.len();
        current.push(text.clone());
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Embeds one sub-batch, recovering from failures: binary split for
/// multi-text batches, progressive truncation then a zero vector for a
/// single text. Never fails; every input yields exactly one vector.
async fn embed_sub_batch<T: EmbedTransport + ?Sized>(
    transport: &T,
    texts: Vec<String>,
    dimension: usize,
    zero_fallbacks: &mut u64,
) -> Vec<Vec<f32>> {
    // Worklist of (texts, depth) instead of recursion: async recursion
    // would need boxing, and the split depth is log2(batch) anyway.
    let mut output: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    let mut stack: Vec<Vec<String>> = vec![texts];

    while let Some(batch) = stack.pop() {
        match transport.request_embeddings(&batch).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                output.extend(vectors);
            }
            result => {
                if let Err(e) = &result {
                    debug!("Sub-batch of {} failed: {}", batch.len(), e);
                }
                if batch.len() > 1 {
                    let mid = batch.len() / 2;
                    let (left, right) = batch.split_at(mid);
                    // LIFO stack: push right first so left is retried first
                    // and output order is preserved.
                    stack.push(right.to_vec());
                    stack.push(left.to_vec());
                } else if let Some(text) = batch.into_iter().next() {
                    output.push(
                        embed_single_with_truncation(transport, text, dimension, zero_fallbacks)
                            .await,
                    );
                }
            }
        }
    }
    output
}

async fn embed_single_with_truncation<T: EmbedTransport + ?Sized>(
    transport: &T,
    text: String,
    dimension: usize,
    zero_fallbacks: &mut u64,
) -> Vec<f32> {
    for cap in TRUNCATION_STEPS {
        let shorter = truncate_chars(&text, *cap);
        match transport.request_embeddings(&[shorter]).await {
            Ok(mut vectors) if vectors.len() == 1 => return vectors.remove(0),
            _ => continue,
        }
    }
    *zero_fallbacks += 1;
    warn!("Embedding failed after truncation retries; emitting zero vector");
    vec![0.0; dimension]
}

/// The shared `embed_batch` engine: cap each text, apply the prefix when
/// the provider supports it, pack, dispatch sub-batches concurrently in
/// order, and recover per-batch. Output length and order always match the
/// input.
pub async fn embed_with_recovery<T: EmbedTransport + ?Sized>(
    transport: &T,
    texts: &[String],
    options: &EmbedOptions,
    apply_prefix: bool,
) -> Result<Vec<Vec<f32>>, DomainError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let prefix = if apply_prefix {
        options.prefix.as_deref().unwrap_or("")
    } else {
        ""
    };
    let prepared: Vec<String> = texts
        .iter()
        .map(|t| {
            let capped = truncate_chars(t, MAX_EMBED_CHARS);
            if prefix.is_empty() {
                capped
            } else {
                format!("{}{}", prefix, capped)
            }
        })
        .collect();

    let batches = pack_batches(&prepared, options.batch_size, options.max_batch_chars);
    let batch_count = batches.len();
    let dimension = options.dimension;

    let mut results: Vec<(Vec<Vec<f32>>, u64)> = stream::iter(batches)
        .map(|batch| async move {
            let mut zero_fallbacks = 0u64;
            let vectors = embed_sub_batch(transport, batch, dimension, &mut zero_fallbacks).await;
            (vectors, zero_fallbacks)
        })
        .buffered(options.concurrency.max(1))
        .collect()
        .await;

    let total_zero: u64 = results.iter().map(|(_, z)| z).sum();
    let vectors: Vec<Vec<f32>> = results.drain(..).flat_map(|(v, _)| v).collect();

    if options.verbose {
        debug!(
            "Embedded {} texts in {} sub-batches ({} zero-vector fallbacks)",
            texts.len(),
            batch_count,
            total_zero
        );
    }
    if total_zero > 0 {
        warn!("{} texts fell back to zero vectors", total_zero);
    }

    debug_assert_eq!(vectors.len(), texts.len());
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Deterministic transport that fails on configured texts.
    struct ScriptedTransport {
        /// Texts that always fail, at any truncation length.
        poison: Vec<String>,
        /// Batch sizes that fail wholesale on first attempt.
        fail_batches_over: Option<usize>,
        calls: AtomicUsize,
        seen_batches: Mutex<Vec<usize>>,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                poison: Vec::new(),
                fail_batches_over: None,
                calls: AtomicUsize::new(0),
                seen_batches: Mutex::new(Vec::new()),
            }
        }

        fn vector_for(text: &str) -> Vec<f32> {
            // Encode the text length so ordering is observable.
            vec![text.len() as f32, 1.0]
        }
    }

    #[async_trait]
    impl EmbedTransport for ScriptedTransport {
        async fn request_embeddings(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_batches.lock().unwrap().push(texts.len());
            if let Some(cap) = self.fail_batches_over {
                if texts.len() > cap {
                    return Err(DomainError::embedding("batch too large"));
                }
            }
            if texts
                .iter()
                .any(|t| self.poison.iter().any(|p| t.starts_with(p.as_str())))
            {
                return Err(DomainError::embedding("poisoned text"));
            }
            Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text-{:03}", i)).collect()
    }

    fn options() -> EmbedOptions {
        EmbedOptions {
            batch_size: 4,
            max_batch_chars: 1_000,
            dimension: 2,
            verbose: false,
            prefix: None,
            concurrency: 2,
        }
    }

    #[tokio::test]
    async fn test_output_matches_input_length_and_order() {
        let transport = ScriptedTransport::new();
        let input = texts(10);
        let vectors = embed_with_recovery(&transport, &input, &options(), false)
            .await
            .unwrap();
        assert_eq!(vectors.len(), input.len());
        for (text, vector) in input.iter().zip(&vectors) {
            assert_eq!(vector[0], text.len() as f32);
        }
    }

    #[tokio::test]
    async fn test_binary_split_recovers_large_batches() {
        let mut transport = ScriptedTransport::new();
        transport.fail_batches_over = Some(1);
        let input = texts(8);
        let vectors = embed_with_recovery(&transport, &input, &options(), false)
            .await
            .unwrap();
        assert_eq!(vectors.len(), 8);
        // Splitting happened: more calls than packed batches.
        assert!(transport.calls.load(Ordering::SeqCst) > 2);
    }

    #[tokio::test]
    async fn test_poisoned_text_becomes_zero_vector() {
        let mut transport = ScriptedTransport::new();
        transport.poison = vec!["bad".to_string()];
        let input = vec![
            "good one".to_string(),
            "bad apple".to_string(),
            "good two".to_string(),
        ];
        let vectors = embed_with_recovery(&transport, &input, &options(), false)
            .await
            .unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[1], vec![0.0, 0.0]);
        assert_ne!(vectors[0], vec![0.0, 0.0]);
        assert_ne!(vectors[2], vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_oversized_text_is_capped_before_dispatch() {
        let transport = ScriptedTransport::new();
        let input = vec!["x".repeat(50_000)];
        let vectors = embed_with_recovery(&transport, &input, &options(), false)
            .await
            .unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0][0], MAX_EMBED_CHARS as f32);
    }

    #[tokio::test]
    async fn test_prefix_applied_only_when_supported() {
        let transport = ScriptedTransport::new();
        let mut opts = options();
        opts.prefix = Some("search_query: ".to_string());
        let input = vec!["hello".to_string()];

        let with = embed_with_recovery(&transport, &input, &opts, true)
            .await
            .unwrap();
        assert_eq!(with[0][0], ("search_query: ".len() + "hello".len()) as f32);

        let without = embed_with_recovery(&transport, &input, &opts, false)
            .await
            .unwrap();
        assert_eq!(without[0][0], "hello".len() as f32);
    }

    #[test]
    fn test_pack_batches_respects_both_bounds() {
        let texts: Vec<String> = (0..6).map(|_| "x".repeat(400)).collect();
        // Char budget of 1000 holds two 400-char texts per batch.
        let batches = pack_batches(&texts, 10, 1_000);
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() == 2));

        // Count bound kicks in first with small texts.
        let small: Vec<String> = (0..9).map(|i| format!("t{}", i)).collect();
        let batches = pack_batches(&small, 4, 1_000);
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn test_single_oversized_text_still_gets_a_batch() {
        let texts = vec!["x".repeat(5_000)];
        let batches = pack_batches(&texts, 4, 1_000);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }
}
