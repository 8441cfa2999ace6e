//! Batch orchestrator: bounded fan-out extraction in fixed-size chunks.
//!
//! Each chunk spawns one task per post and waits for all of them. A failing
//! task never cancels its siblings and always resolves to an outcome. Chunks
//! are separated by a fixed pause, which is the only pacing against the
//! provider's rate limit besides the extractor's own backoff.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use roomscout_common::RawPost;

use crate::config::BatchConfig;
use crate::extractor::{ExtractionOutcome, PostExtractor};

/// An outcome tagged with the post it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedOutcome {
    pub legacy_id: String,
    pub outcome: ExtractionOutcome,
}

pub struct BatchOrchestrator {
    extractor: Arc<dyn PostExtractor>,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(extractor: Arc<dyn PostExtractor>, config: BatchConfig) -> Self {
        Self { extractor, config }
    }

    /// Extract every post. Returns exactly one outcome per input post, in
    /// chunk order; order inside a chunk is unspecified.
    pub async fn run(&self, posts: Vec<RawPost>) -> Vec<TaggedOutcome> {
        self.run_since(posts, Instant::now()).await
    }

    /// [`run`](Self::run) with the deadline measured from `started`.
    pub async fn run_since(&self, posts: Vec<RawPost>, started: Instant) -> Vec<TaggedOutcome> {
        let chunk_size = self.config.chunk_size.max(1);
        let chunk_count = posts.len().div_ceil(chunk_size);
        let mut outcomes = Vec::with_capacity(posts.len());

        for (index, chunk) in posts.chunks(chunk_size).enumerate() {
            if let Some(deadline) = self.config.deadline {
                if started.elapsed() >= deadline {
                    let remaining = &posts[index * chunk_size..];
                    warn!(
                        remaining = remaining.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Batch deadline exceeded, skipping remaining posts"
                    );
                    outcomes.extend(remaining.iter().map(|post| TaggedOutcome {
                        legacy_id: post.legacy_id.clone(),
                        outcome: ExtractionOutcome::rejected("deadline exceeded"),
                    }));
                    break;
                }
            }

            debug!(chunk = index + 1, chunk_count, size = chunk.len(), "Extracting chunk");
            outcomes.extend(self.run_chunk(chunk).await);

            if index + 1 < chunk_count && !self.config.chunk_delay.is_zero() {
                tokio::time::sleep(self.config.chunk_delay).await;
            }
        }

        let accepted = outcomes.iter().filter(|o| o.outcome.is_accepted()).count();
        info!(
            posts = posts.len(),
            accepted,
            rejected = outcomes.len() - accepted,
            "Batch extraction complete"
        );
        outcomes
    }

    async fn run_chunk(&self, chunk: &[RawPost]) -> Vec<TaggedOutcome> {
        let tasks = chunk.iter().cloned().map(|post| {
            let extractor = self.extractor.clone();
            tokio::spawn(async move { extractor.extract(&post).await })
        });
        let results = join_all(tasks).await;

        chunk
            .iter()
            .zip(results)
            .map(|(post, result)| {
                let outcome = result.unwrap_or_else(|e| {
                    warn!(legacy_id = %post.legacy_id, error = %e, "Extraction task failed");
                    ExtractionOutcome::rejected("extraction task failed")
                });
                TaggedOutcome {
                    legacy_id: post.legacy_id.clone(),
                    outcome,
                }
            })
            .collect()
    }
}
