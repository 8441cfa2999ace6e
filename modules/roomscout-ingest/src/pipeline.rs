//! End-to-end ingestion run: intake → classify → extract → persist → report.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use apify_client::FacebookGroupPost;
use roomscout_common::RoomScoutError;

use crate::batch::BatchOrchestrator;
use crate::config::PipelineConfig;
use crate::dedup::{DedupOptions, DuplicateClassifier, DuplicateKind};
use crate::extractor::{ExtractionOutcome, PostExtractor};
use crate::fingerprint::Fingerprinter;
use crate::intake::{decode_items, validate_items, Intake};
use crate::reconcile::Reconciler;
use crate::report::{DuplicateDetail, PipelineReport, PostError, ReportStats};
use crate::traits::{DatasetSource, ListingStore};

pub struct IngestPipeline {
    classifier: DuplicateClassifier,
    orchestrator: BatchOrchestrator,
    reconciler: Reconciler,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn ListingStore>,
        extractor: Arc<dyn PostExtractor>,
        config: &PipelineConfig,
    ) -> Self {
        Self::with_fingerprinter(store, extractor, config, Fingerprinter::default())
    }

    /// Use a custom similarity key strategy for classification and provenance.
    pub fn with_fingerprinter(
        store: Arc<dyn ListingStore>,
        extractor: Arc<dyn PostExtractor>,
        config: &PipelineConfig,
        fingerprinter: Fingerprinter,
    ) -> Self {
        Self {
            classifier: DuplicateClassifier::new(store.clone(), fingerprinter.clone()),
            orchestrator: BatchOrchestrator::new(extractor, config.batch.clone()),
            reconciler: Reconciler::new(
                store,
                fingerprinter,
                config.reconcile.clone(),
                config.validation,
            ),
        }
    }

    /// Resolve a dataset reference and run the pipeline over its items.
    ///
    /// Errors only when the dataset itself cannot be resolved; everything
    /// that goes wrong for individual posts lands in the report. The batch
    /// deadline counts from here, so a slow fetch eats into it.
    pub async fn ingest_dataset(
        &self,
        source: &dyn DatasetSource,
        dataset_id: &str,
        options: DedupOptions,
    ) -> Result<PipelineReport, RoomScoutError> {
        let dataset_id = dataset_id.trim();
        if dataset_id.is_empty() {
            return Err(RoomScoutError::Input(
                "Missing defaultDatasetId in request body".to_string(),
            ));
        }

        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest_run", %run_id, dataset_id);
        async {
            let items = source.dataset_items(dataset_id).await.map_err(|e| {
                warn!(error = %e, "Dataset fetch failed");
                RoomScoutError::Transport(format!("Failed to fetch dataset: {e}"))
            })?;
            info!(count = items.len(), "Received posts");
            let intake = decode_items(items);
            Ok::<_, RoomScoutError>(self.process(run_id, started, intake, options).await)
        }
        .instrument(span)
        .await
    }

    /// Run the pipeline over items already in hand.
    pub async fn run(&self, items: Vec<FacebookGroupPost>, options: DedupOptions) -> PipelineReport {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest_run", %run_id);
        self.process(run_id, started, validate_items(items), options)
            .instrument(span)
            .await
    }

    async fn process(
        &self,
        run_id: Uuid,
        started: Instant,
        intake: Intake,
        options: DedupOptions,
    ) -> PipelineReport {
        let mut stats = ReportStats {
            total_posts: intake.total,
            ..Default::default()
        };
        if intake.total == 0 {
            info!("No posts to process");
            return PipelineReport::new(run_id, "No posts to process");
        }

        // Intake
        stats.valid_posts = intake.posts.len();
        info!(valid = intake.posts.len(), total = intake.total, "Validated posts");
        if intake.posts.is_empty() {
            let mut report = PipelineReport::new(run_id, "No valid posts to process");
            report.stats = stats;
            report.invalid_details = intake.dropped;
            return report;
        }

        // Classify
        let partition = self.classifier.partition(intake.posts, options).await;
        stats.duplicates.total = partition.duplicates.len();
        stats.duplicates.exact = partition.count(DuplicateKind::Exact);
        stats.duplicates.similar = partition.count(DuplicateKind::Similar);
        stats.unique_posts = partition.unique.len();
        let duplicate_details: Vec<DuplicateDetail> =
            partition.duplicates.iter().map(DuplicateDetail::from).collect();

        if partition.unique.is_empty() {
            info!(duplicates = partition.duplicates.len(), "All posts are duplicates");
            let mut report =
                PipelineReport::new(run_id, "All posts are duplicates, nothing to process");
            report.stats = stats;
            report.duplicate_details = duplicate_details;
            report.invalid_details = intake.dropped;
            return report;
        }

        // Extract
        let posts = partition.unique.iter().map(|c| c.post.clone()).collect();
        let outcomes = self.orchestrator.run_since(posts, started).await;
        let errors: Vec<PostError> = outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                ExtractionOutcome::Rejected { reason } => Some(PostError {
                    fb_post_id: o.legacy_id.clone(),
                    error: reason.clone(),
                }),
                ExtractionOutcome::Accepted { .. } => None,
            })
            .collect();
        stats.ai_extraction.failed = errors.len();
        stats.ai_extraction.successful = outcomes.len() - errors.len();

        // Persist
        let saves = self.reconciler.persist(&outcomes, &partition.unique).await;
        stats.database_save.created = saves.created.len();
        stats.database_save.updated = saves.updated.len();
        stats.database_save.successful = saves.saved();
        stats.database_save.failed = saves.failed.len();
        stats.database_save.skipped = saves.skipped.len();

        info!(
            saved = stats.database_save.successful,
            total = stats.total_posts,
            duplicates = stats.duplicates.total,
            skipped = stats.database_save.skipped,
            errors = stats.ai_extraction.failed + stats.database_save.failed,
            "Batch processing complete"
        );

        let mut report = PipelineReport::new(run_id, "Batch processing complete");
        report.stats = stats;
        report.duplicate_details = duplicate_details;
        report.skipped_details = saves.skipped;
        report.errors = errors;
        report.save_errors = saves.failed;
        report.invalid_details = intake.dropped;
        report
    }
}
