use serde::Serialize;
use uuid::Uuid;

use crate::dedup::{Classified, DuplicateKind};
use crate::intake::DroppedItem;

/// Outcome report of one pipeline run, serialized as the webhook response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub run_id: Uuid,
    pub stats: ReportStats,
    pub duplicate_details: Vec<DuplicateDetail>,
    pub skipped_details: Vec<SkippedDetail>,
    pub errors: Vec<PostError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub save_errors: Vec<PostError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid_details: Vec<DroppedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStats {
    pub total_posts: usize,
    pub valid_posts: usize,
    pub duplicates: DuplicateStats,
    pub unique_posts: usize,
    pub ai_extraction: ExtractionStats,
    pub database_save: SaveStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateStats {
    pub total: usize,
    pub exact: usize,
    pub similar: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveStats {
    /// Rows written, created plus updated.
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateDetail {
    pub fb_post_id: String,
    #[serde(rename = "type")]
    pub kind: DuplicateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_id: Option<String>,
}

impl From<&Classified> for DuplicateDetail {
    fn from(c: &Classified) -> Self {
        Self {
            fb_post_id: c.post.legacy_id.clone(),
            kind: c.check.kind,
            reason: c.check.reason.clone(),
            existing_id: c.check.matched_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedDetail {
    pub fb_post_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostError {
    pub fb_post_id: String,
    pub error: String,
}

impl PipelineReport {
    pub fn new(run_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            run_id,
            stats: ReportStats::default(),
            duplicate_details: Vec::new(),
            skipped_details: Vec::new(),
            errors: Vec::new(),
            save_errors: Vec::new(),
            invalid_details: Vec::new(),
        }
    }

    /// The batch could not run at all.
    pub fn fatal(run_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            ..Self::new(run_id, "")
        }
    }
}

impl std::fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = &self.stats;
        writeln!(f, "\n=== Ingest Run {} ===", self.run_id)?;
        if let Some(error) = &self.error {
            return writeln!(f, "FAILED: {error}");
        }
        if let Some(message) = &self.message {
            writeln!(f, "{message}")?;
        }
        writeln!(f, "Posts received:     {}", s.total_posts)?;
        writeln!(f, "Valid posts:        {}", s.valid_posts)?;
        writeln!(
            f,
            "Duplicates:         {} (exact {}, similar {})",
            s.duplicates.total, s.duplicates.exact, s.duplicates.similar
        )?;
        writeln!(f, "Unique posts:       {}", s.unique_posts)?;
        writeln!(
            f,
            "Extraction:         {} ok, {} failed",
            s.ai_extraction.successful, s.ai_extraction.failed
        )?;
        writeln!(
            f,
            "Saved:              {} ({} created, {} updated)",
            s.database_save.successful, s.database_save.created, s.database_save.updated
        )?;
        writeln!(f, "Save failures:      {}", s.database_save.failed)?;
        writeln!(f, "Skipped:            {}", s.database_save.skipped)?;
        Ok(())
    }
}
