use crate::store::{EnrollmentRecord, EnrollmentStore};
use crate::thumbnail::{Thumbnail, ThumbnailError};
use crate::types::MatchResult;
use thiserror::Error;

/// Minimum similarity (exclusive) for a candidate to be reported as a match.
pub const ACCEPTANCE_THRESHOLD: f32 = 0.75;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("probe thumbnail: {0}")]
    Probe(#[source] ThumbnailError),
}

/// Strategy for comparing a probe thumbnail against enrolled faces.
pub trait Matcher {
    /// Compare `probe` against every record of `gallery`, in order.
    fn compare(&self, probe: &Thumbnail, gallery: &[EnrollmentRecord]) -> Result<MatchResult, MatchError>;

    /// Match against a store. An empty store short-circuits without
    /// decoding anything; otherwise the comparison runs over a snapshot.
    fn match_store(&self, probe: &Thumbnail, store: &EnrollmentStore) -> Result<MatchResult, MatchError> {
        if store.is_empty() {
            return Ok(MatchResult::no_match());
        }
        self.compare(probe, &store.snapshot())
    }
}

/// Mean per-pixel colour agreement on a 100×100 grid.
///
/// Records whose thumbnail cannot be decoded are skipped. The best candidate
/// only changes on a strictly higher score, so the earliest enrolled record
/// wins ties. A best score at or under the threshold is discarded and
/// reported as score 0.
#[derive(Debug, Clone, Copy)]
pub struct PixelDiffMatcher {
    pub threshold: f32,
}

impl Default for PixelDiffMatcher {
    fn default() -> Self {
        Self {
            threshold: ACCEPTANCE_THRESHOLD,
        }
    }
}

impl Matcher for PixelDiffMatcher {
    fn compare(&self, probe: &Thumbnail, gallery: &[EnrollmentRecord]) -> Result<MatchResult, MatchError> {
        if gallery.is_empty() {
            return Ok(MatchResult::no_match());
        }

        let probe = probe.canonical().map_err(MatchError::Probe)?;

        let mut best_score = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, record) in gallery.iter().enumerate() {
            let candidate = match record.thumbnail.canonical() {
                Ok(c) => c,
                Err(err) => {
                    tracing::warn!(label = %record.label, error = %err, "skipping undecodable enrollment");
                    continue;
                }
            };
            let score = probe.similarity(&candidate);
            tracing::trace!(label = %record.label, score, "compared");
            if score > best_score {
                best_score = score;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_score > self.threshold => {
                tracing::debug!(label = %gallery[idx].label, score = best_score, "match accepted");
                Ok(MatchResult {
                    label: Some(gallery[idx].label.clone()),
                    score: best_score,
                })
            }
            _ => {
                let best = best_idx.map(|_| best_score).unwrap_or(0.0);
                tracing::debug!(best, threshold = self.threshold, "no match above threshold");
                Ok(MatchResult::no_match())
            }
        }
    }
}
