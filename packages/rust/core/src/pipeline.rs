//! End-to-end menu pipeline: target → acquire → extract → normalize → result.

use std::fmt;
use std::future::Future;
use std::time::Instant;

use tracing::{Span, field, info, instrument, warn};
use uuid::Uuid;

use campusmenu_extract::ExtractorRegistry;
use campusmenu_shared::{
    AppConfig, FailureKind, MenuError, PipelineResult, PipelineWarning, Result, SourceInfo,
};
use campusmenu_source::{AcquisitionTarget, SourceClient};

use crate::meal_period::MealPeriodDetector;
use crate::normalizer::Normalizer;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Acquiring,
    Extracting,
    Normalizing,
    Done,
    Failed(FailureKind),
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Acquiring => f.write_str("acquiring"),
            Self::Extracting => f.write_str("extracting"),
            Self::Normalizing => f.write_str("normalizing"),
            Self::Done => f.write_str("done"),
            Self::Failed(kind) => write!(f, "failed ({kind:?})"),
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called on every state transition.
    fn state(&self, state: PipelineState);
    /// Called when the run completes successfully.
    fn done(&self, result: &PipelineResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn state(&self, _state: PipelineState) {}
    fn done(&self, _result: &PipelineResult) {}
}

/// The orchestrator. Holds only construction-time configuration, so one
/// pipeline can serve any number of concurrent runs.
pub struct MenuPipeline {
    source: SourceClient,
    extractors: ExtractorRegistry,
    normalizer: Normalizer,
    detector: MealPeriodDetector,
}

impl MenuPipeline {
    pub fn new(source: SourceClient, extractors: ExtractorRegistry, normalizer: Normalizer) -> Self {
        Self {
            source,
            extractors,
            normalizer,
            detector: MealPeriodDetector,
        }
    }

    /// Build every component from the loaded config.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            SourceClient::from_config(&config.source)?,
            ExtractorRegistry::new(&config.extract),
            Normalizer::new(config.confidence, config.extract.default_station.clone()),
        ))
    }

    /// Fetch and normalize the menu behind `target`.
    pub async fn fetch_menu(&self, target: &AcquisitionTarget) -> Result<PipelineResult> {
        self.run(target, &SilentProgress, std::future::pending()).await
    }

    /// Like [`fetch_menu`](Self::fetch_menu), but abandons the run with
    /// [`MenuError::Cancelled`] once `cancel` resolves.
    pub async fn fetch_menu_until<C>(
        &self,
        target: &AcquisitionTarget,
        cancel: C,
    ) -> Result<PipelineResult>
    where
        C: Future<Output = ()>,
    {
        self.run(target, &SilentProgress, cancel).await
    }

    /// Run the full pipeline with progress reporting and cancellation.
    #[instrument(skip_all, fields(url = %target.url, format = %target.format, run_id = field::Empty))]
    pub async fn run<C>(
        &self,
        target: &AcquisitionTarget,
        progress: &dyn ProgressReporter,
        cancel: C,
    ) -> Result<PipelineResult>
    where
        C: Future<Output = ()>,
    {
        let start = Instant::now();
        let run_id = Uuid::now_v7();
        Span::current().record("run_id", field::display(run_id));

        info!(%run_id, "starting menu pipeline");
        progress.state(PipelineState::Idle);

        match self.execute(target, progress, cancel, run_id).await {
            Ok(result) => {
                progress.state(PipelineState::Done);
                progress.done(&result);
                info!(
                    items = result.items.len(),
                    meal_period = %result.meal_period,
                    strategy = %result.source.strategy,
                    extractor = %result.source.extractor,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "menu pipeline complete"
                );
                Ok(result)
            }
            Err(e) => {
                let kind = e.kind();
                progress.state(PipelineState::Failed(kind));
                warn!(?kind, error = %e, "menu pipeline failed");
                Err(e)
            }
        }
    }

    async fn execute<C>(
        &self,
        target: &AcquisitionTarget,
        progress: &dyn ProgressReporter,
        cancel: C,
        run_id: Uuid,
    ) -> Result<PipelineResult>
    where
        C: Future<Output = ()>,
    {
        // --- Acquiring ---
        progress.state(PipelineState::Acquiring);
        let raw = self.source.acquire_until(target, cancel).await?;

        // --- Extracting ---
        progress.state(PipelineState::Extracting);
        let extraction = self.extractors.extract(&raw.body)?;

        let mut warnings = Vec::new();
        if let Some(from) = extraction.fallback_from {
            info!(from = %from, to = %extraction.extractor, "fallback extractor used");
            warnings.push(PipelineWarning::FallbackUsed {
                from: from.to_string(),
                to: extraction.extractor.to_string(),
            });
        }

        // --- Normalizing ---
        progress.state(PipelineState::Normalizing);
        let normalized = self
            .normalizer
            .normalize_all(&extraction.records, extraction.extractor);

        if normalized.items.is_empty() {
            return Err(MenuError::NoItemsFound {
                format: raw.format(),
                strategy: raw.strategy,
            });
        }
        if normalized.dropped > 0 {
            warnings.push(PipelineWarning::PartialExtraction {
                dropped: normalized.dropped,
            });
        }

        let meal_period = self.detector.detect(&raw);
        let format = raw.format();

        Ok(PipelineResult {
            meal_period,
            items: normalized.items,
            retrieved_at: raw.retrieved_at,
            source: SourceInfo {
                strategy: raw.strategy,
                format,
                extractor: extraction.extractor.to_string(),
                content_hash: raw.content_hash,
                run_id,
                failed_attempts: raw.prior_failures,
            },
            warnings,
        })
    }
}
