//! Retrainer - Background model refresh
//!
//! One cycle reads the curator's view, fits the trainable scorers off to
//! the side and publishes a new generation. Detection keeps using the old
//! generation until the swap.
//!
//! Lifecycle: Uninitialized -> WarmStarted -> Trained -> Retraining -> Trained

use std::sync::Arc;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::warm_start::{self, WarmStartConfig};
use super::windows::{TrainingCurator, TrainingSample, TrainingView};
use crate::constants::DEFAULT_MIN_TRAINING_SAMPLES;
use crate::logic::features::LayoutInfo;
use crate::logic::metrics;
use crate::logic::model::{Ensemble, ModelGeneration, ModelLifecycle, SpatialModel, TemporalModel, TrainingError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainerConfig {
    /// High-confidence samples needed for a real retrain
    pub min_samples: usize,
    pub warm_start: WarmStartConfig,
}

impl Default for RetrainerConfig {
    fn default() -> Self {
        Self {
            min_samples: DEFAULT_MIN_TRAINING_SAMPLES,
            warm_start: WarmStartConfig::default(),
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum RetrainOutcome {
    WarmStarted { generation: u64 },
    Trained { generation: u64, spatial_refit: bool, temporal_refit: bool },
    Skipped { have: usize, need: usize },
    Failed(String),
}

pub struct Retrainer {
    config: RetrainerConfig,
    ensemble: Arc<Ensemble>,
    curator: Arc<TrainingCurator>,
}

/// Fresh fit results for one cycle
struct Fitted {
    spatial: Result<SpatialModel, TrainingError>,
    temporal: Result<TemporalModel, TrainingError>,
}

impl Retrainer {
    pub fn new(config: RetrainerConfig, ensemble: Arc<Ensemble>, curator: Arc<TrainingCurator>) -> Self {
        Self {
            config,
            ensemble,
            curator,
        }
    }

    pub fn run_cycle(&self) -> RetrainOutcome {
        let previous_state = self.ensemble.lifecycle();
        let view = self.curator.view();
        let have = view.high_confidence.len();

        let outcome = if have < self.config.min_samples {
            if previous_state == ModelLifecycle::Uninitialized {
                self.warm_start()
            } else {
                log::debug!("Retrain skipped: {} of {} high-confidence samples", have, self.config.min_samples);
                RetrainOutcome::Skipped { have, need: self.config.min_samples }
            }
        } else {
            self.ensemble.set_lifecycle(ModelLifecycle::Retraining);
            self.retrain(&view)
        };

        match &outcome {
            RetrainOutcome::WarmStarted { generation } => {
                self.ensemble.set_lifecycle(ModelLifecycle::WarmStarted);
                metrics::record_retrain_success(*generation);
            }
            RetrainOutcome::Trained { generation, .. } => {
                self.ensemble.set_lifecycle(ModelLifecycle::Trained);
                metrics::record_retrain_success(*generation);
            }
            RetrainOutcome::Skipped { .. } => {
                self.ensemble.set_lifecycle(previous_state);
                metrics::record_retrain_skipped();
            }
            RetrainOutcome::Failed(e) => {
                self.ensemble.set_lifecycle(previous_state);
                metrics::record_retrain_failure();
                log::warn!("Retrain failed, keeping generation {}: {}", self.ensemble.current_generation().id, e);
            }
        }
        outcome
    }

    fn warm_start(&self) -> RetrainOutcome {
        log::info!(
            "Cold start: fitting synthetic corpus ({} samples, seed {})",
            self.config.warm_start.samples,
            self.config.warm_start.seed
        );
        let corpus = warm_start::samples(&self.config.warm_start);
        let view = TrainingView {
            high_confidence: corpus.clone(),
            all_data: corpus,
            recent: Vec::new(),
        };
        match self.publish(&view, true) {
            Ok((generation, _, _)) => RetrainOutcome::WarmStarted { generation },
            Err(e) => RetrainOutcome::Failed(e),
        }
    }

    fn retrain(&self, view: &TrainingView) -> RetrainOutcome {
        match self.publish(view, false) {
            Ok((generation, spatial_refit, temporal_refit)) => RetrainOutcome::Trained {
                generation,
                spatial_refit,
                temporal_refit,
            },
            Err(e) => RetrainOutcome::Failed(e),
        }
    }

    fn fit(&self, view: &TrainingView) -> Fitted {
        let config = self.ensemble.config();

        // all-data first; high-confidence when all-data is too thin
        let spatial_source: &[TrainingSample] = if view.all_data.len() >= config.spatial.min_samples {
            &view.all_data
        } else {
            &view.high_confidence
        };
        let spatial = SpatialModel::fit(&TrainingView::weighted(spatial_source), &config.spatial);

        let sequences = view.sequences(config.temporal.sequence_length, config.temporal.min_sequence_weight);
        let temporal = TemporalModel::fit(&sequences, &config.temporal);

        Fitted { spatial, temporal }
    }

    /// Fit and publish. A scorer that fails to fit keeps the previous
    /// generation's model; if nothing new was fitted the cycle fails.
    fn publish(&self, view: &TrainingView, warm_start: bool) -> Result<(u64, bool, bool), String> {
        let previous = self.ensemble.current_generation();
        let Fitted { spatial, temporal } = self.fit(view);

        let spatial_refit = spatial.is_ok();
        let temporal_refit = temporal.is_ok();
        let spatial = match spatial {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                log::warn!("Spatial fit failed, carrying over previous model: {}", e);
                previous.spatial.clone()
            }
        };
        let temporal = match temporal {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                log::warn!("Temporal fit failed, carrying over previous model: {}", e);
                previous.temporal.clone()
            }
        };
        if !spatial_refit && !temporal_refit {
            return Err("no scorer could be fitted".to_string());
        }

        let id = previous.id + 1;
        self.ensemble.publish(ModelGeneration {
            id,
            spatial,
            temporal,
            layout: LayoutInfo::current(),
            trained_at: Some(Utc::now()),
            warm_start,
            training_samples: view.all_data.len(),
        });
        Ok((id, spatial_refit, temporal_refit))
    }
}
