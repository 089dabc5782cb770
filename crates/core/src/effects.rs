//! Effect catalog and the batch effect-assignment policy.
//!
//! A single image is rendered with the effect the user picked. Once a
//! batch has two or more active jobs, every job is re-rolled at dequeue
//! time with a uniformly random effect so the clips come out varied.
//! The batch ends (and randomization switches off) when the queue drains.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::Job;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Effect used when nothing (or something unknown) is requested.
pub const DEFAULT_EFFECT_ID: &str = "zoom_in_center";

/// Active-job count at which a batch switches to random effects.
pub const RANDOMIZE_THRESHOLD: usize = 2;

/// Built-in effect set: `(id, label)`.
const BUILTIN_EFFECTS: &[(&str, &str)] = &[
    ("zoom_in_center", "Zoom in (center)"),
    ("zoom_out_center", "Zoom out (center)"),
    ("zoom_in_left", "Zoom in (left)"),
    ("zoom_in_right", "Zoom in (right)"),
    ("pan_left_to_right", "Pan left to right"),
    ("pan_right_to_left", "Pan right to left"),
    ("pan_top_to_bottom", "Pan top to bottom"),
];

// ---------------------------------------------------------------------------
// Effect / catalog
// ---------------------------------------------------------------------------

/// A named visual treatment applied by the Conversion Service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    pub id: String,
    /// Human-readable name. Defaults to the id when a catalog file omits it.
    #[serde(default)]
    pub label: String,
}

impl Effect {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// The fixed, non-empty set of effects a job may be rendered with.
#[derive(Debug, Clone)]
pub struct EffectCatalog {
    effects: Vec<Effect>,
}

impl EffectCatalog {
    /// Build a catalog from an explicit list.
    ///
    /// Rules:
    /// - At least one effect.
    /// - Ids must be non-empty and unique.
    /// - Empty labels are replaced by the id.
    pub fn new(effects: Vec<Effect>) -> Result<Self, CoreError> {
        if effects.is_empty() {
            return Err(CoreError::Validation(
                "Effect catalog must contain at least one effect".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::with_capacity(effects.len());
        let mut normalized = Vec::with_capacity(effects.len());
        for (i, mut effect) in effects.into_iter().enumerate() {
            let id = effect.id.trim().to_string();
            if id.is_empty() {
                return Err(CoreError::Validation(format!(
                    "Effect at index {i} has an empty id"
                )));
            }
            if !seen.insert(id.clone()) {
                return Err(CoreError::Validation(format!("Duplicate effect id: \"{id}\"")));
            }
            effect.id = id;
            if effect.label.trim().is_empty() {
                effect.label = effect.id.clone();
            }
            normalized.push(effect);
        }

        Ok(Self {
            effects: normalized,
        })
    }

    /// Parse a JSON array of `{"id": ..., "label": ...}` objects.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let effects: Vec<Effect> = serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("Invalid effect catalog: {e}")))?;
        Self::new(effects)
    }

    /// The [`DEFAULT_EFFECT_ID`] entry if present, otherwise the first effect.
    pub fn default_effect(&self) -> &Effect {
        self.get(DEFAULT_EFFECT_ID).unwrap_or(&self.effects[0])
    }

    pub fn get(&self, id: &str) -> Option<&Effect> {
        self.effects.iter().find(|e| e.id == id)
    }

    /// Look up `id`, falling back to [`default_effect`](Self::default_effect).
    pub fn resolve(&self, id: &str) -> &Effect {
        self.get(id).unwrap_or_else(|| self.default_effect())
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl Default for EffectCatalog {
    fn default() -> Self {
        Self {
            effects: BUILTIN_EFFECTS
                .iter()
                .map(|(id, label)| Effect::new(*id, *label))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Decides which effect each job is rendered with.
#[derive(Debug)]
pub struct EffectPolicy {
    catalog: EffectCatalog,
    randomize: bool,
    rng: StdRng,
}

impl EffectPolicy {
    pub fn new(catalog: EffectCatalog) -> Self {
        Self::with_rng(catalog, StdRng::from_os_rng())
    }

    /// Deterministic policy for tests and reproducible runs.
    pub fn with_seed(catalog: EffectCatalog, seed: u64) -> Self {
        Self::with_rng(catalog, StdRng::seed_from_u64(seed))
    }

    fn with_rng(catalog: EffectCatalog, rng: StdRng) -> Self {
        Self {
            catalog,
            randomize: false,
            rng,
        }
    }

    pub fn is_randomizing(&self) -> bool {
        self.randomize
    }

    /// Record an enqueue that left `active_after` pending/processing jobs.
    ///
    /// Returns `true` only when this call switched randomization on.
    pub fn observe_enqueue(&mut self, active_after: usize) -> bool {
        if self.randomize || active_after < RANDOMIZE_THRESHOLD {
            return false;
        }
        self.randomize = true;
        true
    }

    /// Re-roll the job's effect if the current batch is randomized.
    pub fn assign_on_dequeue(&mut self, job: &mut Job) {
        if !self.randomize {
            return;
        }
        let effect = self.random_effect().clone();
        job.assign_effect(&effect);
    }

    /// Uniform pick from the catalog, with replacement.
    pub fn random_effect(&mut self) -> &Effect {
        let index = self.rng.random_range(0..self.catalog.len());
        &self.catalog.effects()[index]
    }

    /// End of batch: restore explicit-effect behaviour.
    pub fn reset(&mut self) {
        self.randomize = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
