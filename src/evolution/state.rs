//! Run state and its crash-safe persistence.
//!
//! The whole run, including every variant ever created, lives in one JSON
//! document per evolution id. Saves write a temporary sibling file and
//! rename it over the previous snapshot, so an interrupted save leaves the
//! last good snapshot untouched.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use super::elite::ElitePool;
use crate::schema::{
    BASELINE_ID, EvolutionConfig, EvolutionStatus, GenerationRecord, StopReason, Variant,
};

/// Complete state of one evolution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionState {
    /// Stable identifier for the run.
    pub evolution_id: String,
    /// Code the run started from.
    pub baseline_code: Option<String>,
    /// Where the baseline came from (file path, article, ...).
    #[serde(default)]
    pub source_reference: Option<String>,
    /// Configuration the run was started with.
    pub config_snapshot: serde_json::Value,
    /// Best variants seen so far.
    pub elite_pool: ElitePool,
    /// Every variant ever created, by id.
    pub all_variants: BTreeMap<String, Variant>,
    /// One record per completed generation.
    pub generation_history: Vec<GenerationRecord>,
    /// Last completed generation (0 before the first).
    pub current_generation: usize,
    pub generations_without_improvement: usize,
    pub status: EvolutionStatus,
    /// Mutation rate in effect for the last completed generation.
    #[serde(default)]
    pub current_mutation_rate: Option<f64>,
    /// Why the run stopped, once it has.
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attempted status change outside `initialized -> running -> {completed | failed}`.
#[derive(Debug, thiserror::Error)]
#[error("Invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: EvolutionStatus,
    pub to: EvolutionStatus,
}

impl EvolutionState {
    /// Create a fresh state. The baseline, when given, is recorded as
    /// variant [`BASELINE_ID`].
    pub fn new(
        evolution_id: impl Into<String>,
        baseline_code: Option<String>,
        source_reference: Option<String>,
        config: &EvolutionConfig,
    ) -> Self {
        let mut all_variants = BTreeMap::new();
        if let Some(code) = &baseline_code {
            let baseline = Variant::baseline(code.clone());
            all_variants.insert(baseline.id.clone(), baseline);
        }

        let now = Utc::now();
        Self {
            evolution_id: evolution_id.into(),
            baseline_code,
            source_reference,
            config_snapshot: serde_json::to_value(config).unwrap_or(serde_json::Value::Null),
            elite_pool: ElitePool::new(config.elite_pool_size.max(1)),
            all_variants,
            generation_history: Vec::new(),
            current_generation: 0,
            generations_without_improvement: 0,
            status: EvolutionStatus::Initialized,
            current_mutation_rate: None,
            stop_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, enforcing the legal lifecycle.
    pub fn transition(&mut self, next: EvolutionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn baseline(&self) -> Option<&Variant> {
        self.all_variants.get(BASELINE_ID)
    }

    pub fn get_variant(&self, id: &str) -> Option<&Variant> {
        self.all_variants.get(id)
    }

    /// Record a variant permanently. Existing entries are replaced, which is
    /// how an evaluation outcome gets attached.
    pub fn add_variant(&mut self, variant: Variant) {
        self.all_variants.insert(variant.id.clone(), variant);
    }

    pub fn last_record(&self) -> Option<&GenerationRecord> {
        self.generation_history.last()
    }

    /// Close out `generation` with the variants it produced.
    ///
    /// The generation best treats an unevaluated variant as fitness `0.0`.
    /// This only feeds the improvement comparison: a best that is not
    /// strictly above the previous record's best counts as stagnation, and
    /// an all-failed generation can therefore read as an improvement over a
    /// negative prior best.
    pub fn record_generation(&mut self, generation: usize, variants: &[Variant]) -> &GenerationRecord {
        let best = variants
            .iter()
            .map(|v| (v, v.fitness.unwrap_or(0.0)))
            .fold(None::<(&Variant, f64)>, |best, (v, f)| match best {
                Some((_, bf)) if bf >= f => best,
                _ => Some((v, f)),
            });
        let best_fitness = best.map(|(_, f)| f).unwrap_or(0.0);
        let best_variant_id = best.map(|(v, _)| v.id.clone());

        match self.last_record() {
            Some(previous) if best_fitness <= previous.best_fitness => {
                self.generations_without_improvement += 1;
            }
            _ => self.generations_without_improvement = 0,
        }

        self.generation_history.push(GenerationRecord {
            generation_num: generation,
            variant_ids: variants.iter().map(|v| v.id.clone()).collect(),
            best_fitness,
            best_variant_id,
            timestamp: Utc::now(),
        });
        self.current_generation = generation;
        self.touch();

        &self.generation_history[self.generation_history.len() - 1]
    }

    /// Variants produced in `generation`, in id order.
    pub fn generation_variants(&self, generation: usize) -> Vec<&Variant> {
        self.all_variants
            .values()
            .filter(|v| v.generation == generation)
            .collect()
    }

    /// Ancestor chain of `id` through first parents, starting with the
    /// variant itself and ending at the baseline (or the first unknown id).
    pub fn lineage(&self, id: &str) -> Vec<&Variant> {
        let mut chain = Vec::new();
        let mut cursor = self.all_variants.get(id);
        while let Some(variant) = cursor {
            if chain.iter().any(|v: &&Variant| v.id == variant.id) {
                break;
            }
            chain.push(variant);
            cursor = variant
                .parent_ids
                .first()
                .and_then(|parent| self.all_variants.get(parent));
        }
        chain
    }

    /// Variants that were never successfully evaluated, excluding the baseline.
    pub fn failed_variants(&self) -> Vec<&Variant> {
        self.all_variants
            .values()
            .filter(|v| !v.is_baseline() && !v.is_evaluated())
            .collect()
    }

    pub fn evaluated_count(&self) -> usize {
        self.all_variants.values().filter(|v| v.is_evaluated()).count()
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// State store errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Invalid state document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("No saved state for evolution {0}")]
    NotFound(String),
}

impl PersistenceError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One JSON document per evolution id under a state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Document path for an evolution id.
    pub fn path_for(&self, evolution_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", evolution_id))
    }

    /// Atomically overwrite the snapshot for `state`.
    pub fn save(&self, state: &EvolutionState) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(|e| PersistenceError::io(&self.dir, e))?;

        let path = self.path_for(&state.evolution_id);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state)?;

        if let Err(e) = write_synced(&tmp_path, &json) {
            let _ = fs::remove_file(&tmp_path);
            return Err(PersistenceError::io(&tmp_path, e));
        }
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(PersistenceError::io(&path, e));
        }

        debug!("Saved evolution state to {}", path.display());
        Ok(path)
    }

    /// Load the snapshot for an evolution id.
    pub fn load(&self, evolution_id: &str) -> Result<EvolutionState, PersistenceError> {
        let path = self.path_for(evolution_id);
        if !path.is_file() {
            return Err(PersistenceError::NotFound(evolution_id.to_string()));
        }
        Self::load_path(&path)
    }

    /// Load a snapshot from an explicit file.
    pub fn load_path<P: AsRef<Path>>(path: P) -> Result<EvolutionState, PersistenceError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
        serde_json::from_str(&content).map_err(|source| PersistenceError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Evolution ids with a saved snapshot, sorted.
    pub fn list(&self) -> Result<Vec<String>, PersistenceError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(&self.dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| PersistenceError::io(&self.dir, e))?.path();
            if path.extension().is_some_and(|e| e == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
