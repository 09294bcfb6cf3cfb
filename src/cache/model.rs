//! Keyed cache of trained models backed by on-disk artifacts
//!
//! Each key owns a slot that is either unloaded or holds a shared
//! `Arc<TrainedModel>`. The first caller to miss on a key marks the slot as
//! filling and loads or trains outside the lock; concurrent callers for the
//! same key wait on the slot's condition variable and then observe its
//! model. Waiters keep checking their own deadline and cancel flag, and
//! readers such as [`ModelCache::state`] never wait. Different keys never
//! block each other beyond the brief map lookup.

use crate::classifier::{ClassifierConfig, TrainedModel};
use crate::core::{ClassifierError, Result, TrainingControl};
use crate::persistence::ModelArtifact;
use crate::schema::FeatureSchema;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Identifier of one cached model, also its artifact file stem
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an existing key, accepting only file-name safe characters
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ClassifierError::InvalidParameter(format!(
                "invalid cache key {key:?}"
            )));
        }
        Ok(Self(key))
    }

    /// `<schema-slug>-<algorithm>-<hash>`, where the hash covers the schema
    /// fingerprint and version, the hyperparameters and the data version
    pub fn derive(
        schema: &FeatureSchema,
        config: &ClassifierConfig,
        data_version: Option<&str>,
    ) -> Result<Self> {
        let hyperparameters = serde_json::to_string(config).map_err(|e| {
            ClassifierError::InvalidParameter(format!("unserializable hyperparameters: {e}"))
        })?;

        let mut hasher = Sha256::new();
        hasher.update(schema.fingerprint()?.as_bytes());
        hasher.update(schema.version.to_le_bytes());
        hasher.update(hyperparameters.as_bytes());
        match data_version {
            Some(version) => {
                hasher.update([1u8]);
                hasher.update(version.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        let digest = hex::encode(hasher.finalize());

        Ok(Self(format!(
            "{}-{}-{}",
            schema.slug(),
            config.kind(),
            &digest[..16]
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces the model for one cache key when no usable artifact exists
pub trait ModelTrainer: Send + Sync {
    /// Key under which this trainer's model is cached
    fn cache_key(&self) -> Result<CacheKey>;

    /// Load data, fit and evaluate a fresh model
    fn train(&self, key: &CacheKey, control: &TrainingControl) -> Result<TrainedModel>;
}

/// State of a key's slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Unloaded,
    Ready,
}

/// Where an acquired model came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOrigin {
    /// Already resident in this process
    Memory,
    /// Read from the artifact file
    Loaded,
    /// Trained by this call
    Trained,
}

/// Result of [`ModelCache::acquire`]
#[derive(Debug)]
pub struct Acquired {
    pub model: Arc<TrainedModel>,
    pub origin: ModelOrigin,
    /// Set when a freshly trained model could not be written to disk; the
    /// model is still served from memory
    pub persist_error: Option<ClassifierError>,
}

/// Longest a waiting caller sleeps before re-checking its own control
const WAIT_SLICE: Duration = Duration::from_millis(25);

#[derive(Default)]
struct SlotState {
    model: Option<Arc<TrainedModel>>,
    /// A caller is loading or training this key
    filling: bool,
    /// Why the resident model has no artifact on disk
    persist_error: Option<String>,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    filled: Condvar,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        lock(&self.state)
    }
}

/// Clears the filling flag and wakes waiters when the filling caller is
/// done, including on error or panic
struct FillGuard<'a> {
    slot: &'a Slot,
}

impl Drop for FillGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().filling = false;
        self.slot.filled.notify_all();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panicking trainer never leaves a half-published model behind
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Model cache rooted at a directory of `<key>.json` artifacts
pub struct ModelCache {
    dir: PathBuf,
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
}

impl ModelCache {
    /// Create a cache over `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn slot(&self, key: &CacheKey) -> Arc<Slot> {
        let mut slots = lock(&self.slots);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    fn existing_slot(&self, key: &CacheKey) -> Option<Arc<Slot>> {
        lock(&self.slots).get(key).cloned()
    }

    /// Get the trainer's model, loading or training it on a miss
    pub fn acquire(&self, trainer: &dyn ModelTrainer) -> Result<Acquired> {
        self.acquire_with_control(trainer, &TrainingControl::new())
    }

    /// Like [`acquire`](Self::acquire), giving up after `timeout`
    pub fn acquire_with_timeout(
        &self,
        trainer: &dyn ModelTrainer,
        timeout: Duration,
    ) -> Result<Acquired> {
        self.acquire_with_control(trainer, &TrainingControl::with_timeout(timeout))
    }

    /// Like [`acquire`](Self::acquire), with training governed by `control`.
    ///
    /// If another caller is already filling the slot, this one waits for it
    /// but still honours its own deadline and cancel flag. If training
    /// fails, is cancelled or times out, the slot stays unloaded and the
    /// error is returned.
    pub fn acquire_with_control(
        &self,
        trainer: &dyn ModelTrainer,
        control: &TrainingControl,
    ) -> Result<Acquired> {
        let key = trainer.cache_key()?;
        let slot = self.slot(&key);

        let mut state = slot.lock();
        loop {
            if let Some(model) = &state.model {
                return Ok(Acquired {
                    model: Arc::clone(model),
                    origin: ModelOrigin::Memory,
                    persist_error: None,
                });
            }
            if !state.filling {
                break;
            }
            control.checkpoint()?;
            let wait = control
                .remaining()
                .map_or(WAIT_SLICE, |left| left.min(WAIT_SLICE));
            state = slot
                .filled
                .wait_timeout(state, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.filling = true;
        drop(state);

        let _filling = FillGuard { slot: &slot };
        let acquired = self.fill(&key, trainer, control)?;

        let mut state = slot.lock();
        state.model = Some(Arc::clone(&acquired.model));
        state.persist_error = acquired.persist_error.as_ref().map(|e| e.to_string());
        Ok(acquired)
    }

    /// Load or train the model for `key` without holding the slot lock
    fn fill(
        &self,
        key: &CacheKey,
        trainer: &dyn ModelTrainer,
        control: &TrainingControl,
    ) -> Result<Acquired> {
        if let Some(model) = self.load_artifact(key) {
            return Ok(Acquired {
                model: Arc::new(model),
                origin: ModelOrigin::Loaded,
                persist_error: None,
            });
        }

        info!("Training model for cache key {key}");
        let mut model = trainer.train(key, control)?;
        model.metadata.cache_key = key.to_string();
        let model = Arc::new(model);

        let persist_error = self.write_artifact(key, &model).err();
        if let Some(err) = &persist_error {
            warn!("Model {key} kept in memory only: {err}");
        }

        Ok(Acquired {
            model,
            origin: ModelOrigin::Trained,
            persist_error,
        })
    }

    /// Read the artifact for `key`; any failure means "retrain"
    fn load_artifact(&self, key: &CacheKey) -> Option<TrainedModel> {
        let path = self.artifact_path(key);
        if !path.exists() {
            debug!("No artifact at {path:?}");
            return None;
        }

        match ModelArtifact::load_from_file(&path) {
            Ok(artifact) if artifact.model.metadata.cache_key == key.as_str() => {
                info!("Loaded model {key} from {path:?}");
                Some(artifact.model)
            }
            Ok(artifact) => {
                warn!(
                    "Artifact {path:?} belongs to key {}, retraining",
                    artifact.model.metadata.cache_key
                );
                None
            }
            Err(err) => {
                warn!("Unusable artifact for {key}, retraining: {err}");
                None
            }
        }
    }

    fn write_artifact(&self, key: &CacheKey, model: &TrainedModel) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| ClassifierError::persistence(&self.dir, e))?;
        let path = self.artifact_path(key);
        ModelArtifact::new(model.clone()).save_to_file(&path)?;
        debug!("Persisted model {key} to {path:?}");
        Ok(())
    }

    /// Write the resident model for `key` to disk again.
    ///
    /// Fails with `NotResident` when no model is held for `key`.
    pub fn persist(&self, key: &CacheKey) -> Result<()> {
        let slot = self
            .existing_slot(key)
            .ok_or_else(|| ClassifierError::NotResident(key.to_string()))?;
        let model = slot
            .lock()
            .model
            .clone()
            .ok_or_else(|| ClassifierError::NotResident(key.to_string()))?;

        let written = self.write_artifact(key, &model);
        let mut state = slot.lock();
        if state.model.as_ref().is_some_and(|m| Arc::ptr_eq(m, &model)) {
            state.persist_error = written.as_ref().err().map(|e| e.to_string());
        }
        written
    }

    /// Last write failure for the resident model of `key`, cleared once
    /// [`persist`](Self::persist) succeeds
    pub fn persist_error(&self, key: &CacheKey) -> Option<String> {
        self.existing_slot(key)?.lock().persist_error.clone()
    }

    /// `Ready` once a model is resident; a key that is still being loaded
    /// or trained reports `Unloaded` without waiting
    pub fn state(&self, key: &CacheKey) -> CacheState {
        match self.get(key) {
            Some(_) => CacheState::Ready,
            None => CacheState::Unloaded,
        }
    }

    /// Resident model for `key`, without loading, training or waiting
    pub fn get(&self, key: &CacheKey) -> Option<Arc<TrainedModel>> {
        self.existing_slot(key)?.lock().model.clone()
    }

    /// Drop the resident model and delete its artifact.
    ///
    /// Waits for an in-flight load or training run on the same key. Returns
    /// whether anything was removed.
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let mut removed = false;

        if let Some(slot) = self.existing_slot(key) {
            let mut state = slot.lock();
            while state.filling {
                state = slot
                    .filled
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            removed |= state.model.take().is_some();
            state.persist_error = None;
        }

        let path = self.artifact_path(key);
        match fs::remove_file(&path) {
            Ok(()) => removed = true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ClassifierError::persistence(path, e)),
        }

        if removed {
            info!("Invalidated model {key}");
        }
        Ok(removed)
    }
}
