use crate::compiler::{ModuleCompiler, TrainingSource};
use chrono::{DateTime, Utc};
use overseer_agent::{CompiledModule, SIGNATURE_VERSION};
use overseer_core::{OverseerError, OverseerResult, TrainingExample};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const MODULE_FILE: &str = "routing_module.json";
const META_FILE: &str = "routing_module.meta.json";

/// Lifecycle of the compiled module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    /// The published module matches the current training set.
    Fresh,
    /// The training set changed, or nothing was checked yet.
    Stale,
    /// A recompilation is in flight; readers get the last fresh module.
    Compiling,
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleState::Fresh => write!(f, "fresh"),
            ModuleState::Stale => write!(f, "stale"),
            ModuleState::Compiling => write!(f, "compiling"),
        }
    }
}

/// Sidecar describing the module blob on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMeta {
    /// Cache key of the module blob.
    pub signature_hash: String,
    /// Optimizer that built it.
    pub optimizer: String,
    /// Compilation time.
    pub created_at: DateTime<Utc>,
}

struct Slot {
    state: ModuleState,
    /// Bumped by every invalidation; a compilation only publishes `Fresh`
    /// if no invalidation happened while it ran.
    generation: u64,
    current: Option<Arc<CompiledModule>>,
}

/// Cache key of a compiled module: training examples, optimizer and
/// signature version.
pub fn signature_hash(examples: &[TrainingExample], optimizer: &str) -> OverseerResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(SIGNATURE_VERSION.as_bytes());
    hasher.update([0u8]);
    hasher.update(optimizer.as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(examples)?);
    Ok(hex::encode(hasher.finalize()))
}

/// Process-wide cache of the compiled routing module.
///
/// Staleness is detected lazily: the first [`ModuleCache::get_or_compile`]
/// after an invalidation recompiles, while concurrent callers keep using
/// the last fresh module. The blob is written before its sidecar, so a
/// sidecar on disk always describes a complete blob.
pub struct ModuleCache {
    dir: Option<PathBuf>,
    slot: RwLock<Slot>,
    compile_lock: Mutex<()>,
}

impl ModuleCache {
    /// A cache persisted under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_dir(Some(dir.into()))
    }

    /// A cache that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_dir(None)
    }

    fn with_dir(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            slot: RwLock::new(Slot {
                state: ModuleState::Stale,
                generation: 0,
                current: None,
            }),
            compile_lock: Mutex::new(()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModuleState {
        self.slot.read().state
    }

    /// The last fresh module, if any.
    pub fn current(&self) -> Option<Arc<CompiledModule>> {
        self.slot.read().current.clone()
    }

    /// Mark the module stale and drop its sidecar. Never recompiles.
    pub async fn invalidate(&self) -> OverseerResult<()> {
        {
            let mut slot = self.slot.write();
            slot.generation += 1;
            if slot.state == ModuleState::Fresh {
                slot.state = ModuleState::Stale;
            }
        }
        if let Some(dir) = &self.dir {
            match tokio::fs::remove_file(dir.join(META_FILE)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!("Compiled routing module marked stale");
        Ok(())
    }

    /// The module to route with, recompiling if the cache is stale.
    ///
    /// While another caller compiles, returns the last fresh module, or
    /// waits for the compilation if there is none. A failed compilation
    /// falls back to the last fresh module, else fails with
    /// [`OverseerError::Compilation`].
    pub async fn get_or_compile(
        &self,
        source: &dyn TrainingSource,
        compiler: &dyn ModuleCompiler,
    ) -> OverseerResult<Arc<CompiledModule>> {
        loop {
            let fresh = {
                let slot = self.slot.read();
                match (&slot.state, &slot.current) {
                    (ModuleState::Fresh, Some(module)) => Some(Arc::clone(module)),
                    _ => None,
                }
            };
            if let Some(module) = fresh {
                let Some(dir) = &self.dir else {
                    return Ok(module);
                };
                // Another process may have changed the training set since.
                if sidecar_matches(dir, &module).await {
                    return Ok(module);
                }
                self.mark_stale(&module);
            }

            let guard = match self.compile_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    if let Some(module) = self.current() {
                        debug!("Compilation in flight, using last fresh module");
                        return Ok(module);
                    }
                    // Nothing to serve yet: wait for the in-flight compilation, then re-check.
                    drop(self.compile_lock.lock().await);
                    continue;
                }
            };

            let result = self.refresh(source, compiler).await;
            drop(guard);
            return result;
        }
    }

    /// Demote `module` after its sidecar vanished or changed on disk.
    fn mark_stale(&self, module: &Arc<CompiledModule>) {
        let mut slot = self.slot.write();
        let still_current = slot
            .current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, module));
        if slot.state == ModuleState::Fresh && still_current {
            slot.generation += 1;
            slot.state = ModuleState::Stale;
            info!(hash = %module.signature_hash, "Compiled module sidecar changed on disk, marking stale");
        }
    }

    async fn refresh(
        &self,
        source: &dyn TrainingSource,
        compiler: &dyn ModuleCompiler,
    ) -> OverseerResult<Arc<CompiledModule>> {
        let generation = {
            let mut slot = self.slot.write();
            if slot.state == ModuleState::Fresh {
                if let Some(module) = &slot.current {
                    return Ok(Arc::clone(module));
                }
            }
            slot.state = ModuleState::Compiling;
            slot.generation
        };

        match self.build(source, compiler).await {
            Ok(module) => {
                let module = Arc::new(module);
                let mut slot = self.slot.write();
                slot.current = Some(Arc::clone(&module));
                slot.state = if slot.generation == generation {
                    ModuleState::Fresh
                } else {
                    ModuleState::Stale
                };
                Ok(module)
            }
            Err(e) => {
                let mut slot = self.slot.write();
                slot.state = ModuleState::Stale;
                match &slot.current {
                    Some(module) => {
                        warn!(error = %e, "Module compilation failed, keeping last fresh module");
                        Ok(Arc::clone(module))
                    }
                    None => {
                        error!(error = %e, "Module compilation failed with no module to fall back to");
                        Err(match e {
                            OverseerError::Compilation(_) => e,
                            other => OverseerError::Compilation(other.to_string()),
                        })
                    }
                }
            }
        }
    }

    async fn build(
        &self,
        source: &dyn TrainingSource,
        compiler: &dyn ModuleCompiler,
    ) -> OverseerResult<CompiledModule> {
        let examples = source.load().await?;
        let hash = signature_hash(&examples, compiler.name())?;

        if let Some(dir) = &self.dir {
            if let Some(module) = load_matching(dir, &hash, compiler.name()).await {
                debug!(hash = %hash, "Loaded compiled module from disk");
                return Ok(module);
            }
        }

        let start = Instant::now();
        info!(
            optimizer = compiler.name(),
            examples = examples.len(),
            "Compiling routing module"
        );
        let module = compiler.compile(&examples, &hash).await?;
        info!(
            optimizer = compiler.name(),
            demos = module.demos.len(),
            validation_score = module.validation_score,
            duration_ms = start.elapsed().as_millis() as u64,
            "Routing module compiled"
        );

        if let Some(dir) = &self.dir {
            persist(dir, &module).await?;
        }
        Ok(module)
    }
}

async fn sidecar_matches(dir: &Path, module: &CompiledModule) -> bool {
    let Ok(bytes) = tokio::fs::read(dir.join(META_FILE)).await else {
        return false;
    };
    serde_json::from_slice::<ModuleMeta>(&bytes).is_ok_and(|meta| {
        meta.signature_hash == module.signature_hash && meta.optimizer == module.optimizer
    })
}

async fn load_matching(dir: &Path, hash: &str, optimizer: &str) -> Option<CompiledModule> {
    let meta_bytes = tokio::fs::read(dir.join(META_FILE)).await.ok()?;
    let meta: ModuleMeta = serde_json::from_slice(&meta_bytes).ok()?;
    if meta.signature_hash != hash || meta.optimizer != optimizer {
        return None;
    }
    let blob = tokio::fs::read(dir.join(MODULE_FILE)).await.ok()?;
    let module: CompiledModule = serde_json::from_slice(&blob).ok()?;
    (module.signature_hash == hash).then_some(module)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> OverseerResult<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn persist(dir: &Path, module: &CompiledModule) -> OverseerResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    write_atomic(&dir.join(MODULE_FILE), &serde_json::to_vec_pretty(module)?).await?;
    let meta = ModuleMeta {
        signature_hash: module.signature_hash.clone(),
        optimizer: module.optimizer.clone(),
        created_at: module.created_at,
    };
    write_atomic(&dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?).await
}
