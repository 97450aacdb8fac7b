use std::sync::{Arc, LazyLock, Mutex, Weak};

use slotmap::{SlotMap, new_key_type};
use tracing::info;

use super::EngineInner;
use crate::error::Result;
use crate::lock;

new_key_type! {
    /// Identifies one engine within its [`Supervisor`].
    pub struct EngineKey;
}

struct Registry {
    background: bool,
    engines: SlotMap<EngineKey, Weak<EngineInner>>,
}

/// Tracks live engines so one switch can start or stop every scan worker.
///
/// Registration, unregistration and the background toggle all run under
/// one lock, so an engine created while the toggle flips ends up in the
/// same state as every other engine.
pub struct Supervisor {
    registry: Mutex<Registry>,
}

static GLOBAL: LazyLock<Arc<Supervisor>> = LazyLock::new(|| Arc::new(Supervisor::new(true)));

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = lock(&self.registry);
        f.debug_struct("Supervisor")
            .field("background", &registry.background)
            .field("engines", &registry.engines.len())
            .finish()
    }
}

impl Supervisor {
    pub fn new(background: bool) -> Self {
        Self {
            registry: Mutex::new(Registry {
                background,
                engines: SlotMap::with_key(),
            }),
        }
    }

    /// The process-wide supervisor engines use unless given another.
    pub fn global() -> Arc<Supervisor> {
        Arc::clone(&GLOBAL)
    }

    pub fn background_scheduling(&self) -> bool {
        lock(&self.registry).background
    }

    /// Starts or stops the scan worker of every registered engine. Failures
    /// go to each engine's error reporter once.
    pub fn set_background_scheduling(&self, background: bool) {
        let mut registry = lock(&self.registry);
        if registry.background == background {
            return;
        }
        registry.background = background;
        info!(background, engines = registry.engines.len(), "background scheduling toggled");

        for inner in registry.engines.values().filter_map(Weak::upgrade) {
            if !background {
                // Reports its own failures.
                let _ = inner.stop_worker();
            } else if let Err(err) = inner.start_worker() {
                inner.report(&err);
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn register(&self, inner: &Arc<EngineInner>) -> Result<EngineKey> {
        let mut registry = lock(&self.registry);
        let key = registry.engines.insert(Arc::downgrade(inner));
        if registry.background
            && let Err(err) = inner.start_worker()
        {
            registry.engines.remove(key);
            return Err(err);
        }
        Ok(key)
    }

    /// Stops the engine's worker, then forgets the engine.
    pub(crate) fn unregister(&self, key: EngineKey, inner: &EngineInner) -> Result<()> {
        let mut registry = lock(&self.registry);
        let stopped = inner.stop_worker();
        registry.engines.remove(key);
        stopped
    }
}
