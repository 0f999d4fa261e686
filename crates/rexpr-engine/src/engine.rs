//! Engine facade.
//!
//! One [`Engine`] owns a state manager, a transaction coordinator, the
//! expression caches and the tracker registry. It is a cheap handle;
//! clones share everything.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::cache::ExpressionCache;
use crate::error::{EngineError, EngineResult, LifecycleError, PlaybackError};
use crate::expression::BoundExpression;
use crate::node::{Services, ShouldWatch};
use crate::options::EngineOptions;
use crate::playback::{self, Direction, PlaybackTarget};
use crate::state::StateManager;
use crate::tracker::{ChangeTracker, History, TrackerRegistry};
use crate::transaction::TransactionCoordinator;
use crate::value::{Key, Obj, Value};

struct EngineCore {
    options: EngineOptions,
    services: Rc<Services>,
    cache: Rc<ExpressionCache>,
    trackers: Rc<TrackerRegistry>,
    tracked_handles: Rc<RefCell<HashSet<u64>>>,
}

#[derive(Clone)]
pub struct Engine {
    core: Rc<EngineCore>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        let state = StateManager::new();
        let coordinator = TransactionCoordinator::new(options.max_settle_steps, options.max_commit_passes);
        coordinator.attach(&state);
        let services = Rc::new(Services {
            coordinator,
            state,
            deep_observation: options.deep_observation,
        });
        let cache = ExpressionCache::new(Rc::clone(&services));
        debug!(?options, "engine created");
        Self {
            core: Rc::new(EngineCore {
                options,
                services,
                cache,
                trackers: Rc::new(TrackerRegistry::default()),
                tracked_handles: Rc::new(RefCell::new(HashSet::new())),
            }),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.core.options
    }

    pub fn state(&self) -> &Rc<StateManager> {
        &self.core.services.state
    }

    fn coordinator(&self) -> &Rc<TransactionCoordinator> {
        &self.core.services.coordinator
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    /// Bind `source` to `context`. Every leaf container is deep-observed.
    pub fn create_expression(&self, context: &Obj, source: &str) -> EngineResult<BoundExpression> {
        self.create(context, source, None)
    }

    /// Bind `source` to `context`, deep-observing only the leaf slots
    /// `should_watch` accepts. Other bindings of the same pair keep their
    /// own predicates.
    pub fn create_expression_with(
        &self,
        context: &Obj,
        source: &str,
        should_watch: impl Fn(&Key, &Value) -> bool + 'static,
    ) -> EngineResult<BoundExpression> {
        let should_watch: ShouldWatch = Rc::new(should_watch);
        self.create(context, source, Some(should_watch))
    }

    fn create(&self, context: &Obj, source: &str, should_watch: Option<ShouldWatch>) -> EngineResult<BoundExpression> {
        let (root, lease) = self.core.cache.checkout_binding(context, source, should_watch)?;
        Ok(BoundExpression::new(root, lease, Rc::clone(&self.core.services)))
    }

    /// Write a slot through the engine's state manager.
    ///
    /// A rejected write (a list grown past [`crate::MAX_LIST_LEN`]) changes
    /// nothing and is reported through [`Engine::take_errors`].
    pub fn set_value(&self, context: &Obj, key: impl Into<Key>, value: impl Into<Value>) {
        let key = key.into();
        if let Err(error) = self.state().set_value(context, &key, value.into()) {
            warn!(context = %context.id(), key = %key, %error, "write rejected");
            self.coordinator().record_error(error.into());
        }
    }

    /// Run `f` as one change cycle: its writes settle together.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.state().batch(f)
    }

    // ── Tracking ──────────────────────────────────────────────────────────────

    /// Start recording change batches for `expression`.
    ///
    /// A handle can feed one live tracker at a time.
    pub fn create_change_tracker(&self, expression: &BoundExpression) -> EngineResult<ChangeTracker> {
        if expression.is_disposed() {
            return Err(LifecycleError::Disposed("bound expression").into());
        }
        let handle = expression.handle_id();
        if !self.core.tracked_handles.borrow_mut().insert(handle) {
            return Err(LifecycleError::AlreadyTracked(expression.id()).into());
        }
        let tracked = Rc::downgrade(&self.core.tracked_handles);
        Ok(ChangeTracker::new(
            expression.root(),
            &self.core.services,
            &self.core.trackers,
            self.core.options.history_limit,
            Box::new(move || {
                if let Some(tracked) = tracked.upgrade() {
                    tracked.borrow_mut().remove(&handle);
                }
            }),
        ))
    }

    /// Move every slot recorded in `history` to its value at `target`.
    ///
    /// Every live tracker is paused while the writes settle.
    pub fn play_forward(&self, target: PlaybackTarget, history: &History) -> Result<usize, PlaybackError> {
        self.play(target, Direction::Forward, history)
    }

    /// Move every slot recorded in `history` to its value just before
    /// `target`.
    pub fn play_backward(&self, target: PlaybackTarget, history: &History) -> Result<usize, PlaybackError> {
        self.play(target, Direction::Backward, history)
    }

    fn play(&self, target: PlaybackTarget, direction: Direction, history: &History) -> Result<usize, PlaybackError> {
        let writes = playback::plan(target, direction, history)?;
        self.core
            .trackers
            .with_paused(|| playback::apply(self.coordinator(), self.state(), writes))
    }

    // ── Coordination ──────────────────────────────────────────────────────────

    pub fn suspend(&self) {
        self.coordinator().suspend();
    }

    pub fn resume(&self) -> EngineResult<()> {
        self.coordinator().resume()
    }

    pub fn is_suspended(&self) -> bool {
        self.coordinator().is_suspended()
    }

    /// Commit everything pending and drain the scheduler.
    pub fn settle(&self) -> EngineResult<()> {
        self.coordinator().commit()
    }

    /// Errors raised by commit handlers since the last call.
    pub fn take_errors(&self) -> Vec<EngineError> {
        self.coordinator().take_errors()
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub fn binding_ref_count(&self, context: &Obj, source: &str) -> usize {
        self.core.cache.binding_ref_count(context, source)
    }

    pub fn parse_ref_count(&self, source: &str) -> usize {
        self.core.cache.parse_ref_count(source)
    }

    pub fn bound_context_count(&self) -> usize {
        self.core.cache.bound_context_count()
    }

    /// Roots with at least one live change tracker.
    pub fn tracked_root_count(&self) -> usize {
        self.core.trackers.hub_count()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.core.options)
            .field("bound_contexts", &self.bound_context_count())
            .finish()
    }
}
