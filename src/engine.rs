//! The shared retrieval engine.
//!
//! [`Engine`] owns the current [`Index`] and exposes every caller-facing
//! operation: search, reindex, loading and unloading an external corpus,
//! status, and the maintenance reports. One engine is shared (behind an
//! `Arc`) by the HTTP handlers, the watcher, and the CLI.
//!
//! # Concurrency
//!
//! The current index sits in an `RwLock<Arc<Index>>`. Readers clone the
//! `Arc` and drop the lock before doing any work, so a query always sees one
//! complete index. A rebuild lists chunks and builds the new index with no
//! lock held on the current one, then takes the write lock only to swap the
//! pointer. Rebuilds themselves are serialized by a separate mutex so two of
//! them can never swap out of order.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::anchors::AnchorStrategy;
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::index::{Index, IndexSettings, IndexStats};
use crate::maintenance::{self, CoverageReport, DuplicatePair, GroupPair, OrphanChunk};
use crate::models::{Origin, ScopeDescriptor, ScopeMode, SearchMode};
use crate::search::{self, RankingParams, SearchRequest, SearchResponse};
use crate::sources::{ChunkSource, FilesystemSource};
use crate::watcher::{WatchState, WatcherStatus};

/// Caller-facing search parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub query: String,
    /// Defaults to `[retrieval].top_n`.
    pub top_n: Option<usize>,
    pub mode: SearchMode,
    /// Rebuild for this scope first if it differs from the current one.
    pub scope: Option<ScopeOverride>,
    /// Only score chunks from these groups.
    pub groups: Option<Vec<String>>,
    /// Groups boosted in explore mode.
    pub boost: Vec<String>,
    pub explain: bool,
}

impl SearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

/// A requested scope, resolved against the active source.
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeOverride {
    pub mode: ScopeMode,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub chunks: usize,
    pub groups: usize,
    pub vocabulary: usize,
    pub scope_mode: ScopeMode,
    pub origin: Origin,
    pub included_groups: Vec<String>,
    pub built_at: DateTime<Utc>,
    pub build_duration_ms: u64,
    pub anchor_strategy: AnchorStrategy,
    pub watcher: WatcherStatus,
    pub last_error: Option<String>,
}

/// Why a rebuild was requested; decides what happens on a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
    /// Watcher tick: skipped when paused or the source is no longer active.
    Tick,
    /// Reindex or scope override: fails if the active source changed meanwhile.
    Refresh,
    /// Load or unload: makes the given source the active one.
    Switch,
}

pub struct Engine {
    config: Config,
    index_settings: IndexSettings,
    ranking: RankingParams,
    default_source: Arc<dyn ChunkSource>,
    active_source: RwLock<Arc<dyn ChunkSource>>,
    current: RwLock<Arc<Index>>,
    build_lock: Mutex<()>,
    watch: WatchState,
    last_error: Mutex<Option<String>>,
}

impl Engine {
    /// An engine over the configured filesystem corpus, with an empty index.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let source = FilesystemSource::new(&config.corpus, config.chunking.max_tokens)?;
        Ok(Self::with_source(config, Arc::new(source)))
    }

    /// Like [`Engine::new`], followed by an initial build of the default scope.
    pub fn open(config: Config) -> anyhow::Result<Self> {
        let engine = Self::new(config)?;
        engine.reindex(None)?;
        Ok(engine)
    }

    /// An engine over any chunk source, with an empty index.
    pub fn with_source(config: Config, source: Arc<dyn ChunkSource>) -> Self {
        let index_settings = config.index_settings();
        let ranking = config.ranking_params();
        let empty = Index::empty(ScopeDescriptor::new(Vec::new(), ScopeMode::All, source.origin()));
        Self {
            config,
            index_settings,
            ranking,
            active_source: RwLock::new(source.clone()),
            default_source: source,
            current: RwLock::new(Arc::new(empty)),
            build_lock: Mutex::new(()),
            watch: WatchState::default(),
            last_error: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The index queries currently read.
    pub fn current(&self) -> Arc<Index> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn watch(&self) -> &WatchState {
        &self.watch
    }

    pub(crate) fn active_source(&self) -> Arc<dyn ChunkSource> {
        self.active_source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Search the current index.
    ///
    /// A missing query or `top_n == 0` is invalid input; a query that
    /// normalizes to nothing returns an empty response.
    pub fn search(&self, opts: &SearchOptions) -> Result<SearchResponse> {
        if opts.query.trim().is_empty() {
            return Err(EngineError::InvalidInput("query must not be empty".to_string()));
        }
        let top_n = opts.top_n.unwrap_or(self.config.retrieval.top_n);
        if top_n == 0 {
            return Err(EngineError::InvalidInput("top_n must be >= 1".to_string()));
        }

        if let Some(requested) = &opts.scope {
            let source = self.active_source();
            let scope = self.resolve_override(source.as_ref(), requested)?;
            if scope != *self.current().scope() {
                debug!(mode = %scope.mode, groups = scope.included_groups.len(), "Rebuilding for scope override");
                self.rebuild(source, scope, BuildKind::Refresh)?;
            }
        }

        let index = self.current();
        let req = SearchRequest {
            query: &opts.query,
            top_n,
            mode: opts.mode,
            group_filter: opts.groups.as_deref().filter(|g| !g.is_empty()),
            boosted_groups: &opts.boost,
            explain: opts.explain,
        };
        let response = search::search(&index, &req, &self.ranking);
        debug!(
            query = %opts.query,
            mode = %response.mode,
            results = response.results.len(),
            margin = response.margin,
            "Search complete"
        );
        Ok(response)
    }

    /// Rebuild the active corpus, for `scope` or its default scope.
    pub fn reindex(&self, scope: Option<&ScopeOverride>) -> Result<IndexStats> {
        let source = self.active_source();
        let scope = match scope {
            Some(requested) => self.resolve_override(source.as_ref(), requested)?,
            None => source.resolve_scope().map_err(|e| self.build_failed(e))?,
        };
        self.rebuild(source, scope, BuildKind::Refresh)?
            .ok_or_else(|| EngineError::Build("rebuild was skipped".to_string()))
    }

    /// Index the corpus at `path` in place of the default one.
    ///
    /// Pauses the watcher. On failure the previous index stays current and
    /// the watcher returns to its prior state.
    pub fn load_external(&self, path: &Path, display_name: Option<&str>) -> Result<IndexStats> {
        if path.as_os_str().is_empty() {
            return Err(EngineError::InvalidInput("path must not be empty".to_string()));
        }
        if !path.exists() {
            return Err(EngineError::NotFound(format!(
                "external corpus '{}' does not exist",
                path.display()
            )));
        }

        let was_paused = self.watch.is_paused();
        self.watch.pause();

        let result = FilesystemSource::external(
            path,
            display_name,
            &self.config.corpus,
            self.config.chunking.max_tokens,
        )
        .map_err(|e| EngineError::InvalidInput(format!("{:#}", e)))
        .and_then(|source| {
            let source: Arc<dyn ChunkSource> = Arc::new(source);
            let scope = source.resolve_scope().map_err(|e| self.build_failed(e))?;
            self.rebuild(source, scope, BuildKind::Switch)
        });

        match result {
            Ok(Some(stats)) => {
                info!(path = %path.display(), chunks = stats.chunks, "External corpus loaded");
                Ok(stats)
            }
            Ok(None) => Err(EngineError::Build("rebuild was skipped".to_string())),
            Err(e) => {
                if !was_paused {
                    self.watch.resume();
                }
                Err(e)
            }
        }
    }

    /// Return to the default corpus and resume the watcher.
    ///
    /// On failure the external corpus stays loaded and the watcher paused.
    pub fn unload(&self) -> Result<IndexStats> {
        let source = self.default_source.clone();
        let scope = source.resolve_scope().map_err(|e| self.build_failed(e))?;
        let stats = self
            .rebuild(source, scope, BuildKind::Switch)?
            .ok_or_else(|| EngineError::Build("rebuild was skipped".to_string()))?;
        // The rebuild recorded a fresh fingerprint of the default corpus.
        self.watch.unpause();
        info!(chunks = stats.chunks, "Default corpus restored");
        Ok(stats)
    }

    pub fn status(&self) -> EngineStatus {
        let index = self.current();
        let scope = index.scope();
        EngineStatus {
            chunks: index.len(),
            groups: index.groups().len(),
            vocabulary: index.vocabulary_size(),
            scope_mode: scope.mode,
            origin: scope.origin,
            included_groups: scope.included_groups.clone(),
            built_at: index.built_at(),
            build_duration_ms: index.build_duration().as_millis() as u64,
            anchor_strategy: index.anchor_strategy(),
            watcher: self.watch.status(),
            last_error: self.last_error_slot().clone(),
        }
    }

    pub fn find_duplicates(
        &self,
        threshold: Option<f64>,
        top_n: Option<usize>,
        exclude_shared_names: bool,
    ) -> Result<Vec<DuplicatePair>> {
        let threshold = check_threshold(threshold.unwrap_or(self.config.maintenance.duplicate_threshold))?;
        let top_n = self.report_limit(top_n)?;
        Ok(maintenance::find_duplicates(
            &self.current(),
            threshold,
            top_n,
            exclude_shared_names,
        ))
    }

    pub fn find_orphans(&self, threshold: Option<f64>, top_n: Option<usize>) -> Result<Vec<OrphanChunk>> {
        let threshold = check_threshold(threshold.unwrap_or(self.config.maintenance.orphan_threshold))?;
        let top_n = self.report_limit(top_n)?;
        Ok(maintenance::find_orphans(&self.current(), threshold, top_n))
    }

    pub fn coverage(&self, group: &str) -> Result<CoverageReport> {
        if group.trim().is_empty() {
            return Err(EngineError::InvalidInput("group must not be empty".to_string()));
        }
        maintenance::coverage(
            &self.current(),
            group,
            self.config.maintenance.weak_coverage_threshold,
        )
    }

    pub fn group_similarity(&self) -> Vec<GroupPair> {
        maintenance::group_similarity(&self.current())
    }

    /// Re-resolve `scope` against the source's present groups.
    ///
    /// Only `all` scopes change: new top-level groups join, removed ones leave.
    pub(crate) fn refresh_scope(
        &self,
        source: &dyn ChunkSource,
        scope: &ScopeDescriptor,
    ) -> Result<ScopeDescriptor> {
        match scope.mode {
            ScopeMode::All => Ok(ScopeDescriptor::new(
                source.groups().map_err(|e| self.build_failed(e))?,
                ScopeMode::All,
                source.origin(),
            )),
            _ => Ok(scope.clone()),
        }
    }

    /// Build a new index for `scope` from `source` and make it current.
    ///
    /// Returns `Ok(None)` when a watcher tick finds it has nothing to do.
    pub(crate) fn rebuild(
        &self,
        source: Arc<dyn ChunkSource>,
        scope: ScopeDescriptor,
        kind: BuildKind,
    ) -> Result<Option<IndexStats>> {
        let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let is_active = same_source(&source, &self.active_source());
        match kind {
            BuildKind::Tick if self.watch.is_paused() || !is_active => return Ok(None),
            BuildKind::Refresh if !is_active => {
                return Err(EngineError::Build(
                    "the active corpus changed during the rebuild".to_string(),
                ));
            }
            _ => {}
        }

        let signature = match source.origin() {
            Origin::Default => source.signature(&scope).ok(),
            Origin::External => None,
        };

        let chunks = source.list_chunks(&scope).map_err(|e| self.build_failed(e))?;

        let origin = scope.origin;
        let index = Index::build(chunks, scope, &self.index_settings);
        let stats = index.stats();

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(index);
        if kind == BuildKind::Switch {
            *self
                .active_source
                .write()
                .unwrap_or_else(PoisonError::into_inner) = source;
        }
        *self.last_error_slot() = None;
        if let Some(signature) = signature {
            self.watch.record(signature);
        }

        info!(
            chunks = stats.chunks,
            groups = stats.groups,
            vocabulary = stats.vocabulary,
            duration_ms = stats.duration_ms,
            origin = %origin,
            "Index rebuilt"
        );
        Ok(Some(stats))
    }

    fn resolve_override(&self, source: &dyn ChunkSource, requested: &ScopeOverride) -> Result<ScopeDescriptor> {
        let origin = source.origin();
        match requested.mode {
            ScopeMode::All => Ok(ScopeDescriptor::new(
                source.groups().map_err(|e| self.build_failed(e))?,
                ScopeMode::All,
                origin,
            )),
            ScopeMode::Active => {
                if origin == Origin::External {
                    return Err(EngineError::InvalidInput(
                        "an external corpus has no active scope".to_string(),
                    ));
                }
                source.resolve_scope().map_err(|e| self.build_failed(e))
            }
            ScopeMode::Explicit => {
                if requested.groups.is_empty() {
                    return Err(EngineError::InvalidInput(
                        "an explicit scope needs at least one group".to_string(),
                    ));
                }
                let known = source.groups().map_err(|e| self.build_failed(e))?;
                if let Some(missing) = requested.groups.iter().find(|g| !known.contains(g)) {
                    return Err(EngineError::NotFound(format!("group '{}' does not exist", missing)));
                }
                Ok(ScopeDescriptor::new(requested.groups.clone(), ScopeMode::Explicit, origin))
            }
        }
    }

    fn report_limit(&self, top_n: Option<usize>) -> Result<usize> {
        match top_n.unwrap_or(self.config.maintenance.top_n) {
            0 => Err(EngineError::InvalidInput("top_n must be >= 1".to_string())),
            n => Ok(n),
        }
    }

    /// Record a failed rebuild; the current index is left untouched.
    pub(crate) fn build_failed(&self, err: anyhow::Error) -> EngineError {
        let message = format!("{:#}", err);
        warn!(error = %message, "Rebuild failed; keeping the previous index");
        *self.last_error_slot() = Some(message.clone());
        EngineError::Build(message)
    }

    fn last_error_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_threshold(threshold: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(EngineError::InvalidInput(format!(
            "threshold must be in [0.0, 1.0], got {}",
            threshold
        )))
    }
}

fn same_source(a: &Arc<dyn ChunkSource>, b: &Arc<dyn ChunkSource>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
