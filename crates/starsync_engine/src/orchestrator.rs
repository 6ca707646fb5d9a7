//! Load orchestrator state machine.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::loaders::{standard_pipeline, LoadContext, Loader, Tier};
use crate::reconcile::{ReconciliationReport, Reconciler, ReconciliationSpec};
use crate::schema;
use crate::session::StoreSession;
use crate::watermark::SyncStateTracker;
use parking_lot::RwLock;
use starsync_store::{ReadStore, WriteStore};
use std::fmt;
use std::time::{Duration, Instant};
use time::{OffsetDateTime, PrimitiveDateTime};

/// Which rows a run reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Every source row.
    Full,
    /// Only rows after each table's watermark; bridges are always full.
    Incremental,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Full => f.write_str("full"),
            LoadMode::Incremental => f.write_str("incremental"),
        }
    }
}

/// The current state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run has started.
    Idle,
    /// Creating tables, the sync-state table and indexes.
    Preparing,
    /// Loading dimensions.
    LoadingDimensions,
    /// Loading bridges.
    LoadingBridges,
    /// Loading facts.
    LoadingFacts,
    /// Comparing source and target.
    Reconciling,
    /// The last run completed.
    Completed,
    /// The last run failed.
    Error,
}

impl RunState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, RunState::Idle | RunState::Completed | RunState::Error)
    }

    /// Returns true if a new run may start.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }

    fn loading(tier: Tier) -> Self {
        match tier {
            Tier::Dimension => RunState::LoadingDimensions,
            Tier::Bridge => RunState::LoadingBridges,
            Tier::Fact => RunState::LoadingFacts,
        }
    }
}

/// What one loader did during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderReport {
    /// Target table.
    pub table: &'static str,
    /// Pipeline stage.
    pub tier: Tier,
    /// Source rows read.
    pub read: u64,
    /// Target records created or updated.
    pub written: u64,
    /// Bridge links that already existed.
    pub unchanged: u64,
    /// Rows skipped for a missing dependency.
    pub skipped: u64,
    /// Watermark when the loader started.
    pub watermark_before: Option<PrimitiveDateTime>,
    /// Watermark when the loader finished.
    pub watermark_after: Option<PrimitiveDateTime>,
    /// Time spent.
    pub elapsed: Duration,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Mode of the run.
    pub mode: LoadMode,
    /// One entry per loader, in execution order.
    pub loaders: Vec<LoaderReport>,
    /// Reconciliation results, if validation ran.
    pub reconciliation: Option<ReconciliationReport>,
    /// Total time spent.
    pub elapsed: Duration,
}

impl RunReport {
    /// The report of one loader.
    pub fn loader(&self, table: &str) -> Option<&LoaderReport> {
        self.loaders.iter().find(|l| l.table == table)
    }

    /// Records written across all loaders.
    pub fn total_written(&self) -> u64 {
        self.loaders.iter().map(|l| l.written).sum()
    }

    /// Rows skipped across all loaders.
    pub fn total_skipped(&self) -> u64 {
        self.loaders.iter().map(|l| l.skipped).sum()
    }
}

/// Statistics across runs.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Runs that completed.
    pub runs_completed: u64,
    /// Runs that failed.
    pub runs_failed: u64,
    /// Records written by completed runs.
    pub rows_written: u64,
    /// Rows skipped by completed runs.
    pub rows_skipped: u64,
    /// When the last run finished.
    pub last_run_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Drives the loaders in dependency order against one source and one
/// target, then optionally reconciles them.
///
/// The orchestrator owns both stores through a [`StoreSession`]; they are
/// released when it is closed or dropped.
pub struct Orchestrator<S: ReadStore, T: WriteStore> {
    config: EngineConfig,
    session: StoreSession<S, T>,
    loaders: Vec<Box<dyn Loader>>,
    state: RwLock<RunState>,
    stats: RwLock<RunStats>,
}

impl<S: ReadStore, T: WriteStore> Orchestrator<S, T> {
    /// Creates an orchestrator with the standard loader pipeline.
    pub fn new(config: EngineConfig, source: S, target: T) -> Self {
        Self {
            config,
            session: StoreSession::new(source, target),
            loaders: standard_pipeline(),
            state: RwLock::new(RunState::Idle),
            stats: RwLock::new(RunStats::default()),
        }
    }

    /// Replaces the loader pipeline. Loaders run in the given order.
    #[must_use]
    pub fn with_loaders(mut self, loaders: Vec<Box<dyn Loader>>) -> Self {
        self.loaders = loaders;
        self
    }

    /// Gets the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Gets the current state.
    pub fn state(&self) -> RunState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> RunStats {
        self.stats.read().clone()
    }

    /// The source store.
    pub fn source(&self) -> &S {
        self.session.source()
    }

    /// The target store.
    pub fn target(&self) -> &T {
        self.session.target()
    }

    fn set_state(&self, state: RunState) {
        *self.state.write() = state;
    }

    /// Moves to `Preparing` if no run is active.
    fn begin_run(&self) -> EngineResult<()> {
        let mut state = self.state.write();
        if !state.can_start() {
            return Err(EngineError::InvalidStateTransition {
                from: format!("{:?}", *state),
                to: format!("{:?}", RunState::Preparing),
            });
        }
        *state = RunState::Preparing;
        Ok(())
    }

    /// Creates the target schema; see [`init_schema`].
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be created.
    pub fn init_schema(&self) -> EngineResult<()> {
        init_schema(self.session.target(), self.config.create_indexes)
    }

    /// Runs every loader in order, then reconciles if configured.
    ///
    /// A loader failure aborts the run; records and watermarks written by
    /// the loaders that completed before it are kept.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Loader`] for a loader failure,
    /// [`EngineError::ReconciliationFailed`] for a mismatch when
    /// `fail_on_mismatch` is set, or [`EngineError::InvalidStateTransition`]
    /// if a run is already in progress.
    pub fn run(&self, mode: LoadMode) -> EngineResult<RunReport> {
        let start = Instant::now();
        self.begin_run()?;

        tracing::info!(%mode, "starting load run");
        if let Err(e) = self.init_schema() {
            self.handle_error(&e);
            return Err(e);
        }

        let source: &dyn ReadStore = self.session.source();
        let target: &dyn WriteStore = self.session.target();
        let tracker = SyncStateTracker::new(target);
        let mut ctx = LoadContext::new(source, target, now());

        let mut report = RunReport {
            mode,
            loaders: Vec::with_capacity(self.loaders.len()),
            reconciliation: None,
            elapsed: Duration::ZERO,
        };

        for loader in &self.loaders {
            self.set_state(RunState::loading(loader.tier()));
            match run_loader(loader.as_ref(), &tracker, &mut ctx, mode) {
                Ok(loaded) => report.loaders.push(loaded),
                Err(e) => {
                    let e = EngineError::loader(loader.table(), e);
                    tracing::error!(table = loader.table(), error = %e, "loader failed, aborting run");
                    self.handle_error(&e);
                    return Err(e);
                }
            }
        }

        if self.config.validate_after_load {
            self.set_state(RunState::Reconciling);
            let reconciliation = self.reconcile().and_then(|r| {
                if self.config.fail_on_mismatch {
                    r.fail_on_mismatch()?;
                }
                Ok(r)
            });
            match reconciliation {
                Ok(r) => report.reconciliation = Some(r),
                Err(e) => {
                    self.handle_error(&e);
                    return Err(e);
                }
            }
        }

        report.elapsed = start.elapsed();
        self.set_state(RunState::Completed);
        {
            let mut stats = self.stats.write();
            stats.runs_completed += 1;
            stats.rows_written += report.total_written();
            stats.rows_skipped += report.total_skipped();
            stats.last_run_time = Some(Instant::now());
            stats.last_error = None;
        }
        tracing::info!(
            %mode,
            written = report.total_written(),
            skipped = report.total_skipped(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "load run completed"
        );
        Ok(report)
    }

    /// Reconciles source and target with the configured specs.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSpec`] for a malformed spec.
    pub fn reconcile(&self) -> EngineResult<ReconciliationReport> {
        self.reconcile_with(&self.config.specs)
    }

    /// Reconciles source and target with the given specs.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSpec`] for a malformed spec.
    pub fn reconcile_with(&self, specs: &[ReconciliationSpec]) -> EngineResult<ReconciliationReport> {
        Reconciler::new(self.session.source(), self.session.target())
            .with_default_tolerance(self.config.default_tolerance)
            .reconcile(specs)
    }

    /// Releases both stores.
    ///
    /// # Errors
    ///
    /// Returns the first close failure.
    pub fn close(mut self) -> EngineResult<()> {
        self.session.close()
    }

    fn handle_error(&self, error: &EngineError) {
        self.set_state(RunState::Error);
        let mut stats = self.stats.write();
        stats.runs_failed += 1;
        stats.last_error = Some(error.to_string());
    }
}

/// Creates every star schema table and the sync-state table, then the
/// recommended indexes if `create_indexes` is set. Idempotent.
///
/// A failing index is logged and skipped.
///
/// # Errors
///
/// Returns an error if a table cannot be created.
pub fn init_schema<T: WriteStore + ?Sized>(target: &T, create_indexes: bool) -> EngineResult<()> {
    SyncStateTracker::new(target).ensure()?;
    for def in schema::target_tables() {
        target.ensure_table(&def)?;
    }
    if create_indexes {
        for index in schema::recommended_indexes() {
            if let Err(e) = target.ensure_index(&index) {
                tracing::warn!(index = %index.name, table = %index.table, error = %e, "failed to create index");
            }
        }
    }
    tracing::debug!("schema ready");
    Ok(())
}

fn now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Runs one loader and records its watermark.
fn run_loader(
    loader: &dyn Loader,
    tracker: &SyncStateTracker<'_, dyn WriteStore + '_>,
    ctx: &mut LoadContext<'_>,
    mode: LoadMode,
) -> EngineResult<LoaderReport> {
    let started = Instant::now();
    let table = loader.table();

    let watermark_before = match loader.watermark_field() {
        Some(_) => tracker.get_watermark(table)?,
        None => None,
    };
    let since = match mode {
        LoadMode::Full => None,
        LoadMode::Incremental => watermark_before,
    };

    let outcome = loader.load(ctx, since)?;

    let mut watermark_after = watermark_before;
    if let (Some(_), Some(max)) = (loader.watermark_field(), outcome.max_timestamp) {
        if tracker.advance_watermark(table, max)? {
            watermark_after = Some(max);
        }
    }

    tracing::info!(
        table,
        read = outcome.read,
        written = outcome.written,
        skipped = outcome.skipped,
        "loaded"
    );

    Ok(LoaderReport {
        table,
        tier: loader.tier(),
        read: outcome.read,
        written: outcome.written,
        unchanged: outcome.unchanged,
        skipped: outcome.skipped,
        watermark_before,
        watermark_after,
        elapsed: started.elapsed(),
    })
}
