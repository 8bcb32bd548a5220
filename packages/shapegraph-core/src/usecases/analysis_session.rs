//! Analysis Session - one run over a whole program
//!
//! The session owns everything that lives for one run: the reporter, the
//! call cache and the cancellation flag. It is consumed by [`AnalysisSession::run`],
//! so a cache never outlives the program it summarizes.
//!
//! ```text
//! AnalysisSession::new(program, config)
//!     │ entry points: configured names │ main │ virtual roots
//!     ▼
//! for each root:  bind unknown args ─▶ FixpointScheduler::run ─▶ drop return slot
//!     │
//!     ▼
//! AnalysisReport { findings, roots, cache_stats, stats, cancelled }
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use shapegraph_core::usecases::AnalysisSession;
//!
//! let session = AnalysisSession::new(program, AnalysisConfig::default())?;
//! let cancel = session.cancellation_flag();
//! let report = session.run();
//! println!("{}", report.to_json()?);
//! ```

use crate::config::{AnalysisConfig, Validatable};
use crate::features::call_cache::{CacheStats, CallCache, CallPath};
use crate::features::diagnostics::{Finding, Reporter};
use crate::features::fixpoint::{CancellationFlag, FixpointScheduler, SchedulerStats};
use crate::features::interpreter::Interpreter;
use crate::features::program_model::{Function, Program, ProgramAnalysis};
use crate::features::symbolic_heap::{HeapJoiner, SimpleJoiner, SymHeap};
use crate::shared::models::{EngineError, EngineResult, ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// How the analysis of one root ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RootStatus {
    Completed { results: usize },
    Failed { kind: ErrorKind, message: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootOutcome {
    pub function: String,
    #[serde(flatten)]
    pub status: RootStatus,
}

impl RootOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, RootStatus::Completed { .. })
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub findings: Vec<Finding>,
    pub roots: Vec<RootOutcome>,
    pub cache_stats: CacheStats,
    pub stats: SchedulerStats,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl AnalysisReport {
    pub fn error_count(&self) -> usize {
        self.findings.iter().filter(|f| f.is_error()).count()
    }

    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            EngineError::new(ErrorKind::MalformedProgram, "report serialization failed").with_source(e)
        })
    }
}

pub struct AnalysisSession {
    program: Program,
    analysis: ProgramAnalysis,
    config: AnalysisConfig,
    joiner: Box<dyn HeapJoiner>,
    cache: CallCache,
    reporter: Reporter,
    cancel: CancellationFlag,
}

impl std::fmt::Debug for AnalysisSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSession")
            .field("functions", &self.program.functions().len())
            .field("joiner", &self.joiner.name())
            .field("cache", &self.cache)
            .finish()
    }
}

impl AnalysisSession {
    /// Validate the configuration and precompute program facts
    pub fn new(program: Program, config: AnalysisConfig) -> EngineResult<Self> {
        config.validate()?;
        let analysis = ProgramAnalysis::new(&program);
        let cache = CallCache::new(config.call_cache.clone());
        Ok(Self {
            program,
            analysis,
            config,
            joiner: Box::new(SimpleJoiner::new()),
            cache,
            reporter: Reporter::new(),
            cancel: CancellationFlag::new(),
        })
    }

    /// Flag that stops [`Self::run`] between two steps
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Functions analyzed as roots, in order
    pub fn entry_points(&self) -> Vec<String> {
        if !self.config.entry_points.is_empty() {
            return self.config.entry_points.clone();
        }
        if self.program.function_by_name("main").is_some() {
            return vec!["main".to_string()];
        }
        self.analysis
            .virtual_roots()
            .iter()
            .map(|id| self.program.function_name(*id).to_string())
            .collect()
    }

    pub fn run(mut self) -> AnalysisReport {
        let started = Instant::now();
        let entries = self.entry_points();
        tracing::info!(
            functions = self.program.functions().len(),
            roots = entries.len(),
            "analysis started"
        );

        let mut roots = Vec::with_capacity(entries.len());
        let mut stats = SchedulerStats::default();
        let mut cancelled = false;
        for name in entries {
            if cancelled {
                roots.push(RootOutcome {
                    function: name,
                    status: RootStatus::Cancelled,
                });
                continue;
            }
            let status = match self.run_root(&name, &mut stats) {
                Ok(results) => RootStatus::Completed { results },
                Err(e) if e.kind() == ErrorKind::Cancelled => {
                    cancelled = true;
                    RootStatus::Cancelled
                }
                Err(e) => {
                    tracing::error!(root = %name, error = %e, "analysis of root failed");
                    RootStatus::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };
            roots.push(RootOutcome {
                function: name,
                status,
            });
        }

        let findings = self.reporter.into_findings();
        tracing::info!(
            findings = findings.len(),
            cache_hits = self.cache.stats().hits,
            cancelled,
            "analysis finished"
        );
        AnalysisReport {
            findings,
            roots,
            cache_stats: self.cache.stats().clone(),
            stats,
            cancelled,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Analyze one root; returns the number of heaps reaching its end
    fn run_root(&mut self, name: &str, stats: &mut SchedulerStats) -> EngineResult<usize> {
        let fnc: &Function = self
            .program
            .function_by_name(name)
            .ok_or_else(|| EngineError::unknown_function(format!("no function named {}", name)))?;
        if !fnc.is_defined() {
            return Err(EngineError::unknown_function(format!("function {} has no body", name)));
        }
        tracing::debug!(root = %name, "root analysis started");

        let path = CallPath::root(fnc.id);
        let mut entry = SymHeap::new();
        Interpreter::new(&self.program, &self.config, fnc, &path, &mut self.reporter)
            .bind_unknown_args(&mut entry);

        let mut scheduler = FixpointScheduler::new(
            &self.program,
            &self.analysis,
            &self.config,
            self.joiner.as_ref(),
            &mut self.cache,
            &mut self.reporter,
        )
        .with_cancellation(self.cancel.clone());
        let outcome = scheduler.run(fnc.id, path.clone(), entry);
        stats.absorb(scheduler.stats());
        let results = outcome?;
        let count = results.len();

        let mut interp = Interpreter::new(&self.program, &self.config, fnc, &path, &mut self.reporter);
        for mut heap in results {
            interp.discard_return(&mut heap);
        }
        Ok(count)
    }
}
