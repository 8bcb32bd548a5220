/*
 * Shapegraph Core - Shape and Memory-Safety Analysis Engine
 *
 * Feature-First Architecture:
 * - shared/      : Common models (errors, locations, worklist)
 * - config/      : Presets, per-concern configs, YAML io
 * - features/    : Vertical slices (program model → heap → abstraction → interpreter → fixpoint)
 * - usecases/    : Analysis session and report
 *
 * The engine executes a program symbolically over sets of shape graphs
 * and reports invalid dereferences, double frees and memory leaks.
 */

// Crate-level lint configuration
#![allow(clippy::too_many_arguments)] // Interpreter entry points carry the whole activation
#![allow(clippy::type_complexity)] // Heap tables nest maps of ids
#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::module_inception)] // interpreter::interpreter naming intentional
#![allow(clippy::collapsible_if)] // Readability over brevity
#![allow(clippy::collapsible_else_if)] // else if clarity
#![allow(clippy::needless_range_loop)] // Range loop for indexing parallel vectors
#![allow(clippy::len_without_is_empty)] // Counters are not collections

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports - Feature-First Architecture
// ═══════════════════════════════════════════════════════════════════════════

/// Shared models and utilities
pub mod shared;

/// Configuration system
pub mod config;

/// Feature modules
pub mod features;

/// Usecase layer (AnalysisSession)
pub mod usecases;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use config::{AnalysisConfig, Preset};
pub use features::diagnostics::{Finding, FindingKind, Severity};
pub use features::program_model::{Program, ProgramBuilder};
pub use shared::models::{EngineError, EngineResult, ErrorKind};
pub use usecases::{AnalysisReport, AnalysisSession};
