//! Usecase layer
//!
//! Entry API for hosts: build a [`crate::features::program_model::Program`],
//! hand it to an [`AnalysisSession`] and read the [`AnalysisReport`].

pub mod analysis_session;

pub use analysis_session::{AnalysisReport, AnalysisSession, RootOutcome, RootStatus};
