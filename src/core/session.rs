// This module provides the per-run state of the initialization pass. InitSession owns the
// configuration, the warnings collected while reading annotations, the set of functions enabled
// through function annotations and the run statistics. Nothing is shared between runs: a session
// is created by the pass driver, threaded by mutable reference into the collectors and the
// specializer, and finally turned into an InitReport that callers inspect or print. SessionStats
// counts the valid annotations found and the sizes the engine produces: roots, queue entries,
// clones, metadata records and erased markers.

//! Per-run session state and the report handed back to callers.

use super::config::InitConfig;
use super::error::InitWarning;
use std::fmt;

/// Counters gathered during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of valid annotations found.
    pub annotation_count: usize,
    pub roots: usize,
    pub queue_len: usize,
    pub clones_created: usize,
    pub clones_reused: usize,
    pub metadata_written: usize,
    pub markers_erased: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Initialization Statistics:")?;
        writeln!(f, "  Valid annotations: {}", self.annotation_count)?;
        writeln!(f, "  Roots: {}", self.roots)?;
        writeln!(f, "  Module queue length: {}", self.queue_len)?;
        writeln!(f, "  Clones created: {}", self.clones_created)?;
        writeln!(f, "  Clones reused: {}", self.clones_reused)?;
        writeln!(f, "  Metadata records written: {}", self.metadata_written)?;
        writeln!(f, "  Annotation markers erased: {}", self.markers_erased)?;
        Ok(())
    }
}

/// State of one initialization run.
#[derive(Debug, Default)]
pub struct InitSession {
    config: InitConfig,
    warnings: Vec<InitWarning>,
    enabled_functions: Vec<String>,
    stats: SessionStats,
}

impl InitSession {
    pub fn new(config: InitConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &InitConfig {
        &self.config
    }

    /// Record a non-fatal diagnostic; it is also logged immediately.
    pub fn warn(&mut self, warning: InitWarning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[InitWarning] {
        &self.warnings
    }

    /// Remember a function whose annotation enables conversion of its calls.
    pub fn enable_function(&mut self, name: &str) {
        if !self.enabled_functions.iter().any(|f| f == name) {
            self.enabled_functions.push(name.to_string());
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut SessionStats {
        &mut self.stats
    }

    pub fn into_report(self) -> InitReport {
        InitReport {
            warnings: self.warnings,
            enabled_functions: self.enabled_functions,
            stats: self.stats,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    pub warnings: Vec<InitWarning>,
    pub enabled_functions: Vec<String>,
    pub stats: SessionStats,
}
