//! Event types for reactive UI updates.

use std::path::PathBuf;

use switchyard_core::{Busbar, ElementKind, ElementRef, SubstationId};

use crate::JobId;

/// Events emitted by the menu when a selection or the ledger changes.
#[derive(Debug, Clone, PartialEq)]
pub enum MenuEvent {
    /// A scenario was loaded and the menu rebuilt.
    GameLoaded {
        path: PathBuf,
        n_sub: usize,
        n_line: usize,
    },

    SubstationSelected { substation: SubstationId },

    KindSelected { kind: ElementKind },

    ElementSelected { element: ElementRef, busbar: Busbar },

    /// A busbar choice was written to the ledger.
    LedgerChanged { element: ElementRef, busbar: Busbar, pending: usize },

    LedgerCleared,
}

/// Kinds of background runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    /// Submit the pending action and advance until a line overloads.
    ContinueSimulation,
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunKind::ContinueSimulation => write!(f, "Continue simulation"),
        }
    }
}

/// Events emitted by the job tracker.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A new job was started.
    Started {
        id: JobId,
        kind: RunKind,
    },

    /// A job made progress.
    Progress {
        id: JobId,
        tick: u64,
        message: Option<String>,
    },

    /// A job completed successfully.
    Completed {
        id: JobId,
        kind: RunKind,
    },

    /// A job failed.
    Failed {
        id: JobId,
        error: String,
    },

    /// A job was cancelled.
    Cancelled {
        id: JobId,
    },
}
