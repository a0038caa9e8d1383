//! Test execution.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    ExecutionCoordinator                       │
//! │                                                              │
//! │  ConcurrencyGate ──► Deadline ──► TestFramework::execute     │
//! │                                        │                     │
//! │                                   classify()                 │
//! │                                        │                     │
//! │          RunReport ◄── TerminalLedger ─┴─► MessageBus        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `gate` | Bounded concurrency with RAII permits |
//! | `classify` | Body outcome to terminal state |
//! | `report` | Text report with one line per outcome |
//! | `summary` | Outcome counts and exit code |
//! | `coordinator` | Drives a batch end to end |

mod classify;
mod coordinator;
mod gate;
mod report;
mod summary;

pub use classify::{classify, panic_message, ExecutionOutcome};
pub use coordinator::{
    CoordinatorOptions, CoordinatorProducer, ExecutionCoordinator, TerminalLedger,
    REPORT_ARTIFACT_NAME,
};
pub use gate::{ConcurrencyGate, GateClosed, GatePermit};
pub use report::{report_line, RunReport};
pub use summary::{GateUsage, RunSummary};
