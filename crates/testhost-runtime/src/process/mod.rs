//! Test host process orchestration.
//!
//! Process lifetime is observed independently of the IPC channel:
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `launcher` | Builds the child environment, spawns, notifies lifetime handlers |
//! | `crash_dump` | Enables dump generation and publishes dumps after a crash |
//! | `hang` | Detects a host that stopped talking |

mod crash_dump;
mod error;
mod hang;
mod launcher;

pub use crash_dump::{CrashDumpHandler, DUMP_EXTENSION, PID_PLACEHOLDER};
pub use error::ProcessError;
pub use hang::HangMonitor;
pub use launcher::{ProcessLauncher, ProcessSpec, TestHostProcess};
