//! AAFT contact form step
//!
//! Drives a browser through a contact form submission and reports the result
//! to the AAFT orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  aaft-step (harness entry)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Args (flags + env) -> RunnerConfig                         │
//! │  StepRunner                                                 │
//! │    ├── PlaywrightPage::launch() -> BrowserPage              │
//! │    ├── ContactFormScenario::execute(page, report)           │
//! │    │     ├── navigate                                       │
//! │    │     ├── await fields (per-field timeout)               │
//! │    │     ├── fill probe values                              │
//! │    │     ├── submit + race confirmation / validation error  │
//! │    │     └── resolve outcome -> assertion / logs            │
//! │    └── StepReport::complete() -> POST callback (once)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod playwright;
pub mod runner;
pub mod scenario;

pub use browser::BrowserPage;
pub use config::{Args, RunnerConfig};
pub use error::{E2eError, E2eResult, StageError};
pub use runner::StepRunner;
pub use scenario::{ContactFormScenario, Outcome, CONFIRMATION_ASSERTION};
