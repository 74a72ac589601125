//! PID Polling
//!
//! Drives the 1 Hz poll of every channel over an [`obd_protocol::ObdClient`],
//! keeps the latest snapshot and a short history, and runs the adapter
//! self-test.

mod diagnostics;
mod live;
mod poller;

pub use diagnostics::{DiagnosticsConfig, DiagnosticsReport, SelfTest, StabilityResult, TestOutcome};
pub use live::{boost_psi, HistoryPoint, LiveData, BOOST_METRIC};
pub use poller::{PollOutcome, Poller, PollerConfig, Snapshot};
