//! Adapter self-test
//!
//! Checks that an adapter answers AT commands, returns well-formed Mode 01
//! data, decodes the reference responses correctly and stays responsive over
//! a series of RPM requests.

use obd_protocol::codec::{decode, is_error_response, is_no_data, normalize};
use obd_protocol::{InitSequence, ObdClient, Pid};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Reference responses and their expected values
const PARSING_VECTORS: [(Pid, &str, f64); 7] = [
    (Pid::Rpm, "41 0C 1A F8", 1726.0),
    (Pid::Speed, "41 0D 3C", 60.0),
    (Pid::CoolantTemp, "41 05 5A", 50.0),
    (Pid::ThrottlePosition, "41 11 80", 50.2),
    (Pid::IntakeAirTemp, "41 0F 46", 30.0),
    (Pid::IntakeManifoldPressure, "41 0B 65", 101.0),
    (Pid::BatteryVoltage, "14.2V", 14.2),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub at_commands: Vec<String>,
    pub pids: Vec<Pid>,
    /// RPM requests in the stability run (0 skips it)
    pub stability_samples: usize,
    pub stability_interval: Duration,
    /// Share of successful samples needed to pass
    pub pass_rate: f64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            at_commands: InitSequence::minimal()
                .commands()
                .into_iter()
                .map(String::from)
                .collect(),
            pids: vec![
                Pid::Rpm,
                Pid::Speed,
                Pid::CoolantTemp,
                Pid::ThrottlePosition,
                Pid::EngineLoad,
            ],
            stability_samples: 30,
            stability_interval: Duration::from_secs(1),
            pass_rate: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub passed: bool,
    pub details: Vec<String>,
}

impl TestOutcome {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            details: Vec::new(),
        }
    }

    fn fail(&mut self, detail: String) {
        warn!("{}: {}", self.name, detail);
        self.passed = false;
        self.details.push(detail);
    }

    fn note(&mut self, detail: String) {
        self.details.push(detail);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityResult {
    pub samples: usize,
    pub successes: usize,
    /// Percent of successful samples
    pub success_rate: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub at_commands: TestOutcome,
    pub data_retrieval: TestOutcome,
    pub parsing: TestOutcome,
    pub stability: Option<StabilityResult>,
}

impl DiagnosticsReport {
    pub fn passed(&self) -> usize {
        let stability = self.stability.as_ref().map(|s| s.passed);
        [
            Some(self.at_commands.passed),
            Some(self.data_retrieval.passed),
            Some(self.parsing.passed),
            stability,
        ]
        .into_iter()
        .flatten()
        .filter(|p| *p)
        .count()
    }

    pub fn total(&self) -> usize {
        3 + usize::from(self.stability.is_some())
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }
}

/// Self-test over a connected session
pub struct SelfTest<'a> {
    client: &'a ObdClient,
    config: DiagnosticsConfig,
}

impl<'a> SelfTest<'a> {
    pub fn new(client: &'a ObdClient, config: DiagnosticsConfig) -> Self {
        Self { client, config }
    }

    /// AT commands must not answer `ERROR` or `?`
    pub async fn test_at_commands(&self) -> TestOutcome {
        let mut outcome = TestOutcome::new("at_commands");
        let settle = InitSequence::default();
        for command in &self.config.at_commands {
            match self.client.send_command(command).await {
                Ok(response) if response.contains("ERROR") || response.contains('?') => {
                    outcome.fail(format!("{} failed: {}", command, response));
                    break;
                }
                Ok(response) => outcome.note(format!("{} -> {}", command, response)),
                Err(e) => {
                    outcome.fail(format!("{} error: {}", command, e));
                    break;
                }
            }
            if let Some(delay) = settle.settle_after(command) {
                tokio::time::sleep(delay).await;
            }
        }
        outcome
    }

    /// Mode 01 responses must echo `41`; `NO DATA` is tolerated
    pub async fn test_data_retrieval(&self) -> TestOutcome {
        let mut outcome = TestOutcome::new("data_retrieval");
        for pid in &self.config.pids {
            let response = match self.client.send_command(pid.command()).await {
                Ok(response) => response,
                Err(e) => {
                    outcome.fail(format!("{} error: {}", pid.label(), e));
                    break;
                }
            };
            if is_no_data(&response) {
                outcome.note(format!("{}: no data available", pid.label()));
                continue;
            }
            if response.contains("ERROR") {
                outcome.fail(format!("{}: error response", pid.label()));
                break;
            }
            if pid.code().is_some() && !normalize(&response).starts_with("41") {
                outcome.fail(format!("{}: invalid response format {}", pid.label(), response));
                break;
            }
            outcome.note(format!("{} ({}) -> {}", pid.label(), pid.command(), response));
        }
        outcome
    }

    /// Decode the reference responses
    pub fn test_parsing() -> TestOutcome {
        let mut outcome = TestOutcome::new("parsing");
        for (pid, response, expected) in PARSING_VECTORS {
            match decode(pid, response) {
                Ok(value) if (value - expected).abs() < 0.1 => {
                    outcome.note(format!("{}: {} -> {}", pid.label(), response, value))
                }
                Ok(value) => outcome.fail(format!(
                    "{}: {} decoded to {}, expected {}",
                    pid.label(),
                    response,
                    value,
                    expected
                )),
                Err(e) => outcome.fail(format!("{}: {}", pid.label(), e)),
            }
        }
        outcome
    }

    /// Repeated RPM requests; passes at the configured success rate
    pub async fn test_stability(&self) -> StabilityResult {
        let samples = self.config.stability_samples;
        let mut successes = 0;
        for i in 0..samples {
            match self.client.send_command(Pid::Rpm.command()).await {
                Ok(response) if !is_error_response(&response) => successes += 1,
                Ok(response) => warn!("Stability sample {}: {}", i, response),
                Err(e) => warn!("Stability sample {} error: {}", i, e),
            }
            if i + 1 < samples {
                tokio::time::sleep(self.config.stability_interval).await;
            }
        }

        let success_rate = if samples == 0 {
            0.0
        } else {
            successes as f64 * 100.0 / samples as f64
        };
        let passed = success_rate >= self.config.pass_rate * 100.0;
        info!(
            "Connection stability: {:.1}% ({}/{})",
            success_rate, successes, samples
        );
        StabilityResult {
            samples,
            successes,
            success_rate,
            passed,
        }
    }

    /// Run every check in order
    pub async fn run(&self) -> DiagnosticsReport {
        info!("Starting adapter self-test");
        let at_commands = self.test_at_commands().await;
        let data_retrieval = self.test_data_retrieval().await;
        let parsing = Self::test_parsing();
        let stability = if self.config.stability_samples > 0 {
            Some(self.test_stability().await)
        } else {
            None
        };

        let report = DiagnosticsReport {
            at_commands,
            data_retrieval,
            parsing,
            stability,
        };
        info!(
            "Self-test: {}/{} tests passed",
            report.passed(),
            report.total()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::mock::MockAdapter;
    use obd_protocol::ClientConfig;

    async fn client(adapter: &MockAdapter) -> ObdClient {
        let config = ClientConfig {
            init: InitSequence::minimal(),
            ..Default::default()
        };
        ObdClient::connect(adapter, &adapter.device(), config)
            .await
            .unwrap()
    }

    fn quick() -> DiagnosticsConfig {
        DiagnosticsConfig {
            stability_samples: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_reference_vectors_decode() {
        let outcome = SelfTest::test_parsing();
        assert!(outcome.passed, "{:?}", outcome.details);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_adapter_passes() {
        let adapter = MockAdapter::new();
        let client = client(&adapter).await;
        let report = SelfTest::new(&client, quick()).run().await;

        assert!(report.all_passed(), "{:?}", report);
        assert_eq!(report.total(), 4);
        assert_eq!(report.stability.unwrap().successes, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_at_command_fails() {
        let adapter = MockAdapter::new();
        let client = client(&adapter).await;
        adapter.set_response("ATSP0", "?");

        let outcome = SelfTest::new(&client, quick()).test_at_commands().await;
        assert!(!outcome.passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_mode_echo_fails() {
        let adapter = MockAdapter::new();
        let client = client(&adapter).await;
        adapter.set_response("010D", "7F 01 12");

        let outcome = SelfTest::new(&client, quick()).test_data_retrieval().await;
        assert!(!outcome.passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_data_is_tolerated() {
        let adapter = MockAdapter::new();
        let client = client(&adapter).await;
        adapter.set_response("0105", "NO DATA");

        let outcome = SelfTest::new(&client, quick()).test_data_retrieval().await;
        assert!(outcome.passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flaky_adapter_fails_stability() {
        let adapter = MockAdapter::new();
        let client = client(&adapter).await;
        adapter.set_response("010C", "NO DATA");

        let result = SelfTest::new(&client, quick()).test_stability().await;
        assert_eq!(result.successes, 0);
        assert!(!result.passed);
    }
}
