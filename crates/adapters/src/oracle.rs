// SPDX-License-Identifier: MIT

//! The AI oracle adapter: a thin async boundary around whatever external
//! model/service answers assessment, anomaly, and deduplication questions.
//! Everything on the far side of this trait is out of scope; supervisor-core
//! owns the request/response DTOs so both this crate and supervisor-engine
//! can share them.

use async_trait::async_trait;
use supervisor_core::{Anomaly, Assessment, DedupCandidate, DedupVerdict, Issue, TelemetrySnapshot};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Request(String),
    #[error("oracle returned a response we could not understand: {0}")]
    Malformed(String),
    #[error("oracle request timed out")]
    Timeout,
}

/// The supervisor's sole integration point with an external reasoning
/// service. Implementations may call out to an HTTP API, a local model
/// server, or anything else; callers only see request in, DTO out.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Assess an issue before execution: proposed strategy, confidence,
    /// ordered steps, and known risks.
    async fn assess(&self, issue: &Issue) -> Result<Assessment, OracleError>;

    /// Inspect one execution's telemetry snapshot for signs of a stuck or
    /// looping agent.
    async fn check_anomaly(&self, snapshot: &TelemetrySnapshot) -> Result<Anomaly, OracleError>;

    /// Compare a batch of freshly-discovered issue candidates against each
    /// other and against the existing issue set, returning one verdict per
    /// candidate.
    async fn deduplicate(
        &self,
        candidates: &[DedupCandidate],
        existing: &[Issue],
    ) -> Result<Vec<DedupVerdict>, OracleError>;
}

/// `Oracle` for running with no external reasoning service configured: every
/// assessment is a generic placeholder, no anomaly is ever detected, and no
/// candidate is ever flagged a duplicate. This is the CLI's default when the
/// operator hasn't pointed the supervisor at a real oracle endpoint — the
/// watchdog and dedup loops still run unconditionally (§4.4, §4.5) and need
/// something to call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOracle;

#[async_trait]
impl Oracle for NullOracle {
    async fn assess(&self, _issue: &Issue) -> Result<Assessment, OracleError> {
        Ok(Assessment {
            strategy: "unassessed".to_string(),
            confidence: 0.0,
            estimated_effort: "unknown".to_string(),
            ordered_steps: Vec::new(),
            risks: Vec::new(),
        })
    }

    async fn check_anomaly(&self, _snapshot: &TelemetrySnapshot) -> Result<Anomaly, OracleError> {
        Ok(Anomaly::none())
    }

    async fn deduplicate(
        &self,
        candidates: &[DedupCandidate],
        _existing: &[Issue],
    ) -> Result<Vec<DedupVerdict>, OracleError> {
        Ok(candidates
            .iter()
            .enumerate()
            .map(|(index, _)| DedupVerdict {
                candidate_index: index,
                duplicate_of: None,
                confidence: 0.0,
            })
            .collect())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod stub {
    use super::*;
    use parking_lot::Mutex;

    /// Deterministic oracle for tests: returns canned responses configured
    /// up front, recording every call it receives.
    pub struct StubOracle {
        assessment: Assessment,
        anomaly: Anomaly,
        dedup_verdicts: Vec<DedupVerdict>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl Default for StubOracle {
        fn default() -> Self {
            Self {
                assessment: Assessment {
                    strategy: "direct-fix".to_string(),
                    confidence: 0.9,
                    estimated_effort: "small".to_string(),
                    ordered_steps: vec!["reproduce".to_string(), "patch".to_string()],
                    risks: Vec::new(),
                },
                anomaly: Anomaly::none(),
                dedup_verdicts: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl StubOracle {
        pub fn with_anomaly(mut self, anomaly: Anomaly) -> Self {
            self.anomaly = anomaly;
            self
        }

        pub fn with_dedup_verdicts(mut self, verdicts: Vec<DedupVerdict>) -> Self {
            self.dedup_verdicts = verdicts;
            self
        }

        pub fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Oracle for StubOracle {
        async fn assess(&self, _issue: &Issue) -> Result<Assessment, OracleError> {
            self.calls.lock().push("assess");
            Ok(self.assessment.clone())
        }

        async fn check_anomaly(
            &self,
            _snapshot: &TelemetrySnapshot,
        ) -> Result<Anomaly, OracleError> {
            self.calls.lock().push("check_anomaly");
            Ok(self.anomaly.clone())
        }

        async fn deduplicate(
            &self,
            candidates: &[DedupCandidate],
            _existing: &[Issue],
        ) -> Result<Vec<DedupVerdict>, OracleError> {
            self.calls.lock().push("deduplicate");
            if self.dedup_verdicts.is_empty() {
                Ok(candidates
                    .iter()
                    .enumerate()
                    .map(|(index, _)| DedupVerdict {
                        candidate_index: index,
                        duplicate_of: None,
                        confidence: 0.0,
                    })
                    .collect())
            } else {
                Ok(self.dedup_verdicts.clone())
            }
        }
    }
}
