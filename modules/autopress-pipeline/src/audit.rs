//! Post-publish audit-remedy convergence loop, bounded by a max iteration
//! count and a quality-score threshold. Both terminal states, converged and
//! exhausted, are acceptable outcomes rather than hard failures of the run.

use std::sync::Arc;

use autopress_common::{AuditReport, Publisher};
use gen_client::parse::truncate_to_char_boundary;
use gen_client::{Capability, Executor, GenError, RequestSpec};
use tracing::{info, warn};

/// A remedy shorter than this is treated as a failed rewrite and the last
/// good content is kept.
const REMEDY_MIN_CHARS: usize = 400;
const AUDIT_BODY_MAX_BYTES: usize = 30_000;

const AUDIT_SYSTEM: &str = "\
You audit a published article for factual precision, completeness, and \
structure. Score 0-10. List concrete problems only. \
Return JSON: {\"quality_score\": 0.0, \"verdict\": \"...\", \
\"critical_issues\": [\"...\"], \"missing_facts\": [\"...\"], \"suggestions\": \"...\"}.";

const REMEDY_SYSTEM: &str = "\
You rewrite a published article to fix the audit findings, preserving \
structure, assets, and everything the audit did not flag. \
Return JSON: {\"body\": \"...\"}.";

#[derive(Debug)]
pub struct AuditOutcome {
    pub final_body: String,
    pub iterations: u32,
    pub converged: bool,
    pub final_score: f64,
}

pub struct AuditLoop {
    executor: Executor,
    publisher: Arc<dyn Publisher>,
    threshold: f64,
    max_iterations: u32,
}

impl AuditLoop {
    pub fn new(
        executor: Executor,
        publisher: Arc<dyn Publisher>,
        threshold: f64,
        max_iterations: u32,
    ) -> Self {
        Self {
            executor,
            publisher,
            threshold,
            max_iterations,
        }
    }

    /// Alternate audit and remedy until the score meets the threshold or the
    /// iteration budget runs out. Each accepted remedy is pushed live via the
    /// publisher's update operation and adopted as the new current body.
    pub async fn run(&self, post_id: &str, title: &str, body: String) -> AuditOutcome {
        let mut current = body;
        let mut score = 0.0_f64;
        let mut iteration = 0u32;

        while score < self.threshold && iteration < self.max_iterations {
            iteration += 1;

            let report = match self.audit(title, &current).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(post_id, iteration, error = %e, "no audit report, keeping current content");
                    break;
                }
            };
            score = report.quality_score;
            info!(
                post_id,
                iteration,
                score,
                verdict = report.verdict.as_str(),
                "audit report received"
            );

            if score >= self.threshold {
                break;
            }

            let remedy = match self.remedy(title, &current, &report).await {
                Ok(remedy) => remedy,
                Err(e) => {
                    warn!(post_id, iteration, error = %e, "remedy failed, keeping last good content");
                    break;
                }
            };
            if remedy.len() < REMEDY_MIN_CHARS {
                warn!(
                    post_id,
                    iteration,
                    chars = remedy.len(),
                    "remedy below minimum length, keeping last good content"
                );
                break;
            }

            match self.publisher.update(post_id, &remedy).await {
                Ok(()) => {
                    info!(post_id, iteration, "remedy pushed live");
                    current = remedy;
                }
                Err(e) => {
                    warn!(post_id, iteration, error = %e, "remedy update failed, keeping last good content");
                    break;
                }
            }
        }

        let converged = score >= self.threshold;
        info!(
            post_id,
            iterations = iteration,
            converged,
            final_score = score,
            "audit loop finished"
        );
        AuditOutcome {
            final_body: current,
            iterations: iteration,
            converged,
            final_score: score,
        }
    }

    async fn audit(&self, title: &str, body: &str) -> Result<AuditReport, GenError> {
        let spec = RequestSpec::new(
            Capability::Audit,
            format!(
                "Title: {title}\n\n{}",
                truncate_to_char_boundary(body, AUDIT_BODY_MAX_BYTES)
            ),
        )
        .with_system(AUDIT_SYSTEM);

        let value = self
            .executor
            .execute(&spec, &["quality_score", "verdict"])
            .await?;
        serde_json::from_value(value)
            .map_err(|e| GenError::Malformed(format!("audit report shape: {e}")))
    }

    async fn remedy(
        &self,
        title: &str,
        body: &str,
        report: &AuditReport,
    ) -> Result<String, GenError> {
        let findings = serde_json::json!({
            "critical_issues": report.critical_issues,
            "missing_facts": report.missing_facts,
            "suggestions": report.suggestions,
        });
        let spec = RequestSpec::new(
            Capability::Remedy,
            format!(
                "Title: {title}\n\nAudit findings:\n{findings}\n\nCurrent body:\n{}",
                truncate_to_char_boundary(body, AUDIT_BODY_MAX_BYTES)
            ),
        )
        .with_system(REMEDY_SYSTEM);

        let value = self.executor.execute(&spec, &["body"]).await?;
        Ok(value["body"].as_str().unwrap_or_default().to_string())
    }
}
