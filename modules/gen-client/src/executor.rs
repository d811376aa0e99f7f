use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::GenError;
use crate::parse;
use crate::provider::GenProvider;
use crate::resilience::ResilienceContext;
use crate::types::RequestSpec;

/// Bounded retry with exponential backoff, applied uniformly to every
/// failure class. Class-specific handling only adjusts shared state (key
/// cursor, heat), never the retry decision itself.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        exp.min(self.cap)
    }
}

const CALL_TIMEOUT: Duration = Duration::from_secs(180);

/// Wraps every remote generative/search request: proactive cooldown sleep,
/// dispatch under the current credential, layered parse/repair of the
/// response, required-field validation, and the bounded retry loop. Cloneable
/// and cheap to share; all clones see the same resilience context.
#[derive(Clone)]
pub struct Executor {
    provider: Arc<dyn GenProvider>,
    ctx: Arc<Mutex<ResilienceContext>>,
    policy: RetryPolicy,
}

impl Executor {
    pub fn new(provider: Arc<dyn GenProvider>, ctx: Arc<Mutex<ResilienceContext>>) -> Self {
        Self {
            provider,
            ctx,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Execute a structured request, returning the parsed top-level object
    /// with all `required_fields` present.
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        required_fields: &[&str],
    ) -> Result<Value, GenError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.throttle().await;

            let result = match self.current_key().await {
                Ok(key) => self.attempt(&key, spec, required_fields).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => {
                    self.ctx.lock().await.cool_down();
                    return Ok(value);
                }
                Err(e) => {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    self.absorb_failure(&e).await?;
                    if attempt >= self.policy.max_attempts {
                        warn!(
                            capability = %spec.capability,
                            attempts = attempt,
                            error = %e,
                            "generation retries exhausted"
                        );
                        return Err(e);
                    }
                    let backoff = self.policy.delay(attempt) + jitter();
                    debug!(
                        capability = %spec.capability,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "generation attempt failed, backing off"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    /// Embed a text, under the same shared throttle, rotation and retry rules
    /// as generation.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, GenError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.throttle().await;

            let result = match self.current_key().await {
                Ok(key) => {
                    timeout(CALL_TIMEOUT, self.provider.embed(&key, text))
                        .await
                        .map_err(|_| GenError::Timeout(CALL_TIMEOUT.as_secs()))
                        .and_then(|r| r)
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(vector) => {
                    self.ctx.lock().await.cool_down();
                    return Ok(vector);
                }
                Err(e) => {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    self.absorb_failure(&e).await?;
                    if attempt >= self.policy.max_attempts {
                        return Err(e);
                    }
                    sleep(self.policy.delay(attempt) + jitter()).await;
                }
            }
        }
    }

    /// One dispatch + parse + validate pass under a single credential.
    async fn attempt(
        &self,
        key: &str,
        spec: &RequestSpec,
        required_fields: &[&str],
    ) -> Result<Value, GenError> {
        let raw = timeout(CALL_TIMEOUT, self.provider.generate(key, spec))
            .await
            .map_err(|_| GenError::Timeout(CALL_TIMEOUT.as_secs()))??;

        if raw.trim().is_empty() {
            return Err(GenError::Malformed("empty response body".to_string()));
        }

        let value = match parse::parse_structured(&raw) {
            Some(v) => v,
            None => {
                debug!(capability = %spec.capability, "parse chain failed, issuing repair call");
                let repaired = timeout(CALL_TIMEOUT, self.provider.generate(key, &RequestSpec::repair(&raw)))
                    .await
                    .map_err(|_| GenError::Timeout(CALL_TIMEOUT.as_secs()))??;
                parse::parse_structured(&repaired).ok_or_else(|| {
                    GenError::Malformed("unparseable even after repair call".to_string())
                })?
            }
        };

        let object = value
            .as_object()
            .ok_or_else(|| GenError::Malformed("top-level value is not an object".to_string()))?;

        let missing: Vec<String> = required_fields
            .iter()
            .filter(|field| !object.contains_key(**field))
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(GenError::MissingFields(missing));
        }

        Ok(value)
    }

    /// Proactive throttle: sleep for the current shared cooldown before dispatch.
    async fn throttle(&self) {
        let heat = self.ctx.lock().await.heat();
        sleep(heat).await;
    }

    async fn current_key(&self) -> Result<String, GenError> {
        self.ctx
            .lock()
            .await
            .keys
            .current()
            .map(str::to_string)
            .ok_or(GenError::NoCredentials)
    }

    /// Adjust shared state for a failure. Quota rotates the credential and
    /// escalates to fatal once the pool wraps; overload raises the cooldown.
    async fn absorb_failure(&self, error: &GenError) -> Result<(), GenError> {
        match error {
            GenError::Quota(reason) => {
                let mut ctx = self.ctx.lock().await;
                if !ctx.keys.rotate() {
                    warn!(reason, "credential pool wrapped, escalating to fatal");
                    return Err(GenError::KeysExhausted);
                }
                warn!(reason, "quota failure, rotated to next credential");
            }
            GenError::Overloaded(reason) => {
                let mut ctx = self.ctx.lock().await;
                ctx.overheat();
                warn!(
                    reason,
                    heat_secs = ctx.heat().as_secs_f64(),
                    "service overloaded, raising shared cooldown"
                );
            }
            _ => {}
        }
        Ok(())
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::rng().random_range(0..1000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPool;
    use crate::types::Capability;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Scripted step for the in-test provider.
    enum Step {
        Body(&'static str),
        Quota,
        Overloaded,
        Hang,
    }

    struct ScriptedProvider {
        script: StdMutex<VecDeque<Step>>,
        keys_seen: StdMutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.into()),
                keys_seen: StdMutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.keys_seen.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl GenProvider for ScriptedProvider {
        async fn generate(&self, api_key: &str, _spec: &RequestSpec) -> Result<String, GenError> {
            self.keys_seen.lock().unwrap().push(api_key.to_string());
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Step::Body(body)) => Ok(body.to_string()),
                Some(Step::Quota) => Err(GenError::Quota("429".to_string())),
                Some(Step::Overloaded) => Err(GenError::Overloaded("503".to_string())),
                Some(Step::Hang) => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                None => panic!("provider called more times than scripted"),
            }
        }

        async fn embed(&self, _api_key: &str, _text: &str) -> Result<Vec<f32>, GenError> {
            Ok(vec![0.0; 8])
        }
    }

    fn executor(provider: Arc<ScriptedProvider>, keys: Vec<&str>) -> (Executor, Arc<Mutex<ResilienceContext>>) {
        let ctx = Arc::new(Mutex::new(ResilienceContext::new(KeyPool::new(
            keys.into_iter().map(String::from).collect(),
        ))));
        let exec = Executor::new(provider, ctx.clone()).with_policy(RetryPolicy {
            max_attempts: 4,
            base: Duration::from_millis(10),
            cap: Duration::from_millis(40),
        });
        (exec, ctx)
    }

    fn spec() -> RequestSpec {
        RequestSpec::new(Capability::Blueprint, "irrelevant")
    }

    #[tokio::test(start_paused = true)]
    async fn quota_rotates_keys_then_escalates_to_fatal() {
        let provider = ScriptedProvider::new(vec![Step::Quota, Step::Quota]);
        let (exec, _ctx) = executor(provider.clone(), vec!["first", "second"]);

        let err = exec.execute(&spec(), &[]).await.unwrap_err();
        assert!(matches!(err, GenError::KeysExhausted));
        // One call per key; the wrap aborts before a third dispatch.
        assert_eq!(
            *provider.keys_seen.lock().unwrap(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn overload_raises_heat_then_success_recovers() {
        let provider = ScriptedProvider::new(vec![
            Step::Overloaded,
            Step::Overloaded,
            Step::Body(r#"{"ok": true}"#),
        ]);
        let (exec, ctx) = executor(provider.clone(), vec!["only"]);

        let before = ctx.lock().await.heat();
        let value = exec.execute(&spec(), &["ok"]).await.unwrap();
        assert_eq!(value["ok"], serde_json::json!(true));
        assert_eq!(provider.calls(), 3);

        // Two overloads then one success: still hotter than at the start.
        let after = ctx.lock().await.heat();
        assert!(after > before, "heat should remain elevated after overloads");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_fields_retry_until_exhausted() {
        let provider = ScriptedProvider::new(vec![
            Step::Body(r#"{"a": 1}"#),
            Step::Body(r#"{"a": 1}"#),
            Step::Body(r#"{"a": 1}"#),
            Step::Body(r#"{"a": 1}"#),
        ]);
        let (exec, _ctx) = executor(provider.clone(), vec!["only"]);

        let err = exec.execute(&spec(), &["b"]).await.unwrap_err();
        match err {
            GenError::MissingFields(fields) => assert_eq!(fields, vec!["b".to_string()]),
            other => panic!("expected MissingFields, got {other}"),
        }
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn repair_call_recovers_unparseable_payload() {
        let provider = ScriptedProvider::new(vec![
            Step::Body("completely unstructured waffle"),
            Step::Body(r#"{"fixed": "yes"}"#),
        ]);
        let (exec, _ctx) = executor(provider.clone(), vec!["only"]);

        let value = exec.execute(&spec(), &["fixed"]).await.unwrap();
        assert_eq!(value["fixed"], serde_json::json!("yes"));
        // Primary call plus one secondary repair call, same attempt.
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_repair_call_times_out_and_the_attempt_retries() {
        let provider = ScriptedProvider::new(vec![
            Step::Body("completely unstructured waffle"),
            Step::Hang,
            Step::Body(r#"{"ok": 1}"#),
        ]);
        let (exec, _ctx) = executor(provider.clone(), vec!["only"]);

        let value = exec.execute(&spec(), &["ok"]).await.unwrap();
        assert_eq!(value["ok"], serde_json::json!(1));
        // Attempt one: primary call plus the repair call that stalled out.
        // Attempt two: a clean primary call.
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_body_is_a_retryable_parsing_failure() {
        let provider = ScriptedProvider::new(vec![
            Step::Body("   "),
            Step::Body(r#"{"ok": 1}"#),
        ]);
        let (exec, _ctx) = executor(provider.clone(), vec!["only"]);

        assert!(exec.execute(&spec(), &["ok"]).await.is_ok());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_credentials_is_immediately_fatal() {
        let provider = ScriptedProvider::new(vec![]);
        let (exec, _ctx) = executor(provider, vec![]);

        let err = exec.execute(&spec(), &[]).await.unwrap_err();
        assert!(matches!(err, GenError::NoCredentials));
    }

    #[test]
    fn backoff_delays_are_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(60),
        };
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(6), Duration::from_secs(60));
        assert_eq!(policy.delay(9), Duration::from_secs(60));
    }
}
