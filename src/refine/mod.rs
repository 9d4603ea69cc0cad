// Refinement orchestrator
//
// Drives the generate → apply → capture → evaluate → decide loop for one
// refinement run. A run is strictly sequential; independent runs share no
// mutable state. The orchestrator owns the run's StyleDocument and history
// and hands everything else read-only views.

mod types;

pub use types::{
    GenerationAttempt, HistoryEntry, Outcome, ReferenceImage, RefineConfig, RefineRequest,
    RunEvent, RunReport, Stage,
};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::ServiceError;
use crate::extract::{self, Verdict};
use crate::gateway::{ModelGateway, RequestPart};
use crate::host::DocumentHost;
use crate::prompt;
use crate::retry::{with_retry, RetryError};
use crate::stylesheet::StyleDocument;

pub struct Refiner {
    gateway: Arc<dyn ModelGateway>,
    host: Arc<dyn DocumentHost>,
    config: RefineConfig,
}

impl Refiner {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        host: Arc<dyn DocumentHost>,
        config: RefineConfig,
    ) -> Self {
        Self {
            gateway,
            host,
            config,
        }
    }

    /// Run the refinement loop to a terminal outcome.
    ///
    /// Progress streams over `events`; the receiver may be dropped at any
    /// time without affecting the run. Cancellation is honored at stage
    /// boundaries: an in-flight call is not aborted, but its result is
    /// discarded and no further transition occurs.
    pub async fn run(
        &self,
        request: RefineRequest,
        events: mpsc::Sender<RunEvent>,
        cancel: CancellationToken,
    ) -> RunReport {
        let mut doc = request.baseline.clone();
        let mut history: Vec<HistoryEntry> = Vec::new();
        let mut feedback: Option<String> = None;

        let reference_parts: Vec<RequestPart> = request
            .reference_images
            .iter()
            .map(|img| RequestPart::image(img.media_type.clone(), img.data.clone()))
            .collect();

        let snapshot = match self.host.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                return self
                    .finish_failed(&events, 0, Stage::Generating, err.to_string(), doc, history)
                    .await
            }
        };

        for iteration in 1..=self.config.max_iterations {
            // ── Generating ─────────────────────────────────────────────
            if cancel.is_cancelled() {
                return self
                    .finish(&events, iteration, Outcome::Cancelled, doc, history)
                    .await;
            }
            self.emit(
                &events,
                iteration,
                Stage::Generating,
                format!("requesting stylesheet from {}", self.gateway.name()),
            )
            .await;

            let mut attempt = GenerationAttempt::begin(iteration);
            let parts = prompt::generation_parts(
                &request.intent,
                &snapshot,
                &doc.render(),
                feedback.as_deref(),
                &reference_parts,
            );
            let raw = match self
                .model_call(
                    &mut attempt,
                    prompt::GENERATION_SYSTEM_PROMPT,
                    &parts,
                    &events,
                    Stage::Generating,
                )
                .await
            {
                Ok(raw) => raw,
                Err(err) => {
                    return self
                        .finish_failed(
                            &events,
                            iteration,
                            Stage::Generating,
                            err.to_string(),
                            doc,
                            history,
                        )
                        .await
                }
            };

            let css = match extract::extract(&raw) {
                Ok(Verdict::Revised(css)) => css,
                Ok(Verdict::Unchanged) => {
                    // Nothing left to generate; the document already
                    // satisfies the request.
                    history.push(HistoryEntry {
                        iteration,
                        verdict: Verdict::Unchanged,
                        applied_css: doc.render(),
                    });
                    return self
                        .finish(&events, iteration, Outcome::Converged, doc, history)
                        .await;
                }
                Err(err) => {
                    return self
                        .finish_failed(
                            &events,
                            iteration,
                            Stage::Generating,
                            err.to_string(),
                            doc,
                            history,
                        )
                        .await
                }
            };

            // ── Applying ───────────────────────────────────────────────
            if cancel.is_cancelled() {
                return self
                    .finish(&events, iteration, Outcome::Cancelled, doc, history)
                    .await;
            }
            self.emit(
                &events,
                iteration,
                Stage::Applying,
                format!("applying {} bytes of css", css.len()),
            )
            .await;

            doc = doc.upsert(&request.key, &css);
            let rendered = doc.render();
            if let Err(err) = self.host.apply_style(&rendered).await {
                return self
                    .finish_failed(
                        &events,
                        iteration,
                        Stage::Applying,
                        err.to_string(),
                        doc,
                        history,
                    )
                    .await;
            }
            // Let the renderer settle; captures taken immediately after an
            // apply have been observed to reflect stale paint.
            tokio::time::sleep(self.config.settle_delay).await;

            // ── Capturing ──────────────────────────────────────────────
            if cancel.is_cancelled() {
                return self
                    .finish(&events, iteration, Outcome::Cancelled, doc, history)
                    .await;
            }
            self.emit(&events, iteration, Stage::Capturing, "capturing render")
                .await;

            let capture = match tokio::time::timeout(
                self.config.capture_timeout,
                self.host.capture_render(),
            )
            .await
            {
                Ok(Ok(capture)) => capture,
                Ok(Err(err)) => {
                    tracing::warn!("capture unavailable ({err}), evaluating without screenshot");
                    self.emit(
                        &events,
                        iteration,
                        Stage::Capturing,
                        "capture unavailable, evaluating without screenshot",
                    )
                    .await;
                    None
                }
                Err(_) => {
                    tracing::warn!("capture timed out, evaluating without screenshot");
                    self.emit(
                        &events,
                        iteration,
                        Stage::Capturing,
                        "capture timed out, evaluating without screenshot",
                    )
                    .await;
                    None
                }
            };

            // ── Evaluating ─────────────────────────────────────────────
            if cancel.is_cancelled() {
                return self
                    .finish(&events, iteration, Outcome::Cancelled, doc, history)
                    .await;
            }
            self.emit(
                &events,
                iteration,
                Stage::Evaluating,
                "asking the evaluator for a verdict",
            )
            .await;

            let mut eval_attempt = GenerationAttempt::begin(iteration);
            let eval_parts =
                prompt::evaluation_parts(&request.intent, &rendered, capture.as_ref());
            let raw_eval = match self
                .model_call(
                    &mut eval_attempt,
                    prompt::EVALUATION_SYSTEM_PROMPT,
                    &eval_parts,
                    &events,
                    Stage::Evaluating,
                )
                .await
            {
                Ok(raw) => raw,
                Err(err) => {
                    return self
                        .finish_failed(
                            &events,
                            iteration,
                            Stage::Evaluating,
                            err.to_string(),
                            doc,
                            history,
                        )
                        .await
                }
            };

            let verdict = match extract::extract(&raw_eval) {
                Ok(verdict) => verdict,
                Err(err) => {
                    return self
                        .finish_failed(
                            &events,
                            iteration,
                            Stage::Evaluating,
                            err.to_string(),
                            doc,
                            history,
                        )
                        .await
                }
            };
            let score = extract::parse_score(&raw_eval);

            // ── Deciding ───────────────────────────────────────────────
            if cancel.is_cancelled() {
                return self
                    .finish(&events, iteration, Outcome::Cancelled, doc, history)
                    .await;
            }
            history.push(HistoryEntry {
                iteration,
                verdict: verdict.clone(),
                applied_css: css.clone(),
            });

            match verdict {
                Verdict::Unchanged => {
                    return self
                        .finish(&events, iteration, Outcome::Converged, doc, history)
                        .await;
                }
                Verdict::Revised(revision) => {
                    if let (Some(threshold), Some(score)) =
                        (self.config.quality_threshold, score)
                    {
                        if score >= threshold {
                            self.emit(
                                &events,
                                iteration,
                                Stage::Deciding,
                                format!("quality threshold met ({score:.2} >= {threshold:.2})"),
                            )
                            .await;
                            return self
                                .finish(&events, iteration, Outcome::Converged, doc, history)
                                .await;
                        }
                    }
                    if iteration == self.config.max_iterations {
                        return self
                            .finish(&events, iteration, Outcome::Exhausted, doc, history)
                            .await;
                    }
                    // The evaluator's revision becomes the next baseline and
                    // its critique becomes prompt context for the next round.
                    feedback = extract::feedback_text(&raw_eval).or_else(|| {
                        Some("The previous round needed revisions; reconcile the revised stylesheet with the request.".to_string())
                    });
                    doc = doc.upsert(&request.key, &revision);
                    self.emit(
                        &events,
                        iteration,
                        Stage::Deciding,
                        "evaluator requested another round",
                    )
                    .await;
                }
            }
        }

        // Only reachable with max_iterations = 0.
        self.finish(&events, 0, Outcome::Exhausted, doc, history)
            .await
    }

    /// One model call through the retry policy. Retry progress surfaces on
    /// the event stream; the attempt records its retry count for the
    /// caller's diagnostics.
    async fn model_call(
        &self,
        attempt: &mut GenerationAttempt,
        system: &str,
        parts: &[RequestPart],
        events: &mpsc::Sender<RunEvent>,
        stage: Stage,
    ) -> Result<String, RetryError> {
        let session = attempt.session.clone();
        let iteration = attempt.iteration;
        let max_attempts = self.config.max_attempts;

        let result = with_retry(
            || self.gateway.send(&session, system, parts),
            ServiceError::class,
            max_attempts,
            self.config.retry_delay,
            |attempt_no, err| {
                let _ = events.try_send(RunEvent {
                    iteration,
                    stage,
                    message: format!(
                        "transient provider error ({err}), retrying ({attempt_no}/{max_attempts})"
                    ),
                });
            },
        )
        .await?;

        attempt.retry_count = result.retries;
        tracing::debug!(
            session = %attempt.session,
            retries = attempt.retry_count,
            elapsed_ms = (chrono::Utc::now() - attempt.started_at).num_milliseconds(),
            "model call resolved"
        );
        Ok(result.value)
    }

    async fn emit(
        &self,
        events: &mpsc::Sender<RunEvent>,
        iteration: u32,
        stage: Stage,
        message: impl Into<String>,
    ) {
        let event = RunEvent {
            iteration,
            stage,
            message: message.into(),
        };
        tracing::info!(iteration = event.iteration, stage = %event.stage, "{}", event.message);
        let _ = events.send(event).await;
    }

    async fn finish(
        &self,
        events: &mpsc::Sender<RunEvent>,
        iteration: u32,
        outcome: Outcome,
        doc: StyleDocument,
        history: Vec<HistoryEntry>,
    ) -> RunReport {
        let message = match &outcome {
            Outcome::Converged => "converged".to_string(),
            Outcome::Exhausted => "iteration budget exhausted".to_string(),
            Outcome::Cancelled => "cancelled by caller".to_string(),
            Outcome::Failed {
                stage,
                iteration,
                error,
            } => format!("failed at {stage} (iteration {iteration}): {error}"),
        };
        self.emit(events, iteration, Stage::Deciding, message).await;
        RunReport {
            outcome,
            final_css: doc.render(),
            history,
        }
    }

    async fn finish_failed(
        &self,
        events: &mpsc::Sender<RunEvent>,
        iteration: u32,
        stage: Stage,
        error: String,
        doc: StyleDocument,
        history: Vec<HistoryEntry>,
    ) -> RunReport {
        tracing::error!(iteration, stage = %stage, "refinement failed: {error}");
        self.finish(
            events,
            iteration,
            Outcome::Failed {
                stage,
                iteration,
                error,
            },
            doc,
            history,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Capture;
    use crate::session::SessionToken;
    use crate::snapshot::ElementNode;
    use crate::stylesheet::BlockKey;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct ScriptedGateway {
        responses: Mutex<VecDeque<Result<String, ServiceError>>>,
        calls: AtomicU32,
    }

    impl ScriptedGateway {
        fn new(responses: Vec<Result<String, ServiceError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn send(
            &self,
            _session: &SessionToken,
            _system: &str,
            _parts: &[RequestPart],
        ) -> Result<String, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::BadRequest("script exhausted".into())))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "test-model"
        }
    }

    struct FakeHost {
        applied: Mutex<Vec<String>>,
        capture: Option<Capture>,
        fail_apply: bool,
        fail_capture: bool,
    }

    impl FakeHost {
        fn new() -> Self {
            Self {
                applied: Mutex::new(Vec::new()),
                capture: Some(Capture {
                    media_type: "image/png".to_string(),
                    data: "aGVsbG8=".to_string(),
                }),
                fail_apply: false,
                fail_capture: false,
            }
        }

        fn applied_count(&self) -> usize {
            self.applied.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DocumentHost for FakeHost {
        async fn apply_style(&self, css: &str) -> Result<(), ServiceError> {
            if self.fail_apply {
                return Err(ServiceError::DocumentApply("document detached".into()));
            }
            self.applied.lock().unwrap().push(css.to_string());
            Ok(())
        }

        async fn capture_render(&self) -> Result<Option<Capture>, ServiceError> {
            if self.fail_capture {
                return Err(ServiceError::CaptureUnavailable("no renderer".into()));
            }
            Ok(self.capture.clone())
        }

        async fn snapshot(&self) -> Result<ElementNode, ServiceError> {
            let mut node = ElementNode::new("header");
            node.addressable_classes.insert("portal-hdr".to_string());
            Ok(node)
        }
    }

    fn request() -> RefineRequest {
        RefineRequest::new("make the header blue", BlockKey::new("page", "theme"))
    }

    fn gen_css() -> Result<String, ServiceError> {
        Ok("```css\n.portal-hdr { color: blue; }\n```".to_string())
    }

    fn eval_unchanged() -> Result<String, ServiceError> {
        Ok("UNCHANGED".to_string())
    }

    fn eval_revised() -> Result<String, ServiceError> {
        Ok("The shade is off.\n```css\n.portal-hdr { color: navy; }\n```".to_string())
    }

    async fn run_with(
        gateway: Arc<ScriptedGateway>,
        host: Arc<FakeHost>,
        config: RefineConfig,
        cancel: CancellationToken,
    ) -> (RunReport, Vec<RunEvent>) {
        let refiner = Refiner::new(gateway, host, config);
        let (tx, mut rx) = mpsc::channel(256);
        let report = refiner.run(request(), tx, cancel).await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (report, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_converges_on_unchanged_evaluation() {
        let gateway = Arc::new(ScriptedGateway::new(vec![gen_css(), eval_unchanged()]));
        let host = Arc::new(FakeHost::new());
        let (report, events) = run_with(
            gateway.clone(),
            host.clone(),
            RefineConfig::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.outcome, Outcome::Converged);
        assert_eq!(report.history.len(), 1);
        assert_eq!(gateway.calls(), 2);
        assert_eq!(host.applied_count(), 1);
        assert!(report.final_css.contains("/* @begin page/theme */"));
        assert!(report.final_css.contains(".portal-hdr { color: blue; }"));
        assert!(events.iter().any(|e| e.stage == Stage::Evaluating));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_iteration_budget() {
        // Every evaluation demands another round: exactly max_iterations
        // generation calls, then Exhausted.
        let gateway = Arc::new(ScriptedGateway::new(vec![
            gen_css(),
            eval_revised(),
            gen_css(),
            eval_revised(),
        ]));
        let host = Arc::new(FakeHost::new());
        let config = RefineConfig {
            max_iterations: 2,
            ..Default::default()
        };
        let (report, _) = run_with(gateway.clone(), host, config, CancellationToken::new()).await;

        assert_eq!(report.outcome, Outcome::Exhausted);
        assert_eq!(report.history.len(), 2);
        assert_eq!(gateway.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_unchanged_short_circuits() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok("UNCHANGED".to_string())]));
        let host = Arc::new(FakeHost::new());
        let (report, _) = run_with(
            gateway.clone(),
            host.clone(),
            RefineConfig::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.outcome, Outcome::Converged);
        assert_eq!(gateway.calls(), 1);
        assert_eq!(host.applied_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_degrades_to_text_only() {
        let gateway = Arc::new(ScriptedGateway::new(vec![gen_css(), eval_unchanged()]));
        let host = Arc::new(FakeHost {
            fail_capture: true,
            ..FakeHost::new()
        });
        let (report, events) = run_with(
            gateway,
            host,
            RefineConfig::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.outcome, Outcome::Converged);
        assert!(events
            .iter()
            .any(|e| e.message.contains("evaluating without screenshot")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_failure_fails_the_run() {
        let gateway = Arc::new(ScriptedGateway::new(vec![gen_css()]));
        let host = Arc::new(FakeHost {
            fail_apply: true,
            ..FakeHost::new()
        });
        let (report, _) = run_with(
            gateway,
            host,
            RefineConfig::default(),
            CancellationToken::new(),
        )
        .await;

        match report.outcome {
            Outcome::Failed {
                stage, iteration, ..
            } => {
                assert_eq!(stage, Stage::Applying);
                assert_eq!(iteration, 1);
            }
            other => panic!("expected apply failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_generation_is_fatal() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(
            "I cannot help with that.".to_string()
        )]));
        let host = Arc::new(FakeHost::new());
        let (report, _) = run_with(
            gateway.clone(),
            host,
            RefineConfig::default(),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            report.outcome,
            Outcome::Failed {
                stage: Stage::Generating,
                ..
            }
        ));
        // A response-shape problem is never retried.
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_generation_error_is_retried() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Err(ServiceError::Overloaded("529".into())),
            gen_css(),
            eval_unchanged(),
        ]));
        let host = Arc::new(FakeHost::new());
        let (report, events) = run_with(
            gateway.clone(),
            host,
            RefineConfig::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.outcome, Outcome::Converged);
        assert_eq!(gateway.calls(), 3);
        assert!(events.iter().any(|e| e.message.contains("retrying")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_fails_without_retry() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Err(ServiceError::Auth(
            "invalid key".into(),
        ))]));
        let host = Arc::new(FakeHost::new());
        let (report, _) = run_with(
            gateway.clone(),
            host,
            RefineConfig::default(),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(report.outcome, Outcome::Failed { .. }));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_before_start_makes_no_calls() {
        let gateway = Arc::new(ScriptedGateway::new(vec![gen_css()]));
        let host = Arc::new(FakeHost::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (report, _) = run_with(gateway.clone(), host, RefineConfig::default(), cancel).await;

        assert_eq!(report.outcome, Outcome::Cancelled);
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quality_threshold_converges_early() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            gen_css(),
            Ok("SCORE: 0.9\nMinor nit with spacing.\n```css\n.portal-hdr { color: navy; }\n```"
                .to_string()),
        ]));
        let host = Arc::new(FakeHost::new());
        let config = RefineConfig {
            quality_threshold: Some(0.8),
            ..Default::default()
        };
        let (report, _) = run_with(gateway.clone(), host, config, CancellationToken::new()).await;

        assert_eq!(report.outcome, Outcome::Converged);
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feedback_carries_into_next_round() {
        // After a revised verdict, the evaluator's critique must reach the
        // next generation prompt. The scripted gateway cannot inspect the
        // prompt, so assert via history: two rounds ran and the second
        // baseline carries the evaluator's revision.
        let gateway = Arc::new(ScriptedGateway::new(vec![
            gen_css(),
            eval_revised(),
            Ok("UNCHANGED".to_string()),
        ]));
        let host = Arc::new(FakeHost::new());
        let (report, _) = run_with(
            gateway,
            host,
            RefineConfig::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.outcome, Outcome::Converged);
        assert_eq!(report.history.len(), 2);
        assert!(report.final_css.contains("navy"));
    }
}
