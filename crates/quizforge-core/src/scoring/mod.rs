//! Idempotent scoring memoizer.
//!
//! Identical scoring requests legitimately repeat (page refresh, retry,
//! duplicate submission). A fingerprint cache turns them into O(1)
//! lookups, and a per-fingerprint lock keeps redundant generation calls
//! from firing concurrently across server instances.

use std::sync::Arc;

use moka::sync::Cache;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{AiConfig, ScoringConfig};
use crate::errors::{CoreError, CoreResult};
use crate::fingerprint::scoring_fingerprint;
use crate::lock::LockProvider;
use crate::model::{AnswerRecord, Application, CompletionRequest, QuestionContent, QuestionRepository};
use crate::providers::LlmClient;
use crate::stream::extract_first_object;

/// Lock-name prefix; one lock per scoring fingerprint, so unrelated
/// fingerprints never contend.
const SCORING_LOCK_PREFIX: &str = "scoring-lock:";

/// System prompt for the evaluation scorer.
pub const SCORING_SYSTEM_MESSAGE: &str = "\
You are a strict evaluator for questionnaire applications. Given an \
application's name and description and a list of question/answer pairs, \
produce a single JSON object with the fields \"resultName\" (a short \
label for the outcome), \"resultDesc\" (a few sentences explaining it) \
and \"resultScore\" (an integer, or null for evaluation-style \
applications). Output the JSON object only.";

/// Scoring engine: fingerprint cache in front of a locked single-shot
/// generation call.
pub struct AiScoringEngine {
    questions: Arc<dyn QuestionRepository>,
    llm: Arc<dyn LlmClient>,
    locks: Arc<dyn LockProvider>,
    cache: Cache<String, String>,
    cfg: ScoringConfig,
    ai: AiConfig,
}

impl AiScoringEngine {
    pub fn new(
        cfg: ScoringConfig,
        ai: AiConfig,
        questions: Arc<dyn QuestionRepository>,
        llm: Arc<dyn LlmClient>,
        locks: Arc<dyn LockProvider>,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(cfg.cache_max_entries)
            .time_to_idle(cfg.cache_idle())
            .build();
        Self {
            questions,
            llm,
            locks,
            cache,
            cfg,
            ai,
        }
    }

    /// Score an answer set against an application.
    ///
    /// `Ok(None)` means the per-fingerprint lock was not acquired within
    /// its wait window — a concurrent holder is presumably computing the
    /// same answer, and the caller should retry later. Every other
    /// failure is an error.
    pub async fn score(
        &self,
        application: &Application,
        answers: &[String],
    ) -> CoreResult<Option<AnswerRecord>> {
        let fingerprint = scoring_fingerprint(application.id, answers);

        if let Some(cached) = self.cache.get(&fingerprint) {
            debug!(app_id = application.id, %fingerprint, "scoring cache hit");
            return self.build_record(&cached, application, answers).map(Some);
        }

        let lock_name = format!("{SCORING_LOCK_PREFIX}{fingerprint}");
        let Some(guard) = self
            .locks
            .try_acquire(&lock_name, self.cfg.lock_wait(), self.cfg.lock_lease())
            .await
        else {
            info!(
                app_id = application.id,
                %fingerprint,
                "scoring lock unavailable; yielding to concurrent computation"
            );
            return Ok(None);
        };

        let result = self.compute(application, answers, &fingerprint).await;

        // Cleanup runs on every path, but only a still-held lease is
        // unlocked; past the lease the lock may already belong to someone
        // else.
        if !self.locks.release(&guard).await {
            warn!(
                app_id = application.id,
                %fingerprint,
                "scoring lease expired before release; a redundant computation may have started"
            );
        }

        result.map(Some)
    }

    async fn compute(
        &self,
        application: &Application,
        answers: &[String],
        fingerprint: &str,
    ) -> CoreResult<AnswerRecord> {
        // The lock may have been contended: whoever held it before us
        // could have already cached this fingerprint.
        if let Some(cached) = self.cache.get(fingerprint) {
            debug!(app_id = application.id, %fingerprint, "scoring cache filled while waiting");
            return self.build_record(&cached, application, answers);
        }

        let questions = self
            .questions
            .questions_by_app_id(application.id)
            .await
            .map_err(|e| {
                CoreError::scoring_data(format!(
                    "failed to fetch questions for app {}: {e:#}",
                    application.id
                ))
            })?;

        let user_message = scoring_user_message(application, &questions, answers);
        let request = CompletionRequest::chat(
            self.ai.model.clone(),
            self.ai.max_tokens,
            self.cfg.temperature,
            SCORING_SYSTEM_MESSAGE,
            user_message,
        );

        let raw = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| CoreError::upstream(format!("{e:#}")))?;

        let payload = extract_first_object(&raw).ok_or_else(|| {
            CoreError::malformed_payload(format!(
                "no top-level {{...}} span in scoring response ({} chars)",
                raw.len()
            ))
        })?;

        self.cache.insert(fingerprint.to_string(), payload.to_string());
        debug!(app_id = application.id, %fingerprint, "scoring result cached");

        self.build_record(payload, application, answers)
    }

    /// Deserialize a payload and overwrite the per-request echo fields.
    /// The cached payload itself is immutable.
    fn build_record(
        &self,
        payload: &str,
        application: &Application,
        answers: &[String],
    ) -> CoreResult<AnswerRecord> {
        let mut record: AnswerRecord = serde_json::from_str(payload).map_err(|e| {
            CoreError::malformed_payload(format!("scoring payload did not deserialize: {e}"))
        })?;
        record.app_id = application.id;
        record.app_category = application.category;
        record.strategy = application.strategy;
        record.answers = answers.to_vec();
        Ok(record)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QaPair<'a> {
    title: &'a str,
    user_answer: &'a str,
}

fn scoring_user_message(
    application: &Application,
    questions: &[QuestionContent],
    answers: &[String],
) -> String {
    let pairs: Vec<QaPair<'_>> = questions
        .iter()
        .zip(answers)
        .map(|(q, a)| QaPair {
            title: &q.title,
            user_answer: a,
        })
        .collect();
    let pairs_json = serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Application name: {}\nApplication description: {}\nList of questions and user answers: {}",
        application.app_name, application.description, pairs_json
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppCategory;

    fn app() -> Application {
        Application {
            id: 7,
            app_name: "MBTI Lite".to_string(),
            description: "A tiny personality probe".to_string(),
            category: AppCategory::Evaluation,
            strategy: 1,
        }
    }

    #[test]
    fn user_message_embeds_app_and_qa_pairs() {
        let questions = vec![
            QuestionContent {
                title: "Do you enjoy crowds?".to_string(),
                options: vec!["Yes".to_string(), "No".to_string()],
            },
            QuestionContent {
                title: "Do you plan ahead?".to_string(),
                options: vec![],
            },
        ];
        let answers = vec!["Yes".to_string(), "No".to_string()];
        let msg = scoring_user_message(&app(), &questions, &answers);

        assert!(msg.starts_with("Application name: MBTI Lite\n"));
        assert!(msg.contains("Application description: A tiny personality probe\n"));
        assert!(msg.contains(r#"{"title":"Do you enjoy crowds?","userAnswer":"Yes"}"#));
        assert!(msg.contains(r#"{"title":"Do you plan ahead?","userAnswer":"No"}"#));
    }

    #[test]
    fn per_request_fields_overwrite_cached_payload() {
        let engine = AiScoringEngine::new(
            ScoringConfig::default(),
            AiConfig::default(),
            Arc::new(NoQuestions),
            Arc::new(NoLlm),
            Arc::new(crate::lock::InMemoryLockProvider::new()),
        );
        let payload = r#"{"resultName":"INTJ","resultDesc":"Analytical","resultScore":null,"appId":999}"#;
        let answers = vec!["A".to_string()];
        let record = engine.build_record(payload, &app(), &answers).unwrap();

        assert_eq!(record.result_name, "INTJ");
        assert_eq!(record.app_id, 7, "cached appId must be overwritten");
        assert_eq!(record.app_category, AppCategory::Evaluation);
        assert_eq!(record.strategy, 1);
        assert_eq!(record.answers, answers);
    }

    struct NoQuestions;

    #[async_trait::async_trait]
    impl QuestionRepository for NoQuestions {
        async fn questions_by_app_id(
            &self,
            _app_id: u64,
        ) -> anyhow::Result<Vec<QuestionContent>> {
            anyhow::bail!("unused")
        }
    }

    struct NoLlm;

    #[async_trait::async_trait]
    impl LlmClient for NoLlm {
        async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<String> {
            anyhow::bail!("unused")
        }
        fn provider_name(&self) -> &'static str {
            "none"
        }
    }
}
