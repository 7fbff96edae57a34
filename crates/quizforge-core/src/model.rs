//! Domain types at the collaborator boundary.
//!
//! The persistence layer, request validation, and DTO mapping live
//! outside this crate; these are the shapes that cross into the
//! execution core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message author role for the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged message in a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Outbound request payload for the generation service.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    /// Standard two-message (system + user) chat request.
    pub fn chat(
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            temperature,
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
        }
    }
}

/// Application category; decides which generation prompt family applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppCategory {
    /// Personality/assessment style: answers map to a textual evaluation.
    #[default]
    Evaluation,
    /// Quiz style: answers map to a numeric grade.
    Grade,
}

impl AppCategory {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Evaluation => "evaluation",
            Self::Grade => "grade",
        }
    }
}

/// An application (a published questionnaire) as seen by this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: u64,
    pub app_name: String,
    pub description: String,
    pub category: AppCategory,
    /// Scoring strategy selector, echoed into scoring results.
    pub strategy: i32,
}

/// One question belonging to an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionContent {
    pub title: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// A scoring outcome. The `result_*` fields come from the generation
/// payload; the rest are per-request echo fields overwritten on every
/// return, cache hit or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    #[serde(default)]
    pub app_id: u64,
    #[serde(default)]
    pub app_category: AppCategory,
    #[serde(default)]
    pub strategy: i32,
    #[serde(default)]
    pub answers: Vec<String>,
    pub result_name: String,
    #[serde(default)]
    pub result_desc: String,
    #[serde(default)]
    pub result_score: Option<i64>,
}

/// Read-only access to an application's ordered question set.
///
/// Implemented by the persistence layer; consumed by the scoring engine.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn questions_by_app_id(&self, app_id: u64) -> anyhow::Result<Vec<QuestionContent>>;
}
