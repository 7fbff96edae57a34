//! Streamed question generation.
//!
//! The production caller of the dispatcher + streaming processor:
//! builds the prompt for an application, opens a push channel, submits a
//! tiered task, and hands the caller the live chunk stream plus the
//! final-text handle.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::AiConfig;
use crate::dispatch::TieredDispatcher;
use crate::errors::CoreResult;
use crate::model::{AppCategory, Application, CompletionRequest};
use crate::sink::{ChannelSink, SinkEvent};
use crate::task::{CompletionTask, TaskHandle, Tier};

/// Chunk buffer between the processor and the transport adapter.
const SINK_CAPACITY: usize = 32;

/// System prompt for generating evaluation-style questions.
pub const GENERATE_EVALUATION_QUESTIONS_SYSTEM_MESSAGE: &str = "\
You write questionnaire items for evaluation-style applications, where \
answers map to a textual outcome rather than a score. Emit each question \
as a standalone JSON object {\"title\": ..., \"options\": [...]} with \
exactly the requested number of options, and nothing between the objects \
except plain commentary.";

/// System prompt for generating grade-style questions.
pub const GENERATE_GRADE_QUESTIONS_SYSTEM_MESSAGE: &str = "\
You write quiz items for grade-style applications, where each option \
carries a score. Emit each question as a standalone JSON object \
{\"title\": ..., \"options\": [...]} with exactly the requested number of \
options, and nothing between the objects except plain commentary.";

/// A live generation: structured chunks as they complete, then the
/// final accumulated text. The handle allows an external owner to fail
/// the task (which closes the push channel); it does not cancel the
/// upstream call itself.
pub struct GenerationStream {
    pub chunks: mpsc::Receiver<SinkEvent>,
    pub result: oneshot::Receiver<CoreResult<String>>,
    pub handle: TaskHandle,
}

pub struct GenerationService {
    dispatcher: Arc<TieredDispatcher>,
    ai: AiConfig,
}

impl GenerationService {
    pub fn new(dispatcher: Arc<TieredDispatcher>, ai: AiConfig) -> Self {
        Self { dispatcher, ai }
    }

    /// Generate questions for an application, streamed.
    ///
    /// The caller picks the tier (role classification happens upstream).
    /// A saturated privileged pool surfaces as `Err(CapacityRejected)`;
    /// a saturated standard pool accepts and silently drops, in which
    /// case `result` never resolves and the caller applies its own
    /// timeout.
    pub fn generate_questions(
        &self,
        application: &Application,
        question_count: u32,
        option_count: u32,
        tier: Tier,
    ) -> CoreResult<GenerationStream> {
        let system = match application.category {
            AppCategory::Evaluation => GENERATE_EVALUATION_QUESTIONS_SYSTEM_MESSAGE,
            AppCategory::Grade => GENERATE_GRADE_QUESTIONS_SYSTEM_MESSAGE,
        };
        let user = generation_user_message(application, question_count, option_count);
        let request = CompletionRequest::chat(
            self.ai.model.clone(),
            self.ai.max_tokens,
            self.ai.temperature,
            system,
            user,
        );

        let (sink, chunks) = ChannelSink::new(SINK_CAPACITY);
        let (task, result) = CompletionTask::new(tier, request, sink);
        let handle = task.handle.clone();
        self.dispatcher.submit(task)?;

        Ok(GenerationStream {
            chunks,
            result,
            handle,
        })
    }
}

fn generation_user_message(
    application: &Application,
    question_count: u32,
    option_count: u32,
) -> String {
    format!(
        "Application name: {}\nApplication description: {}\nApplication category: {} type\nNumber of questions to generate: {}\nNumber of options per question: {}",
        application.app_name,
        application.description,
        application.category.describe(),
        question_count,
        option_count
    )
}
