//! End-to-end streaming tests: scripted upstream fragments through the
//! processor (and through the full dispatcher path), asserting chunk
//! delivery, terminal signals, and the final accumulated text.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use quizforge_core::config::{AiConfig, DispatchConfig};
use quizforge_core::dispatch::TieredDispatcher;
use quizforge_core::errors::CoreError;
use quizforge_core::generation::GenerationService;
use quizforge_core::model::{AppCategory, Application, CompletionRequest};
use quizforge_core::providers::{CompletionEvent, StreamingLlmClient};
use quizforge_core::sink::{ChannelSink, SinkEvent};
use quizforge_core::stream::run_completion;
use quizforge_core::task::{CompletionTask, Tier};

/// Upstream double that replays a scripted fragment sequence.
struct ScriptedStream {
    fragments: Vec<&'static str>,
    terminal: Option<CompletionEvent>,
}

impl ScriptedStream {
    fn completing(fragments: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            fragments,
            terminal: Some(CompletionEvent::Done),
        })
    }

    fn failing(fragments: Vec<&'static str>, message: &str) -> Arc<Self> {
        Arc::new(Self {
            fragments,
            terminal: Some(CompletionEvent::Error(message.to_string())),
        })
    }
}

#[async_trait]
impl StreamingLlmClient for ScriptedStream {
    async fn stream_chat(
        &self,
        _request: &CompletionRequest,
    ) -> anyhow::Result<mpsc::Receiver<CompletionEvent>> {
        let (tx, rx) = mpsc::channel(16);
        let fragments: Vec<String> = self.fragments.iter().map(|s| s.to_string()).collect();
        let terminal = self.terminal.clone();
        tokio::spawn(async move {
            for f in fragments {
                if tx.send(CompletionEvent::Delta(f)).await.is_err() {
                    return;
                }
            }
            if let Some(terminal) = terminal {
                let _ = tx.send(terminal).await;
            }
        });
        Ok(rx)
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

fn request() -> CompletionRequest {
    CompletionRequest::chat("gpt-4o", 2048, 1.0, "system", "user")
}

fn zero_delay_dispatch() -> DispatchConfig {
    let mut cfg = DispatchConfig::default();
    cfg.standard.start_delay_ms = 0;
    cfg
}

#[tokio::test]
async fn prose_interleaved_objects_stream_as_chunks() {
    // single unsplit response, the canonical scenario
    let upstream = ScriptedStream::completing(vec![
        "Sure! {\"score\":10} and also {\"score\":20}",
    ]);
    let (sink, mut events) = ChannelSink::new(16);
    let (task, result) = CompletionTask::new(Tier::Privileged, request(), sink);

    run_completion(task, upstream).await;

    assert_eq!(
        events.recv().await,
        Some(SinkEvent::Chunk(r#"{"score":10}"#.to_string()))
    );
    assert_eq!(
        events.recv().await,
        Some(SinkEvent::Chunk(r#"{"score":20}"#.to_string()))
    );
    assert_eq!(events.recv().await, Some(SinkEvent::Complete));

    let text = result.await.unwrap().unwrap();
    assert_eq!(text, "Sure! {\"score\":10} and also {\"score\":20}");
}

#[tokio::test]
async fn fragment_splits_do_not_change_chunks() {
    // same response, split mid-object and mid-brace
    let upstream = ScriptedStream::completing(vec![
        "Sure! {\"sco",
        "re\":1",
        "0} and al",
        "so {\"score\"",
        ":20}",
    ]);
    let (sink, mut events) = ChannelSink::new(16);
    let (task, result) = CompletionTask::new(Tier::Standard, request(), sink);

    run_completion(task, upstream).await;

    assert_eq!(
        events.recv().await,
        Some(SinkEvent::Chunk(r#"{"score":10}"#.to_string()))
    );
    assert_eq!(
        events.recv().await,
        Some(SinkEvent::Chunk(r#"{"score":20}"#.to_string()))
    );
    assert_eq!(events.recv().await, Some(SinkEvent::Complete));
    assert!(result.await.unwrap().is_ok());
}

#[tokio::test]
async fn upstream_error_fails_handle_and_sink_once() {
    let upstream = ScriptedStream::failing(vec!["{\"partial\":"], "service unavailable");
    let (sink, mut events) = ChannelSink::new(16);
    let (task, result) = CompletionTask::new(Tier::Privileged, request(), sink);

    run_completion(task, upstream).await;

    let err = result.await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::Upstream { .. }), "got {err:?}");
    assert!(matches!(events.recv().await, Some(SinkEvent::Failed(_))));
    assert_eq!(events.recv().await, None);
}

#[tokio::test]
async fn lost_event_stream_still_closes_sink_with_error() {
    // producer drops without a terminal event
    let upstream = Arc::new(ScriptedStream {
        fragments: vec!["{\"a\":1}"],
        terminal: None,
    });
    let (sink, mut events) = ChannelSink::new(16);
    let (task, result) = CompletionTask::new(Tier::Privileged, request(), sink);

    run_completion(task, upstream).await;

    assert_eq!(
        events.recv().await,
        Some(SinkEvent::Chunk(r#"{"a":1}"#.to_string()))
    );
    assert!(matches!(events.recv().await, Some(SinkEvent::Failed(_))));
    assert!(result.await.unwrap().is_err());
}

#[tokio::test]
async fn delivery_failure_aborts_the_task() {
    let upstream = ScriptedStream::completing(vec!["{\"a\":1} {\"b\":2}"]);
    let (sink, events) = ChannelSink::new(16);
    drop(events); // client went away

    let (task, result) = CompletionTask::new(Tier::Privileged, request(), sink);
    run_completion(task, upstream).await;

    let err = result.await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::Delivery { .. }), "got {err:?}");
}

#[tokio::test]
async fn dispatcher_executes_streamed_generation() {
    let upstream = ScriptedStream::completing(vec!["intro {\"title\":\"Q1\"}", " {\"title\":\"Q2\"}"]);
    let dispatcher = TieredDispatcher::new(zero_delay_dispatch(), upstream);

    let (sink, mut events) = ChannelSink::new(16);
    let (task, result) = CompletionTask::new(Tier::Standard, request(), sink);
    dispatcher.submit(task).unwrap();

    assert_eq!(
        events.recv().await,
        Some(SinkEvent::Chunk(r#"{"title":"Q1"}"#.to_string()))
    );
    assert_eq!(
        events.recv().await,
        Some(SinkEvent::Chunk(r#"{"title":"Q2"}"#.to_string()))
    );
    assert_eq!(events.recv().await, Some(SinkEvent::Complete));
    let text = result.await.unwrap().unwrap();
    assert!(text.starts_with("intro "));

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn generation_service_streams_question_objects() {
    let upstream = ScriptedStream::completing(vec![
        "Here you go: {\"title\":\"Q1\",\"options\":[\"A\",\"B\"]}",
        " {\"title\":\"Q2\",\"options\":[\"A\",\"B\"]}",
    ]);
    let dispatcher = Arc::new(TieredDispatcher::new(zero_delay_dispatch(), upstream));
    let service = GenerationService::new(dispatcher.clone(), AiConfig::default());
    let app = Application {
        id: 3,
        app_name: "Capitals Quiz".to_string(),
        description: "Geography drills".to_string(),
        category: AppCategory::Grade,
        strategy: 0,
    };

    let mut stream = service
        .generate_questions(&app, 2, 2, Tier::Privileged)
        .unwrap();

    assert_eq!(
        stream.chunks.recv().await,
        Some(SinkEvent::Chunk(
            r#"{"title":"Q1","options":["A","B"]}"#.to_string()
        ))
    );
    assert_eq!(
        stream.chunks.recv().await,
        Some(SinkEvent::Chunk(
            r#"{"title":"Q2","options":["A","B"]}"#.to_string()
        ))
    );
    assert_eq!(stream.chunks.recv().await, Some(SinkEvent::Complete));
    assert!(stream.result.await.unwrap().is_ok());

    dispatcher.shutdown().await;
}

/// Upstream double that opens a stream and then stays silent forever.
struct SilentStream {
    holds: std::sync::Mutex<Vec<mpsc::Sender<CompletionEvent>>>,
}

#[async_trait]
impl StreamingLlmClient for SilentStream {
    async fn stream_chat(
        &self,
        _request: &CompletionRequest,
    ) -> anyhow::Result<mpsc::Receiver<CompletionEvent>> {
        let (tx, rx) = mpsc::channel(1);
        self.holds.lock().unwrap().push(tx);
        Ok(rx)
    }

    fn provider_name(&self) -> &'static str {
        "silent"
    }
}

#[tokio::test]
async fn external_handle_failure_closes_push_channel() {
    let upstream = Arc::new(SilentStream {
        holds: std::sync::Mutex::new(Vec::new()),
    });
    let dispatcher = Arc::new(TieredDispatcher::new(zero_delay_dispatch(), upstream));
    let service = GenerationService::new(dispatcher, AiConfig::default());
    let app = Application {
        id: 3,
        app_name: "Capitals Quiz".to_string(),
        description: "Geography drills".to_string(),
        category: AppCategory::Grade,
        strategy: 0,
    };

    let mut stream = service
        .generate_questions(&app, 1, 2, Tier::Privileged)
        .unwrap();

    // the task is parked on a silent upstream; fail it from outside
    stream
        .handle
        .fail(CoreError::upstream("caller gave up"))
        .await;

    assert!(matches!(
        stream.chunks.recv().await,
        Some(SinkEvent::Failed(_))
    ));
    assert!(stream.result.await.unwrap().is_err());
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let upstream = ScriptedStream::completing(vec![]);
    let dispatcher = TieredDispatcher::new(zero_delay_dispatch(), upstream);
    dispatcher.shutdown().await;
    dispatcher.shutdown().await;
}
