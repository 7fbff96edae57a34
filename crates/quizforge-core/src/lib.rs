//! AI-completion execution core for the Quizforge education platform.
//!
//! Everything around this crate — persistence, auth, request validation,
//! the CRUD surface — is routine and lives elsewhere. This crate owns
//! the three pieces that are not:
//!
//! - **Tiered execution dispatcher**: two isolated worker pools
//!   (privileged / standard) with opposite saturation policies —
//!   fail-fast rejection for privileged callers, silent load-shedding
//!   for standard ones.
//! - **Streaming completion processor**: consumes an upstream partial
//!   token stream, reassembles it into complete top-level JSON-object
//!   chunks, and pushes each one to the caller the moment it closes.
//! - **Idempotent scoring memoizer**: fingerprints (application,
//!   answers) pairs, caches results for five idle minutes, and holds a
//!   per-fingerprint distributed lock so duplicate concurrent requests
//!   converge on one computation.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use quizforge_core::config::CoreConfig;
//! use quizforge_core::dispatch::TieredDispatcher;
//! use quizforge_core::generation::GenerationService;
//! use quizforge_core::model::{AppCategory, Application};
//! use quizforge_core::providers::openai::OpenAiClient;
//! use quizforge_core::sink::SinkEvent;
//! use quizforge_core::task::Tier;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cfg = CoreConfig::default();
//! let upstream = Arc::new(OpenAiClient::from_config(&cfg.ai));
//! let dispatcher = Arc::new(TieredDispatcher::new(cfg.dispatch.clone(), upstream));
//! let generation = GenerationService::new(dispatcher.clone(), cfg.ai.clone());
//!
//! let app = Application {
//!     id: 1,
//!     app_name: "Capitals Quiz".into(),
//!     description: "Geography drills".into(),
//!     category: AppCategory::Grade,
//!     strategy: 0,
//! };
//! let mut stream = generation.generate_questions(&app, 10, 4, Tier::Privileged)?;
//! while let Some(event) = stream.chunks.recv().await {
//!     match event {
//!         SinkEvent::Chunk(json) => println!("{json}"),
//!         SinkEvent::Complete => break,
//!         SinkEvent::Failed(message) => anyhow::bail!(message),
//!     }
//! }
//! dispatcher.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod fingerprint;
pub mod generation;
pub mod lock;
pub mod model;
pub mod providers;
pub mod scoring;
pub mod sink;
pub mod stream;
pub mod task;

pub use config::CoreConfig;
pub use dispatch::TieredDispatcher;
pub use errors::{CoreError, CoreResult};
pub use scoring::AiScoringEngine;
pub use task::{CompletionTask, TaskHandle, Tier};
