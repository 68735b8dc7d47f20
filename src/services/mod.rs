pub mod content_generator;
pub mod draft_writer;
pub mod flair;
pub mod history_repair;
pub mod history_store;
pub mod llm_service;
pub mod manual_log;
pub mod metrics_client;
pub mod notifier;
pub mod performance_sync;
pub mod quality;
pub mod report_writer;
pub mod submission;
pub mod target_scheduler;

pub use content_generator::{ContentGenerator, GeneratedPost, LlmContentGenerator};
pub use draft_writer::DraftWriter;
pub use history_store::HistoryStore;
pub use llm_service::LlmService;
pub use metrics_client::{CommunityRulesSource, MetricsClient, PostMetricsSource};
pub use notifier::{DesktopNotifier, NoopNotifier, Notifier};
pub use report_writer::ReportWriter;
pub use submission::{SubmissionAdapter, SubmitOutcome, SubmitRequest, Submitter};
