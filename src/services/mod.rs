/// Participant change detection between snapshots.
pub mod change_detection;
/// Detailed results as CSV.
pub mod csv_export;
/// Device preferences and event archive.
pub mod device_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Event creation and participant entry.
pub mod event_service;
/// Health check service.
pub mod health_service;
/// Random identifiers and participant identities.
pub mod identity;
/// Cancellable repeating tasks.
pub mod polling;
/// Question catalog and enabled-set resolution.
pub mod questions;
/// Remote document store operations and change subscriptions.
pub mod remote_store;
/// Results projections.
pub mod results_service;
/// Retry with exponential backoff.
pub mod retry;
/// Scoring, distribution and ranking.
pub mod scoring;
/// Server-Sent Events streaming of live sessions.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Per-view synchronization sessions.
pub mod sync_engine;
/// Serialized remote participant writes.
pub mod write_queue;
