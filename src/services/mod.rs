/// Display mirror fed by pushes and store polls.
pub mod display_sync;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Roster commands and outcome commits.
pub mod queue_service;
/// Server-Sent Events payloads.
pub mod sse_events;
/// Server-Sent Events streams and the control token.
pub mod sse_service;
/// Storage connection supervision and degraded mode.
pub mod storage_supervisor;
/// Game clock commands and the countdown task.
pub mod timer_service;
