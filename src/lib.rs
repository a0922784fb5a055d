//! `vidscope` — turns a long-form video into a structured, queryable
//! intelligence report: an executive summary, a chronological topic list
//! with timestamp ranges, a deduplicated set of hero visual frames, named
//! entities, and a slide-deck summary.
//!
//! This crate implements the *Processing Pipeline* only: the orchestration
//! that, given a locally available video file, interleaves media decoding,
//! an LM used for transcription/vision/synthesis, and a blob store used to
//! publish selected frames. Drive/site ingestion, the stable HTTP API,
//! persistence, and the playlist orchestrator are external collaborators
//! reached only through the narrow traits in [`ingest`], [`blob`], and
//! [`store`].
//!
//! ## Layout
//!
//! - [`job`] — the data model: `Job` and every value it owns.
//! - [`media`] — C1, the `ffmpeg` facade (probe/extract/sample).
//! - [`image_utils`] — C2, perceptual-hash clustering and sharpness.
//! - [`roi`] — C3, audio+visual event fusion into dense-resample windows.
//! - [`lm`] — C4, the typed LM client (transcription, analysis, vision,
//!   synthesis, genre) plus JSON repair.
//! - [`blob`] — C5, the blob store facade trait + `HttpBlobStore`.
//! - [`store`] — C6, the job store facade trait + `InMemoryJobStore`.
//! - [`orchestrator`] — C7, the stage machine tying every component together.
//! - [`reconcile`] — C8, transcript/topic dedup, frame↔topic binding, the ad
//!   filter, and the topic↔visual fallback mapping.
//! - [`concurrency`] — the three bounded pools and the order-preserving
//!   fan-out primitive every stage uses.
//! - [`ingest`] — the ingest adapter trait boundary.
//! - [`config`] — process-wide configuration.
//! - [`error`] — the crate-wide error type.
//! - [`logging`] — structured logging setup.

pub mod blob;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod image_utils;
pub mod ingest;
pub mod job;
pub mod lm;
pub mod logging;
pub mod media;
pub mod orchestrator;
pub mod reconcile;
pub mod roi;
pub mod store;

pub use error::{Error, Result};
pub use job::Job;
pub use orchestrator::Orchestrator;
