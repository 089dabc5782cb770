//! HTTP client for the image-to-video Conversion Service.
//!
//! Provides typed wire messages, the [`ConversionApi`](api::ConversionApi)
//! wrapper around the `/api/convert`, `/api/progress` and `/api/download`
//! endpoints, the [`ConversionError`](api::ConversionError) taxonomy, and
//! the backoff helper used when retrying transient transport failures.

pub mod api;
pub mod messages;
pub mod retry;

pub use api::{ConversionApi, ConversionError, SubmitOutcome, SubmitRequest};
pub use messages::{ProgressReport, RemoteStatus};
