pub mod classify;
pub mod error;
pub mod extractors;
#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;
pub mod media;
pub mod media_type;
pub mod oracle;
pub mod pipeline;
pub mod platform;
pub mod render;
pub mod store;
pub mod vocabulary;

pub use classify::{Classifier, ClassificationInput, MediaPayload};
pub use error::{ExtractionError, IngestError, MediaError, OracleError, Result, StoreError};
pub use extractors::{Extractor, Extractors};
pub use media::{MediaMaterializer, ScratchScope};
pub use media_type::detect_media_type;
pub use oracle::{GeminiOracle, Oracle, OracleRequest};
pub use pipeline::{IngestSettings, Ingestor, Submission};
pub use platform::classify_platform;
pub use render::{BrowserlessRenderer, Dom, Fetcher, HttpFetcher, RenderedPage, Renderer};
pub use store::{PgStore, Store};
pub use vocabulary::{ReconcileOutcome, Reconciler};
