//! Transport for the querydesk backend: the HTTP client, incremental body
//! reading, end-of-stream detection, and a scripted backend for tests.

pub mod http;
pub mod reader;
pub mod sentinel;

pub mod mock;

pub use http::{HttpBackend, HttpBackendConfig};
pub use mock::{MockBackend, MockChunk, MockStream, Recorded};
pub use reader::{ReadOutcome, TransportReader, Utf8Decoder};
pub use sentinel::{Detection, SentinelDetector};
