//! Event delivery over HTTP.
//!
//! - [`HttpTransport`]: POSTs to `{host}/v3/projects/{id}/collect?stm={ms}`
//!   with timeouts, bounded retry of transient failures, and redirects
//!   treated as failures
//! - [`GzipEncoder`]: compresses bodies and sets `X-Compress-Codec: gzip`
//! - [`EventHttpSender`]: runs a batch through the registered encoder and
//!   transport
//!
//! Only a 2xx response counts as delivered.

mod encoder;
mod error;
mod sender;
mod transport;

#[cfg(test)]
mod tests;

pub use encoder::{gzip, GzipEncoder, GzipEncoderModule, COMPRESS_CODEC_HEADER, GZIP_CODEC};
pub use error::{SenderError, SenderResult};
pub use sender::EventHttpSender;
pub use transport::{HttpTransport, HttpTransportModule, TransportConfig};
