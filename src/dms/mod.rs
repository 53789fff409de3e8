//! DMS retrieval protocol client
//!
//! Layered leaf-first:
//! - [`transport`] - the [`DmsTransport`] seam: one remote call per method
//! - [`soap`] - [`SoapTransport`], the SOAP-over-HTTP implementation
//! - [`session`] - login handshake ([`SessionManager`])
//! - [`locator`] - document id to content handle ([`DocumentLocator`])
//! - [`stream`] - chunked read loop and handle release ([`StreamReader`])
//! - [`metadata`] - filename inference from the property bag
//! - [`retriever`] - the composed retrieve-by-identifier operation ([`Retriever`])
//!
//! Calls against one stream handle are strictly sequential: chunks carry no
//! sequence numbers, so ordering depends on never overlapping reads.

mod envelope;
pub mod locator;
pub mod metadata;
pub mod retriever;
pub mod session;
pub mod soap;
pub mod stream;
pub mod transport;

/// Result code the DMS uses for success on every call
pub const RESULT_SUCCESS: i32 = 0;

pub use locator::{DocumentLocator, Located, LocatedDocument};
pub use metadata::infer_filename;
pub use retriever::Retriever;
pub use session::SessionManager;
pub use soap::SoapTransport;
pub use stream::StreamReader;
pub use transport::DmsTransport;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
