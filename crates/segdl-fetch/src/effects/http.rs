use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::data::Range;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Asynchronous HTTP client abstraction.
///
/// This trait provides the minimal interface the downloader needs: one ranged
/// GET per fetcher and a size query. Implementations handle their own
/// timeouts, redirects and error mapping.
///
/// # Implementations
///
/// - [`ReqwestClient`]: Production implementation using `reqwest`
/// - Mock implementations for testing
pub trait HttpClient: Send + Sync + 'static {
    /// Error type for HTTP operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Request exactly the bytes of `range` and return the body as a stream.
    ///
    /// The stream must yield the bytes starting at `range.start`; it may end
    /// early (the caller re-requests what is missing) and may run past
    /// `range.end` (the caller clips).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails (DNS failure, connection error,
    /// a status that does not honor the range, etc.).
    fn fetch_range(
        &self,
        url: &str,
        range: Range,
    ) -> impl Future<
        Output = std::result::Result<
            BoxStream<'static, std::result::Result<Bytes, Self::Error>>,
            Self::Error,
        >,
    > + Send;

    /// Query the size of the resource without downloading the body.
    ///
    /// `Ok(None)` if the server does not report one.
    fn content_length(
        &self,
        url: &str,
    ) -> impl Future<Output = std::result::Result<Option<u64>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;
    use futures_util::StreamExt;
    use reqwest::StatusCode;
    use reqwest::header::{ACCEPT_ENCODING, CONTENT_LENGTH, RANGE};
    use thiserror::Error;

    use crate::data::Timeouts;

    #[derive(Debug, Error)]
    pub enum HttpError {
        #[error(transparent)]
        Request(#[from] reqwest::Error),

        #[error("server answered {status} to range {range}")]
        UnexpectedStatus { status: StatusCode, range: Range },
    }

    /// Production HTTP client implementation using reqwest.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        /// Create a new ReqwestClient with the given timeouts.
        pub fn new(timeouts: Timeouts) -> Result<Self, HttpError> {
            let client = reqwest::Client::builder()
                .connect_timeout(timeouts.connect)
                .read_timeout(timeouts.read)
                .build()?;
            Ok(Self { client })
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = HttpError;

        async fn fetch_range(
            &self,
            url: &str,
            range: Range,
        ) -> Result<BoxStream<'static, Result<Bytes, Self::Error>>, Self::Error> {
            let response = self
                .client
                .get(url)
                .header(RANGE, range.header_value())
                .header(ACCEPT_ENCODING, "identity")
                .send()
                .await?;

            // A 200 carries the whole body, which is only usable from offset 0.
            let status = response.status();
            let honored = status == StatusCode::PARTIAL_CONTENT
                || (status == StatusCode::OK && range.start == 0);
            if !honored {
                return Err(HttpError::UnexpectedStatus { status, range });
            }

            let stream = response
                .bytes_stream()
                .map(|result| result.map_err(HttpError::from));
            Ok(Box::pin(stream))
        }

        async fn content_length(&self, url: &str) -> Result<Option<u64>, Self::Error> {
            let response = self
                .client
                .head(url)
                .header(ACCEPT_ENCODING, "identity")
                .send()
                .await?
                .error_for_status()?;
            let content_length = response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());

            Ok(content_length)
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::{HttpError, ReqwestClient};
