//! Shared HTTP plumbing for adapters

use super::{ByteStream, ProviderError, UpstreamRequest};
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Build the client shared by all adapters
///
/// Only the connect phase is bounded; streamed bodies may legitimately run
/// for minutes.
pub fn build_client(connect_timeout: Duration) -> Result<Client, ProviderError> {
    Ok(Client::builder().connect_timeout(connect_timeout).build()?)
}

/// Send a shaped request, failing on non-2xx replies
pub async fn send(
    client: &Client,
    upstream: &UpstreamRequest,
    cancel: &CancellationToken,
) -> Result<Response, ProviderError> {
    let mut builder = client.post(&upstream.url).json(&upstream.body);
    for (name, value) in &upstream.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ProviderError::Aborted),
        response = builder.send() => response?,
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "Upstream rejected request");
        return Err(ProviderError::Upstream {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Read and decode a JSON body, abandoning it on cancellation
pub async fn read_json<T: DeserializeOwned>(
    response: Response,
    cancel: &CancellationToken,
) -> Result<T, ProviderError> {
    let bytes = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ProviderError::Aborted),
        bytes = response.bytes() => bytes?,
    };
    serde_json::from_slice(&bytes).map_err(|error| ProviderError::Decode(error.to_string()))
}

/// Expose the body as a byte stream
///
/// Dropping the stream closes the upstream connection.
pub fn byte_stream(response: Response) -> ByteStream {
    Box::pin(
        response
            .bytes_stream()
            .map(|read| read.map_err(ProviderError::from)),
    )
}
