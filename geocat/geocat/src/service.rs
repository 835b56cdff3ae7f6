//! Authorized, retried, cancellable GET requests against catalog services.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::cancellation::CancellationContext;
use crate::error::{Error, Result};
use crate::network::{HttpRequest, HttpResponse, Network, RequestId};
use crate::retry::{self, RetrySettings};
use crate::settings::TokenProvider;

/// Source of request ids, process-wide so clients sharing a network never
/// reuse one another's ids.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Marker the metadata service puts in the body of a 400 for a bad version.
const INVALID_VERSION_MARKER: &str = "invalid version";

/// Issues requests on behalf of one client.
pub(crate) struct ServiceClient {
    network: Arc<dyn Network>,
    retry: RetrySettings,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl ServiceClient {
    pub(crate) fn new(
        network: Arc<dyn Network>,
        retry: RetrySettings,
        token_provider: Option<Arc<dyn TokenProvider>>,
    ) -> Self {
        Self {
            network,
            retry,
            token_provider,
        }
    }

    /// Fetch `url` and return the body of a successful response.
    ///
    /// Transient failures are retried per the client's retry settings;
    /// anything else is mapped to the error taxonomy.
    pub(crate) async fn get(&self, url: &str, context: &CancellationContext) -> Result<Vec<u8>> {
        let response = retry::execute(&self.retry, context, move |attempt| async move {
            tracing::debug!(url, attempt, "fetching");
            let response = self.send_once(url, context).await?;
            if is_terminal(response.status) {
                return Err(classify(url, &response));
            }
            Ok(response)
        })
        .await?;

        if response.is_success() {
            Ok(response.body)
        } else {
            Err(classify(url, &response))
        }
    }

    /// Send one request, registered as the chain's in-flight operation.
    async fn send_once(&self, url: &str, context: &CancellationContext) -> Result<HttpResponse> {
        let mut request = HttpRequest::get(url);
        if let Some(provider) = &self.token_provider {
            request = request.with_header("Authorization", format!("Bearer {}", provider.token()?));
        }

        let id = RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed));
        let network = Arc::clone(&self.network);
        let _in_flight = context.execute_or_cancelled(move || network.cancel(id))?;

        let response = tokio::select! {
            result = self.network.send(request, id) => result?,
            () = context.cancelled() => return Err(Error::Cancelled),
        };

        // The transport may not have honored the cancel.
        context.check()?;
        Ok(response)
    }
}

/// Client errors that no retry can fix.
fn is_terminal(status: u16) -> bool {
    (400..500).contains(&status) && status != 408 && status != 429
}

/// Map a non-success response to an error.
fn classify(url: &str, response: &HttpResponse) -> Error {
    let message = response.body_text();
    match response.status {
        400 if message.to_ascii_lowercase().contains(INVALID_VERSION_MARKER) => {
            Error::invalid_argument(format!("invalid version requested from {url}: {message}"))
        }
        400 => Error::invalid_argument(format!("bad request to {url}: {message}")),
        401 | 403 => Error::AccessDenied {
            url: url.to_string(),
            message,
        },
        404 => Error::not_found(format!("{url}: {message}")),
        status => Error::ServiceUnavailable {
            status: Some(status),
            message,
        },
    }
}
