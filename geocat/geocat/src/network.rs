//! Network transport abstraction.
//!
//! The read path talks to the catalog services through the [`Network`] trait:
//! send a request under a caller-chosen [`RequestId`], and cancel it by that
//! id. [`HttpNetwork`] implements it over `reqwest`; tests substitute
//! scripted implementations.

use crate::error::{Error, Result};
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    pin::Pin,
    sync::{Mutex, PoisonError},
};
use tokio::sync::oneshot;

/// Future type for network send operations.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + 'a>>;

/// Identifier of one in-flight network request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An outgoing GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL.
    pub url: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Create a GET request with no extra headers.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A response, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A transport capable of sending requests and cancelling them by id.
///
/// `send` resolves with the response for any status the server returned; only
/// transport failures are errors. A request cancelled through `cancel`
/// resolves with [`Error::Cancelled`], if it resolves at all.
pub trait Network: Send + Sync {
    /// Send a request identified by `id`.
    fn send(&self, request: HttpRequest, id: RequestId) -> SendFuture<'_>;

    /// Cancel the in-flight request `id`. Unknown ids are ignored.
    fn cancel(&self, id: RequestId);
}

/// Network implementation backed by a `reqwest` client.
#[derive(Debug, Default)]
pub struct HttpNetwork {
    http: reqwest::Client,
    in_flight: Mutex<HashMap<RequestId, oneshot::Sender<()>>>,
}

impl HttpNetwork {
    /// Create a network with a default `reqwest` client.
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Create a network with a custom `reqwest` client.
    #[must_use]
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of requests currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RequestId, oneshot::Sender<()>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let network_error = |e: reqwest::Error| Error::Network {
            url: request.url.clone(),
            message: e.to_string(),
        };

        let mut builder = self.http.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(network_error)?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

/// Removes a request from the in-flight table once its send future is
/// finished or dropped.
struct Registration<'a> {
    network: &'a HttpNetwork,
    id: RequestId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.network.lock().remove(&self.id);
    }
}

impl Network for HttpNetwork {
    fn send(&self, request: HttpRequest, id: RequestId) -> SendFuture<'_> {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.lock().insert(id, cancel_tx);
        let registration = Registration { network: self, id };

        Box::pin(async move {
            let _registration = registration;
            tokio::select! {
                result = self.execute(&request) => result,
                _ = cancel_rx => Err(Error::Cancelled),
            }
        })
    }

    fn cancel(&self, id: RequestId) {
        if let Some(cancel_tx) = self.lock().remove(&id) {
            tracing::debug!(%id, "cancelling request");
            let _ = cancel_tx.send(());
        }
    }
}
