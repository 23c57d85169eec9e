//! Thin HTTP layer shared by every network backend
//!
//! An [`HttpClient`] is bound to one base endpoint and a default header set.
//! It surfaces transport failures as errors and hands every received response
//! back as-is; deciding what a status code means is the caller's job.

use std::path::Path;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{Result, StoreError};
use crate::form::{self, Form};

/// Raw status and body of a received response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// HTTP client bound to a base URL and default headers
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    headers: Arc<HeaderMap>,
}

impl HttpClient {
    /// Wrap an already configured `reqwest::Client`
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            headers: Arc::new(HeaderMap::new()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Return a client whose headers are this client's overlaid with `extra`
    ///
    /// `self` is left untouched.
    pub fn with_headers<K, V>(&self, extra: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = (*self.headers).clone();
        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_ref().as_bytes()).map_err(|e| {
                StoreError::ConfigurationError(format!(
                    "Invalid header name '{}': {}",
                    name.as_ref(),
                    e
                ))
            })?;
            let value = HeaderValue::from_str(value.as_ref()).map_err(|e| {
                StoreError::ConfigurationError(format!(
                    "Invalid value for header {}: {}",
                    name.as_str(),
                    e
                ))
            })?;
            headers.insert(name, value);
        }

        Ok(Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            headers: Arc::new(headers),
        })
    }

    /// Shorthand for overlaying `Authorization: Bearer <token>`
    pub fn with_bearer_token(&self, token: &str) -> Result<Self> {
        self.with_headers([(AUTHORIZATION.as_str(), format!("Bearer {}", token))])
    }

    /// Join path segments onto the base URL and attach query parameters
    ///
    /// Each segment may itself contain `/`-separated parts; empty parts are
    /// dropped.
    pub fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                StoreError::ConfigurationError(format!(
                    "Base URL cannot carry a path: {}",
                    self.base_url
                ))
            })?;
            path.pop_if_empty();
            path.extend(
                segments
                    .iter()
                    .flat_map(|s| s.split('/'))
                    .filter(|s| !s.is_empty()),
            );
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().copied());
        }
        Ok(url)
    }

    pub async fn do_get(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<HttpResponse> {
        let url = self.url(segments, query)?;
        self.send(Method::GET, url, None).await
    }

    /// Serialize `form` and POST it as `multipart/form-data`
    pub async fn do_post_multipart_form(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        form: &Form,
    ) -> Result<HttpResponse> {
        let url = self.url(segments, query)?;
        let serialized = form::serialize(form).await?;
        self.send(
            Method::POST,
            url,
            Some((serialized.content_type, serialized.body)),
        )
        .await
    }

    /// POST the raw bytes of a file as the request body
    pub async fn do_post_file_body(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        path: &Path,
    ) -> Result<HttpResponse> {
        let url = self.url(segments, query)?;
        let body = tokio::fs::read(path).await?;
        self.send(
            Method::POST,
            url,
            Some(("application/octet-stream".to_string(), body)),
        )
        .await
    }

    pub async fn do_post_json(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<HttpResponse> {
        let url = self.url(segments, query)?;
        let body = serde_json::to_vec(body)?;
        self.send(Method::POST, url, Some(("application/json".to_string(), body)))
            .await
    }

    pub async fn do_patch(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<HttpResponse> {
        let url = self.url(segments, query)?;
        let body = serde_json::to_vec(body)?;
        self.send(Method::PATCH, url, Some(("application/json".to_string(), body)))
            .await
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<(String, Vec<u8>)>,
    ) -> Result<HttpResponse> {
        debug!(%method, %url, "HTTP request");
        let context = format!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .headers((*self.headers).clone());

        if let Some((content_type, bytes)) = body {
            request = request.header(CONTENT_TYPE, content_type).body(bytes);
        }

        let response = request.send().await.map_err(|source| StoreError::Transport {
            context: context.clone(),
            source,
        })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| StoreError::Transport { context, source })?
            .to_vec();

        debug!(status = status.as_u16(), bytes = body.len(), "HTTP response");
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Loopback axum server that answers with canned responses

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
    use axum::response::IntoResponse;
    use axum::Router;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// A request as the server saw it
    #[derive(Debug)]
    pub struct CapturedRequest {
        pub method: Method,
        pub uri: Uri,
        pub headers: HeaderMap,
        pub body: Vec<u8>,
    }

    impl CapturedRequest {
        /// Method and origin-form target, e.g. `POST /api/upload?v=1`
        pub fn target(&self) -> String {
            format!("{} {}", self.method, self.uri)
        }

        pub fn header(&self, name: &str) -> Option<String> {
            self.headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        }

        pub fn body_text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }

    type Pending = Arc<Mutex<VecDeque<(u16, String, oneshot::Sender<CapturedRequest>)>>>;

    /// Serve `responses` in order, one per request
    ///
    /// Returns the base URL and a receiver for each captured request.
    /// Requests beyond the canned list get a 500.
    pub async fn serve(
        responses: Vec<(u16, String)>,
    ) -> (String, Vec<oneshot::Receiver<CapturedRequest>>) {
        let mut receivers = Vec::new();
        let mut pending = VecDeque::new();
        for (status, body) in responses {
            let (tx, rx) = oneshot::channel();
            pending.push_back((status, body, tx));
            receivers.push(rx);
        }

        let app = Router::new()
            .fallback(record)
            .with_state(Arc::new(Mutex::new(pending)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), receivers)
    }

    async fn record(
        State(pending): State<Pending>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> impl IntoResponse {
        let next = pending.lock().unwrap().pop_front();
        let Some((status, reply, tx)) = next else {
            return (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response();
        };

        let _ = tx.send(CapturedRequest {
            method,
            uri,
            headers,
            body: body.to_vec(),
        });
        (
            StatusCode::from_u16(status).unwrap(),
            [(header::CONTENT_TYPE, "application/json")],
            reply,
        )
            .into_response()
    }
}
