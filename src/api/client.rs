use super::error::ApiError;
use super::interceptor::{BearerAuth, ExpireSessionOn401, Interceptor};
use crate::config::ClientConfig;
use crate::redact::redact_secrets;
use crate::store::SessionStore;
use crate::types::{Envelope, ErrorBody};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const CONNECT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl RequestConfig {
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// A 2xx response, untouched apart from reading the body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed.message.filter(|m| !m.trim().is_empty())
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: SessionStore,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: SessionStore) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECONDS))
            .default_headers(default_headers)
            .build()?;

        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(BearerAuth::new(session.clone())),
            Arc::new(ExpireSessionOn401::new(session.clone())),
        ];

        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            session,
            interceptors,
        })
    }

    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| ApiError::InvalidPath {
                path: path.to_string(),
                source: Some(source),
            })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Sends one request through the interceptors. Non-2xx statuses come
    /// back as errors; nothing is retried.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        config: RequestConfig,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(path, &config.query)?;
        let mut headers = config.headers;
        for interceptor in &self.interceptors {
            interceptor.on_request(&mut headers);
        }

        tracing::debug!(%method, path, "api request");
        let mut req = self.http.request(method.clone(), url).headers(headers);
        if let Some(body) = body {
            req = req.json(body);
        }

        let res = match req.send().await {
            Ok(res) => res,
            Err(e) => {
                let err = ApiError::from(e);
                tracing::warn!(%method, path, error = %err.redacted(), "api request failed");
                return Err(err);
            }
        };

        let status = res.status();
        for interceptor in &self.interceptors {
            interceptor.on_response(status);
        }

        let headers = res.headers().clone();
        let body = match res.text().await {
            Ok(body) => body,
            // The session is already gone; report the 401, not the broken body.
            Err(e) if status == StatusCode::UNAUTHORIZED => {
                tracing::warn!(%method, path, error = %e, "failed to read 401 body");
                return Err(ApiError::Unauthorized { message: None });
            }
            Err(e) => return Err(e.into()),
        };

        if status.is_success() {
            return Ok(ApiResponse {
                status,
                headers,
                body,
            });
        }

        tracing::warn!(
            %method,
            path,
            status = status.as_u16(),
            body = %redact_secrets(&body),
            "api request rejected"
        );
        let message = error_message(&body);
        if status == StatusCode::UNAUTHORIZED {
            Err(ApiError::Unauthorized { message })
        } else {
            Err(ApiError::Status { status, message })
        }
    }

    /// Sends the request and decodes the `data` field of the envelope.
    pub async fn request_data<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        config: RequestConfig,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let res = self.request(method, path, body, config).await?;
        res.json::<Envelope<T>>()
            .map(|envelope| envelope.data)
            .map_err(|source| {
                tracing::error!(path, error = %source, "response does not match schema");
                ApiError::Decode {
                    path: path.to_string(),
                    source,
                }
            })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get_with(path, RequestConfig::default()).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        config: RequestConfig,
    ) -> Result<T, ApiError> {
        self.request_data::<T, ()>(Method::GET, path, None, config)
            .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request_data(Method::POST, path, Some(body), RequestConfig::default())
            .await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request_data(Method::PUT, path, Some(body), RequestConfig::default())
            .await
    }

    /// For endpoints whose response body carries nothing the caller needs.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), ApiError> {
        self.request(method, path, body, RequestConfig::default())
            .await
            .map(|_| ())
    }
}

/// Encodes one id as a single path segment. `%` is escaped too, so only a
/// literal `.` or `..` could turn into a dot segment; those and blank ids
/// are rejected.
pub(crate) fn segment(id: &str) -> Result<String, ApiError> {
    let encoded = urlencoding::encode(id.trim()).into_owned();
    match encoded.as_str() {
        "" | "." | ".." => Err(ApiError::InvalidPath {
            path: id.to_string(),
            source: None,
        }),
        _ => Ok(encoded),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::MemoryStore;

    pub(crate) fn client_for(server: &mockito::ServerGuard) -> (ApiClient, SessionStore) {
        let config = ClientConfig::new()
            .unwrap()
            .with_api_url(&server.url())
            .unwrap();
        let session = SessionStore::new(Arc::new(MemoryStore::new()));
        let client = ApiClient::new(&config, session.clone()).unwrap();
        (client, session)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::client_for;
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore, KEY_TOKEN, KEY_USER};
    use crate::types::{Session, User};
    use mockito::{Matcher, Server};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_session() -> Session {
        Session {
            token: "abc".to_string(),
            user: User {
                id: "1".to_string(),
                email: "a@b.com".to_string(),
                name: None,
                avatar: None,
                role: None,
                membership: None,
            },
        }
    }

    #[tokio::test]
    async fn request_without_token_sends_no_authorization() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/blogs")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .expect(1)
            .create_async()
            .await;
        let (client, _) = client_for(&server);

        let blogs: Vec<serde_json::Value> = client.get("/blogs").await.unwrap();

        assert!(blogs.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn request_with_token_sends_bearer() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/users/profile")
            .match_header("authorization", "Bearer abc")
            .with_status(200)
            .with_body(r#"{"data":{"ok":true}}"#)
            .expect(1)
            .create_async()
            .await;
        let (client, session) = client_for(&server);
        session.save(&sample_session()).unwrap();

        let _: serde_json::Value = client.get("users/profile").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_clears_session_and_returns_original_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/quit-plans")
            .with_status(401)
            .with_body(r#"{"message":"Token expired"}"#)
            .create_async()
            .await;
        let (client, session) = client_for(&server);
        session.save(&sample_session()).unwrap();

        let err = client
            .get::<serde_json::Value>("/quit-plans")
            .await
            .unwrap_err();

        match err {
            ApiError::Unauthorized { message } => {
                assert_eq!(message.as_deref(), Some("Token expired"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.token(), None);
        assert_eq!(session.user(), None);
    }

    struct CountingStore {
        inner: MemoryStore,
        removals: AtomicUsize,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: String) -> Result<(), crate::store::StoreError> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<bool, crate::store::StoreError> {
            let removed = self.inner.remove(key)?;
            if removed {
                self.removals.fetch_add(1, Ordering::SeqCst);
            }
            Ok(removed)
        }
    }

    #[tokio::test]
    async fn unauthorized_removes_each_key_exactly_once() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/chat/users")
            .with_status(401)
            .create_async()
            .await;
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            removals: AtomicUsize::new(0),
        });
        store.set(KEY_TOKEN, "abc".to_string()).unwrap();
        store.set(KEY_USER, "{}".to_string()).unwrap();
        let session = SessionStore::new(store.clone());
        let config = ClientConfig::new().unwrap().with_api_url(&server.url()).unwrap();
        let client = ApiClient::new(&config, session).unwrap();

        for _ in 0..2 {
            let err = client
                .get::<serde_json::Value>("/chat/users")
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Unauthorized { message: None }));
        }

        assert_eq!(store.removals.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_leave_session_alone() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/blogs")
            .with_status(422)
            .with_body(r#"{"message":"Title is required"}"#)
            .create_async()
            .await;
        let (client, session) = client_for(&server);
        session.save(&sample_session()).unwrap();

        let err = client
            .post::<serde_json::Value, _>("/blogs", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
        assert_eq!(err.user_message(), "Title is required");
        assert_eq!(session.token().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn schema_mismatch_fails_loudly() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/membership/packages")
            .with_status(200)
            .with_body(r#"{"packages":[]}"#)
            .create_async()
            .await;
        let (client, _) = client_for(&server);

        let err = client
            .get::<Vec<serde_json::Value>>("/membership/packages")
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Decode { ref path, .. } if path == "/membership/packages"));
    }

    #[tokio::test]
    async fn query_pairs_are_encoded() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/blogs")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search".into(), "quit day".into()),
                Matcher::UrlEncoded("page".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data":null}"#)
            .create_async()
            .await;
        let (client, _) = client_for(&server);

        let config = RequestConfig::default()
            .query("search", "quit day")
            .query("page", 2);
        let _: Option<serde_json::Value> = client.get_with("/blogs", config).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        let config = ClientConfig::new()
            .unwrap()
            .with_api_url("http://127.0.0.1:9")
            .unwrap();
        let session = SessionStore::new(Arc::new(MemoryStore::new()));
        let client = ApiClient::new(&config, session).unwrap();

        let err = client.get::<serde_json::Value>("/blogs").await.unwrap_err();

        assert_eq!(err.kind(), crate::api::ErrorKind::Network);
    }

    #[test]
    fn segment_encodes_ids() {
        assert_eq!(segment(" a/b ").unwrap(), "a%2Fb");
        assert_eq!(segment("%2e%2E").unwrap(), "%252e%252E");
        assert_eq!(segment("v1.2").unwrap(), "v1.2");
    }

    #[test]
    fn segment_rejects_blank_and_dot_ids() {
        for id in ["", "  ", ".", "..", " .. "] {
            assert!(
                matches!(segment(id), Err(ApiError::InvalidPath { source: None, .. })),
                "{id:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn truncated_401_body_still_reports_unauthorized() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 401 Unauthorized\r\ncontent-length: 100\r\n\r\n{\"mess")
                .await
                .unwrap();
        });
        let config = ClientConfig::new()
            .unwrap()
            .with_api_url(&format!("http://{addr}"))
            .unwrap();
        let session = SessionStore::new(Arc::new(MemoryStore::new()));
        session.save(&sample_session()).unwrap();
        let client = ApiClient::new(&config, session.clone()).unwrap();

        let err = client.get::<serde_json::Value>("/chat/users").await.unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized { message: None }));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn server_message_is_not_trimmed() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/users/profile")
            .with_status(400)
            .with_body(r#"{"message":"  Name is too long.\n"}"#)
            .create_async()
            .await;
        let (client, _) = client_for(&server);

        let err = client
            .put::<serde_json::Value, _>("/users/profile", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "  Name is too long.\n");
    }
}
