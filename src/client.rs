use std::path::{Path, PathBuf};

use futures_util::future::{BoxFuture, FutureExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the chat backend.
///
/// The UI shows one friendly message for all of them; the kind is kept for logs.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(StatusCode),

    #[error("malformed response: {0}")]
    Schema(String),

    #[error("could not read {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request task failed: {0}")]
    Task(String),
}

impl ClientError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Transport(_) => "transport",
            ClientError::Status(_) => "status",
            ClientError::Schema(_) => "schema",
            ClientError::ReadFile { .. } => "read_file",
            ClientError::Task(_) => "task",
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    message: String,
}

/// The two backend calls the session makes.
///
/// Futures are `'static` so they can be spawned onto the runtime and outlive
/// the borrow of the backend.
pub trait Backend: Send + Sync {
    /// Send a chat message, resolving to the assistant's reply.
    fn chat(&self, message: String) -> BoxFuture<'static, ClientResult<String>>;

    /// Upload the CSV at `path`, resolving to the backend's description of the outcome.
    fn upload(&self, path: PathBuf) -> BoxFuture<'static, ClientResult<String>>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn send_chat(&self, message: &str) -> ClientResult<String> {
        let url = self.endpoint("/api/chat");
        tracing::info!(%url, chars = message.chars().count(), "sending chat message");

        let response = self
            .client
            .post(&url)
            .json(&ChatRequest { message })
            .send()
            .await?;

        let chat: ChatResponse = read_json(response).await?;
        Ok(chat.response)
    }

    pub async fn send_file(&self, path: &Path) -> ClientResult<String> {
        let url = self.endpoint("/api/upload");

        let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::info!(%url, file = %file_name, bytes = bytes.len(), "uploading file");

        let part = Part::bytes(bytes).file_name(file_name).mime_str("text/csv")?;
        let form = Form::new().part("file", part);

        let response = self.client.post(&url).multipart(form).send().await?;

        let upload: UploadResponse = read_json(response).await?;
        Ok(upload.message)
    }
}

impl Backend for ApiClient {
    fn chat(&self, message: String) -> BoxFuture<'static, ClientResult<String>> {
        let client = self.clone();
        async move { client.send_chat(&message).await }.boxed()
    }

    fn upload(&self, path: PathBuf) -> BoxFuture<'static, ClientResult<String>> {
        let client = self.clone();
        async move { client.send_file(&path).await }.boxed()
    }
}

/// Reject non-success statuses, then decode the body as `T`.
async fn read_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Status(status));
    }

    let body = response.text().await?;
    decode(&body)
}

fn decode<T: DeserializeOwned>(body: &str) -> ClientResult<T> {
    serde_json::from_str(body).map_err(|e| ClientError::Schema(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Accept one connection, answer it with `status` and `body`, and hand
    /// back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(reply.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            request
        });

        (base_url, server)
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if request_complete(&buf) {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn request_complete(buf: &[u8]) -> bool {
        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let body = &buf[header_end + 4..];
        match headers.lines().find_map(|l| l.strip_prefix("content-length:")) {
            Some(len) => body.len() >= len.trim().parse::<usize>().unwrap_or(0),
            None => body.ends_with(b"0\r\n\r\n"),
        }
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.endpoint("/api/chat"), "http://localhost:3000/api/chat");
    }

    #[test]
    fn test_chat_request_body() {
        let body = serde_json::to_value(ChatRequest { message: "oi" }).unwrap();
        assert_eq!(body, serde_json::json!({ "message": "oi" }));
    }

    #[test]
    fn test_decode_chat_response() {
        let chat: ChatResponse = decode(r#"{"response": "Q1 revenue was **$2M**", "extra": 1}"#).unwrap();
        assert_eq!(chat.response, "Q1 revenue was **$2M**");
    }

    #[test]
    fn test_decode_missing_field_is_schema_error() {
        let err = decode::<ChatResponse>(r#"{"answer": "hi"}"#).unwrap_err();
        assert!(matches!(err, ClientError::Schema(_)));
        assert_eq!(err.kind(), "schema");
    }

    #[test]
    fn test_decode_wrong_type_is_schema_error() {
        let err = decode::<UploadResponse>(r#"{"message": 42}"#).unwrap_err();
        assert!(matches!(err, ClientError::Schema(_)));
    }

    #[test]
    fn test_decode_non_json_is_schema_error() {
        let err = decode::<UploadResponse>("<html>oops</html>").unwrap_err();
        assert!(matches!(err, ClientError::Schema(_)));
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        let client = ApiClient::new("http://127.0.0.1:9");

        let err = client.send_file(&path).await.unwrap_err();
        assert!(matches!(err, ClientError::ReadFile { .. }));
    }

    #[tokio::test]
    async fn test_chat_posts_json_to_chat_endpoint() {
        let (base_url, server) = serve_once("200 OK", r#"{"response": "Q1 revenue was **$2M**"}"#).await;
        let client = ApiClient::new(&base_url);

        let reply = client.send_chat("What was Q1 revenue?").await.unwrap();
        assert_eq!(reply, "Q1 revenue was **$2M**");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/chat HTTP/1.1\r\n"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(request.ends_with(r#"{"message":"What was Q1 revenue?"}"#));
    }

    #[tokio::test]
    async fn test_chat_error_status_is_status_error() {
        let (base_url, server) = serve_once("500 Internal Server Error", r#"{"error": "boom"}"#).await;
        let client = ApiClient::new(&base_url);

        let err = client.send_chat("oi").await.unwrap_err();
        assert!(matches!(err, ClientError::Status(code) if code == StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(err.kind(), "status");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_chat_success_with_wrong_shape_is_schema_error() {
        let (base_url, server) = serve_once("200 OK", r#"{"message": "not a chat reply"}"#).await;
        let client = ApiClient::new(&base_url);

        let err = client.send_chat("oi").await.unwrap_err();
        assert!(matches!(err, ClientError::Schema(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_file_part() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vendas.csv");
        std::fs::write(&path, "regiao,total\nsul,1200\n").unwrap();

        let (base_url, server) = serve_once("200 OK", r#"{"message": "2 linhas processadas."}"#).await;
        let client = ApiClient::new(&base_url);

        let message = client.send_file(&path).await.unwrap();
        assert_eq!(message, "2 linhas processadas.");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/upload HTTP/1.1\r\n"));
        assert!(request.to_ascii_lowercase().contains("content-type: multipart/form-data; boundary="));
        assert!(request.contains(r#"name="file"; filename="vendas.csv""#));
        assert!(request.contains("text/csv"));
        assert!(request.contains("regiao,total\nsul,1200\n"));
    }

    #[tokio::test]
    async fn test_upload_error_status_and_bad_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vendas.csv");
        std::fs::write(&path, "a,b\n").unwrap();

        let (base_url, server) = serve_once("413 Payload Too Large", "{}").await;
        let err = ApiClient::new(&base_url).send_file(&path).await.unwrap_err();
        assert!(matches!(err, ClientError::Status(code) if code == StatusCode::PAYLOAD_TOO_LARGE));
        server.await.unwrap();

        let (base_url, server) = serve_once("200 OK", r#"{"response": "wrong field"}"#).await;
        let err = ApiClient::new(&base_url).send_file(&path).await.unwrap_err();
        assert!(matches!(err, ClientError::Schema(_)));
        server.await.unwrap();
    }
}
