//! Trello REST client.
//!
//! Authenticates with `key`/`token` query parameters and retries transient
//! failures (transport errors, HTTP 429, HTTP 5xx) with exponential backoff.
//! Any other non-success status fails the call immediately.
//!
//! POST creates lists and comments, so a POST is only resent after a 429: any
//! other failure may have reached the server and a resend would duplicate it.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;

use super::{Board, BoardList, BoardService, Card, Member};
use crate::config::TrelloConfig;
use crate::error::BoardError;

/// Card fields the rules read.
const CARD_FIELDS: &str = "id,name,closed,due,dateLastActivity,idMembers";

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Trello board service.
pub struct TrelloClient {
    config: TrelloConfig,
    client: reqwest::Client,
}

impl TrelloClient {
    pub fn new(config: TrelloConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base, path.trim_start_matches('/'))
    }

    /// Issue a request, retrying transient failures, and return the raw body.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<String, BoardError> {
        let mut attempt = 0;
        loop {
            match self.send_once(method.clone(), path, query).await {
                Ok(body) => return Ok(body),
                Err(e) if retryable(&method, &e) && attempt < self.config.max_retries => {
                    let delay = self.backoff(attempt, &e);
                    tracing::warn!(
                        endpoint = path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Trello request failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<String, BoardError> {
        let resp = self
            .client
            .request(method, self.api_url(path))
            .query(&[
                ("key", self.config.api_key.expose_secret()),
                ("token", self.config.token.expose_secret()),
            ])
            .query(query)
            .send()
            .await
            .map_err(|e| BoardError::RequestFailed {
                endpoint: path.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(BoardError::RateLimited {
                endpoint: path.to_string(),
                retry_after,
            });
        }

        let body = resp.text().await.map_err(|e| BoardError::RequestFailed {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(BoardError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BoardError> {
        let body = self.send(Method::GET, path, query).await?;
        decode(path, &body)
    }

    fn backoff(&self, attempt: u32, error: &BoardError) -> Duration {
        if let BoardError::RateLimited {
            retry_after: Some(after),
            ..
        } = error
        {
            return (*after).min(MAX_BACKOFF);
        }
        let base = self.config.retry_base_delay;
        let exp = base.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = base.as_millis() as u64 / 2;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        (exp + jitter).min(MAX_BACKOFF)
    }
}

/// Whether a failed request can be sent again without duplicating its effect.
fn retryable(method: &Method, error: &BoardError) -> bool {
    if method.is_idempotent() {
        error.is_transient()
    } else {
        matches!(error, BoardError::RateLimited { .. })
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, BoardError> {
    serde_json::from_str(body).map_err(|e| BoardError::InvalidResponse {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl BoardService for TrelloClient {
    async fn boards_for_member(&self, member_id: &str) -> Result<Vec<Board>, BoardError> {
        self.get_json(
            &format!("members/{member_id}/boards"),
            &[("fields", "id,name")],
        )
        .await
    }

    async fn open_lists(&self, board_id: &str) -> Result<Vec<BoardList>, BoardError> {
        self.get_json(
            &format!("boards/{board_id}/lists"),
            &[("filter", "open"), ("fields", "id,name")],
        )
        .await
    }

    async fn create_list(
        &self,
        board_id: &str,
        name: &str,
        position: u32,
    ) -> Result<BoardList, BoardError> {
        let pos = position.to_string();
        let body = self
            .send(
                Method::POST,
                "lists",
                &[("idBoard", board_id), ("name", name), ("pos", pos.as_str())],
            )
            .await?;
        decode("lists", &body)
    }

    async fn cards_in_list(&self, list_id: &str) -> Result<Vec<Card>, BoardError> {
        self.get_json(
            &format!("lists/{list_id}/cards/all"),
            &[("fields", CARD_FIELDS)],
        )
        .await
    }

    async fn member(&self, member_id: &str) -> Result<Member, BoardError> {
        self.get_json(
            &format!("members/{member_id}"),
            &[("fields", "id,username")],
        )
        .await
    }

    async fn move_card_to_list(&self, card_id: &str, list_id: &str) -> Result<(), BoardError> {
        self.send(Method::PUT, &format!("cards/{card_id}"), &[("idList", list_id)])
            .await
            .map(drop)
    }

    async fn move_card_to_board(&self, card_id: &str, board_id: &str) -> Result<(), BoardError> {
        self.send(
            Method::PUT,
            &format!("cards/{card_id}"),
            &[("idBoard", board_id)],
        )
        .await
        .map(drop)
    }

    async fn set_card_due(&self, card_id: &str, due: Option<&str>) -> Result<(), BoardError> {
        // Trello clears the due date when given the literal "null".
        let value = due.unwrap_or("null");
        self.send(Method::PUT, &format!("cards/{card_id}"), &[("due", value)])
            .await
            .map(drop)
    }

    async fn set_card_closed(&self, card_id: &str, closed: bool) -> Result<(), BoardError> {
        let value = if closed { "true" } else { "false" };
        self.send(Method::PUT, &format!("cards/{card_id}"), &[("closed", value)])
            .await
            .map(drop)
    }

    async fn add_comment(&self, card_id: &str, text: &str) -> Result<(), BoardError> {
        self.send(
            Method::POST,
            &format!("cards/{card_id}/actions/comments"),
            &[("text", text)],
        )
        .await
        .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use secrecy::SecretString;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn config(base_delay_ms: u64) -> TrelloConfig {
        TrelloConfig {
            member_id: "me".into(),
            api_key: SecretString::from("key"),
            token: SecretString::from("token"),
            api_base: "https://api.trello.com/1".into(),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    fn reply(status: &str, headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n{headers}\r\n{body}",
            body.len()
        )
    }

    /// Headers promise more body than is sent before the socket closes.
    fn truncated_ok() -> String {
        "HTTP/1.1 200 OK\r\nContent-Length: 64\r\nConnection: close\r\n\r\n{\"id\":".to_string()
    }

    /// Local HTTP stub answering one request per connection from `script`,
    /// repeating the last reply once the script runs out. Returns the base
    /// URL and the request lines received so far.
    async fn stub(script: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            let mut served = 0;
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let request_line = String::from_utf8_lossy(&head)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                log.lock().unwrap().push(request_line);
                let response = &script[served.min(script.len() - 1)];
                served += 1;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{addr}"), seen)
    }

    fn client_for(api_base: String) -> TrelloClient {
        TrelloClient {
            config: TrelloConfig {
                api_base,
                ..config(0)
            },
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
        }
    }

    fn requests(seen: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        seen.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn server_error_is_retried_until_success() {
        let (base, seen) = stub(vec![
            reply("503 Service Unavailable", "", "busy"),
            reply("200 OK", "", "[]"),
        ])
        .await;
        let lists = client_for(base).open_lists("b1").await.unwrap();
        assert!(lists.is_empty());
        assert_eq!(requests(&seen).len(), 2);
    }

    #[tokio::test]
    async fn client_error_fails_without_retry() {
        let (base, seen) = stub(vec![reply("401 Unauthorized", "", "invalid key")]).await;
        let err = client_for(base).boards_for_member("me").await.unwrap_err();
        assert!(matches!(err, BoardError::Status { status: 401, ref body, .. } if body == "invalid key"));
        assert_eq!(requests(&seen).len(), 1);
    }

    #[tokio::test]
    async fn retries_stop_after_budget() {
        let (base, seen) = stub(vec![reply("502 Bad Gateway", "", "")]).await;
        let err = client_for(base).member("m1").await.unwrap_err();
        assert!(matches!(err, BoardError::Status { status: 502, .. }));
        // First attempt plus max_retries.
        assert_eq!(requests(&seen).len(), 4);
    }

    #[tokio::test]
    async fn rate_limit_is_retried_after_delay() {
        let (base, seen) = stub(vec![
            reply("429 Too Many Requests", "Retry-After: 0\r\n", ""),
            reply("200 OK", "", r#"{"id":"m1","username":"alice"}"#),
        ])
        .await;
        let member = client_for(base).member("m1").await.unwrap();
        assert_eq!(member.username, "alice");
        assert_eq!(requests(&seen).len(), 2);
    }

    #[tokio::test]
    async fn clearing_due_sends_null() {
        let (base, seen) = stub(vec![reply("200 OK", "", "{}")]).await;
        client_for(base).set_card_due("c1", None).await.unwrap();
        let sent = requests(&seen);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("PUT /cards/c1?"), "{}", sent[0]);
        assert!(sent[0].contains("due=null"), "{}", sent[0]);
    }

    #[tokio::test]
    async fn create_list_is_not_resent_after_lost_response() {
        let (base, seen) = stub(vec![
            truncated_ok(),
            reply("200 OK", "", r#"{"id":"l2","name":"Live Q2 2024"}"#),
        ])
        .await;
        let err = client_for(base)
            .create_list("arch", "Live Q2 2024", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::RequestFailed { .. }));
        assert_eq!(requests(&seen).len(), 1);
    }

    #[tokio::test]
    async fn comment_is_not_resent_after_server_error() {
        let (base, seen) = stub(vec![
            reply("503 Service Unavailable", "", ""),
            reply("200 OK", "", "{}"),
        ])
        .await;
        let err = client_for(base).add_comment("c1", "hello").await.unwrap_err();
        assert!(matches!(err, BoardError::Status { status: 503, .. }));
        assert_eq!(requests(&seen).len(), 1);
    }

    #[tokio::test]
    async fn rate_limited_comment_is_resent() {
        let (base, seen) = stub(vec![
            reply("429 Too Many Requests", "Retry-After: 0\r\n", ""),
            reply("200 OK", "", "{}"),
        ])
        .await;
        client_for(base).add_comment("c1", "hello").await.unwrap();
        let sent = requests(&seen);
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|l| l.starts_with("POST /cards/c1/actions/comments?")));
    }

    #[test]
    fn only_rate_limits_make_posts_retryable() {
        let limited = BoardError::RateLimited {
            endpoint: "lists".into(),
            retry_after: None,
        };
        let dropped = BoardError::RequestFailed {
            endpoint: "lists".into(),
            reason: "connection reset".into(),
        };
        assert!(retryable(&Method::POST, &limited));
        assert!(!retryable(&Method::POST, &dropped));
        assert!(retryable(&Method::PUT, &dropped));
        assert!(retryable(&Method::GET, &dropped));
    }

    #[test]
    fn api_url_joins_paths() {
        let client = TrelloClient::new(config(0));
        assert_eq!(
            client.api_url("/boards/b1/lists"),
            "https://api.trello.com/1/boards/b1/lists"
        );
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let client = TrelloClient::new(config(1000));
        let err = BoardError::Status {
            endpoint: "cards".into(),
            status: 502,
            body: String::new(),
        };
        let first = client.backoff(0, &err);
        let third = client.backoff(2, &err);
        assert!(first >= Duration::from_millis(1000) && first <= Duration::from_millis(1500));
        assert!(third >= Duration::from_millis(4000) && third <= Duration::from_millis(4500));
        assert_eq!(client.backoff(10, &err), MAX_BACKOFF);
    }

    #[test]
    fn backoff_honours_retry_after() {
        let client = TrelloClient::new(config(1000));
        let err = BoardError::RateLimited {
            endpoint: "cards".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(client.backoff(0, &err), Duration::from_secs(7));
    }

    #[test]
    fn decode_reports_endpoint_on_bad_json() {
        let err = decode::<Vec<Board>>("members/me/boards", "not json").unwrap_err();
        assert!(
            matches!(err, BoardError::InvalidResponse { ref endpoint, .. } if endpoint == "members/me/boards")
        );
    }

    #[test]
    fn decode_reads_list() {
        let lists: Vec<BoardList> =
            decode("boards/b/lists", r#"[{"id":"l1","name":"Icebox","closed":false}]"#).unwrap();
        assert_eq!(lists[0].name, "Icebox");
    }
}
