use std::sync::Arc;

use backon::Retryable;
use db::models::{board::Board, column::Column, project::Project, task::Task, user::User};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    config::{ClientConfig, RetryPolicy},
    error::{ClientError, status_message},
    requests::{
        BoardWithColumns, Credentials, LoginResponse, NewBoard, NewColumn, NewProject, NewTask,
        Registration, TaskMove, TaskQuery,
    },
};

pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Deserialize)]
struct CsrfToken {
    token: String,
}

/// Request payload, serialized once and replayed on every attempt.
struct Payload<'a> {
    body: Option<Value>,
    query: &'a [(String, String)],
}

/// Cookie-carrying client for `/api`.
///
/// Cheap to clone; clones share the cookie jar and the cached CSRF token.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
    csrf: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .cookie_store(true)
            .user_agent(concat!("encore-tasks-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
            csrf: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(Method::GET, path, None::<&()>, &[]).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.request(Method::POST, path, Some(body), &[]).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.request(Method::PUT, path, Some(body), &[]).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(Method::DELETE, path, None::<&()>, &[]).await
    }

    /// Sends a request to `/api{path}` and unwraps the response envelope.
    ///
    /// Mutating methods carry the CSRF header; a rejected token is refreshed
    /// and the request replayed once.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: &[(String, String)],
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let payload = Payload { body, query };

        if method.is_safe() {
            return self.send_with_retry(&method, path, &payload, None).await;
        }

        let token = self.csrf_token().await?;
        match self
            .send_with_retry(&method, path, &payload, Some(&token))
            .await
        {
            Err(e) if e.is_csrf_rejection() => {
                debug!(path, "CSRF token rejected, refreshing");
                let token = self.refresh_csrf_token().await?;
                self.send_with_retry(&method, path, &payload, Some(&token))
                    .await
            }
            other => other,
        }
    }

    async fn csrf_token(&self) -> Result<String, ClientError> {
        if let Some(token) = self.csrf.read().await.clone() {
            return Ok(token);
        }
        self.refresh_csrf_token().await
    }

    /// `GET /api/csrf` sets the cookie half of the pair in the jar.
    async fn refresh_csrf_token(&self) -> Result<String, ClientError> {
        let payload = Payload {
            body: None,
            query: &[],
        };
        let CsrfToken { token } = self
            .send_with_retry(&Method::GET, "/csrf", &payload, None)
            .await?;
        *self.csrf.write().await = Some(token.clone());
        Ok(token)
    }

    async fn send_with_retry<T: DeserializeOwned>(
        &self,
        method: &Method,
        path: &str,
        payload: &Payload<'_>,
        csrf: Option<&str>,
    ) -> Result<T, ClientError> {
        (move || self.send_once(method, path, payload, csrf))
            .retry(self.retry.backoff())
            .when(ClientError::is_retryable)
            .notify(|err: &ClientError, delay| {
                warn!(%method, path, error = %err, ?delay, "retrying request");
            })
            .await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: &Method,
        path: &str,
        payload: &Payload<'_>,
        csrf: Option<&str>,
    ) -> Result<T, ClientError> {
        let url = format!("{}/api{}", self.base_url, path);
        debug!(%method, url = %url, "sending request");

        let mut builder = self.http.request(method.clone(), &url);
        if !payload.query.is_empty() {
            builder = builder.query(payload.query);
        }
        if let Some(body) = &payload.body {
            builder = builder.json(body);
        }
        if let Some(token) = csrf {
            builder = builder.header(CSRF_HEADER, token);
        }

        let response = builder.send().await?;
        handle_response(response).await
    }

    // Typed helpers.

    pub async fn register(&self, registration: &Registration) -> Result<User, ClientError> {
        self.post("/auth/register", registration).await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ClientError> {
        self.post("/auth/login", credentials).await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.request(Method::POST, "/auth/logout", None::<&()>, &[])
            .await
    }

    pub async fn me(&self) -> Result<User, ClientError> {
        self.get("/auth/me").await
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        self.get("/projects").await
    }

    pub async fn create_project(&self, project: &NewProject) -> Result<Project, ClientError> {
        self.post("/projects", project).await
    }

    pub async fn list_boards(&self, project_id: Uuid) -> Result<Vec<Board>, ClientError> {
        self.get(&format!("/projects/{project_id}/boards")).await
    }

    pub async fn create_board(&self, board: &NewBoard) -> Result<BoardWithColumns, ClientError> {
        self.post("/boards", board).await
    }

    pub async fn list_columns(&self, board_id: Uuid) -> Result<Vec<Column>, ClientError> {
        self.get(&format!("/boards/{board_id}/columns")).await
    }

    pub async fn create_column(&self, column: &NewColumn) -> Result<Column, ClientError> {
        self.post("/columns", column).await
    }

    pub async fn list_tasks(&self, filter: &TaskQuery) -> Result<Vec<Task>, ClientError> {
        let query = query_pairs(filter)?;
        self.request(Method::GET, "/tasks", None::<&()>, &query)
            .await
    }

    pub async fn create_task(&self, task: &NewTask) -> Result<Task, ClientError> {
        self.post("/tasks", task).await
    }

    pub async fn move_task(&self, task_id: Uuid, target: &TaskMove) -> Result<Task, ClientError> {
        self.post(&format!("/tasks/{task_id}/move"), target).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
        let envelope: ApiResponse<T> =
            serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))?;
        return match envelope.into_data() {
            Some(data) => Ok(data),
            // `()` payloads arrive as `"data": null`.
            None => serde_json::from_value(Value::Null)
                .map_err(|_| ClientError::Decode("response has no data".to_string())),
        };
    }

    let envelope = serde_json::from_slice::<ApiResponse<Value>>(&bytes).ok();
    let code = envelope
        .as_ref()
        .and_then(|e| e.code.clone())
        .unwrap_or_else(|| format!("HTTP_{}", status.as_u16()));
    let message = envelope
        .and_then(|e| e.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| status_message(status.as_u16()));

    warn!(status = status.as_u16(), code = %code, "API request failed");
    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

fn query_pairs<Q: Serialize>(query: &Q) -> Result<Vec<(String, String)>, ClientError> {
    let value = serde_json::to_value(query).map_err(|e| ClientError::Decode(e.to_string()))?;
    let Value::Object(map) = value else {
        return Ok(Vec::new());
    };
    Ok(map
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pairs_skip_unset_filters() {
        let board_id = Uuid::new_v4();
        let pairs = query_pairs(&TaskQuery {
            board_id: Some(board_id),
            search: Some("отчёт".to_string()),
            ..TaskQuery::default()
        })
        .unwrap();
        assert_eq!(
            pairs,
            vec![
                ("board_id".to_string(), board_id.to_string()),
                ("search".to_string(), "отчёт".to_string()),
            ]
        );
        assert!(query_pairs(&TaskQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = ApiClient::new(ClientConfig::new("http://localhost:3000/")).unwrap();
        assert_eq!(client.base_url, "http://localhost:3000");
    }
}
