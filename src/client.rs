//! HTTP client for the task API, used by the command-line subcommands.

use anyhow::{bail, Context, Result};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::model::{Category, FocusUpdate, NewTask, PositionUpdate, Task, TaskReplace};

pub const DEFAULT_SERVER: &str = "http://localhost:3742";

#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base: String,
}

impl Client {
    pub fn new(base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Push endpoint for this server: `http` becomes `ws`, `https` becomes `wss`.
    pub fn ws_url(&self) -> Result<String> {
        let ws = if let Some(rest) = self.base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            bail!("server URL must start with http:// or https://: {}", self.base);
        };
        Ok(format!("{ws}/ws"))
    }

    pub async fn list(&self, category: Option<Category>) -> Result<Vec<Task>> {
        let mut req = self.http.get(self.url("/api/tasks"));
        if let Some(c) = category {
            req = req.query(&[("category", c.as_str())]);
        }
        decode(req.send().await.context("failed to reach server")?, "list tasks").await
    }

    /// The server has no single-task read; look the id up in the full list.
    pub async fn get(&self, id: i64) -> Result<Task> {
        self.list(None)
            .await?
            .into_iter()
            .find(|t| t.id == id)
            .with_context(|| format!("task {id} not found"))
    }

    pub async fn create(&self, new: &NewTask) -> Result<Task> {
        let res = self
            .http
            .post(self.url("/api/tasks"))
            .json(new)
            .send()
            .await
            .context("failed to reach server")?;
        decode(res, "create task").await
    }

    pub async fn replace(&self, id: i64, body: &TaskReplace) -> Result<Task> {
        let res = self
            .http
            .put(self.url(&format!("/api/tasks/{id}")))
            .json(body)
            .send()
            .await
            .context("failed to reach server")?;
        decode(res, &format!("update task {id}")).await
    }

    pub async fn set_position(&self, id: i64, update: PositionUpdate) -> Result<Task> {
        let res = self
            .http
            .put(self.url(&format!("/api/tasks/{id}/position")))
            .json(&update)
            .send()
            .await
            .context("failed to reach server")?;
        decode(res, &format!("move task {id}")).await
    }

    pub async fn set_focus(&self, id: i64, focused: bool) -> Result<Task> {
        let res = self
            .http
            .put(self.url(&format!("/api/tasks/{id}/focus")))
            .json(&FocusUpdate { focused })
            .send()
            .await
            .context("failed to reach server")?;
        decode(res, &format!("focus task {id}")).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let res = self
            .http
            .delete(self.url(&format!("/api/tasks/{id}")))
            .send()
            .await
            .context("failed to reach server")?;
        check(res, &format!("delete task {id}")).await?;
        Ok(())
    }
}

async fn check(res: Response, what: &str) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or(body);
    if status == StatusCode::NOT_FOUND {
        bail!("{what}: {message}");
    }
    bail!("{what} failed ({status}): {message}");
}

async fn decode<T: DeserializeOwned>(res: Response, what: &str) -> Result<T> {
    let res = check(res, what).await?;
    res.json()
        .await
        .with_context(|| format!("{what}: invalid response body"))
}
