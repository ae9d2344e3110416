//! Task persistence stage: the sink contract and the Microsoft Graph backend.

use crate::defaults;
use crate::error::{Result, VoxtaskError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Mutex;

/// A destination task list, as reported by the task store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskList {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Destination task store boundary.
#[async_trait]
pub trait TaskSink: Send + Sync {
    /// Create a task in the given list; returns the store's task id.
    async fn create_task(&self, list_id: &str, title: &str, notes: Option<&str>)
    -> Result<String>;
}

/// Supplies OAuth bearer tokens for the Graph backend.
///
/// Token acquisition and refresh live outside this crate.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Task sink backed by Microsoft To Do via the Graph API.
pub struct GraphTaskSink {
    token_provider: Box<dyn TokenProvider>,
    base_url: String,
    client: reqwest::Client,
}

impl GraphTaskSink {
    pub fn new(token_provider: Box<dyn TokenProvider>) -> Self {
        Self {
            token_provider,
            base_url: defaults::GRAPH_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the API base (tests, sovereign clouds).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// JSON body for task creation. Empty notes are omitted entirely.
    pub fn build_create_task_body(title: &str, notes: Option<&str>) -> serde_json::Value {
        let mut body = serde_json::json!({ "title": title });
        if let Some(notes) = notes.filter(|n| !n.is_empty()) {
            body["body"] = serde_json::json!({
                "content": notes,
                "contentType": "text",
            });
        }
        body
    }

    /// Parse the `value` array of a lists response.
    pub fn parse_task_lists(body: &str) -> Result<Vec<TaskList>> {
        #[derive(Deserialize)]
        struct ListsResponse {
            value: Vec<TaskList>,
        }
        let response: ListsResponse =
            serde_json::from_str(body).map_err(|e| VoxtaskError::TaskSink {
                message: format!("Could not parse lists response: {}", e),
            })?;
        Ok(response.value)
    }

    /// Fetch the user's task lists, for destination selection.
    pub async fn fetch_task_lists(&self) -> Result<Vec<TaskList>> {
        let token = self.token_provider.access_token().await?;
        let response = self
            .client
            .get(format!("{}/me/todo/lists", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoxtaskError::HttpStatus {
                service: "graph",
                status: status.as_u16(),
            });
        }

        Self::parse_task_lists(&response.text().await?)
    }
}

#[async_trait]
impl TaskSink for GraphTaskSink {
    async fn create_task(
        &self,
        list_id: &str,
        title: &str,
        notes: Option<&str>,
    ) -> Result<String> {
        let token = self.token_provider.access_token().await?;
        let response = self
            .client
            .post(format!("{}/me/todo/lists/{}/tasks", self.base_url, list_id))
            .bearer_auth(token)
            .json(&Self::build_create_task_body(title, notes))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoxtaskError::HttpStatus {
                service: "graph",
                status: status.as_u16(),
            });
        }

        #[derive(Deserialize)]
        struct TaskResponse {
            id: String,
        }
        let created: TaskResponse =
            response
                .json()
                .await
                .map_err(|e| VoxtaskError::TaskSink {
                    message: format!("Could not parse create response: {}", e),
                })?;
        Ok(created.id)
    }
}

/// Recorded `create_task` call, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTask {
    pub list_id: String,
    pub title: String,
    pub notes: Option<String>,
}

/// Mock task sink recording every call; can be scripted to fail.
#[derive(Default)]
pub struct MockTaskSink {
    tasks: Mutex<Vec<RecordedTask>>,
    fail: bool,
}

impl MockTaskSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn recorded(&self) -> Vec<RecordedTask> {
        match self.tasks.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl TaskSink for MockTaskSink {
    async fn create_task(
        &self,
        list_id: &str,
        title: &str,
        notes: Option<&str>,
    ) -> Result<String> {
        if self.fail {
            return Err(VoxtaskError::TaskSink {
                message: "mock sink failure".to_string(),
            });
        }
        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.push(RecordedTask {
            list_id: list_id.to_string(),
            title: title.to_string(),
            notes: notes.map(str::to_string),
        });
        Ok(format!("task-{}", tasks.len()))
    }
}
