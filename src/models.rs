use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One cataloged image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    pub id: String,
    pub name: String,
    pub category: String,
    pub tags: Vec<String>,
    pub path: String,
    pub size: i64,
    pub mime_type: String,
    pub image_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Image {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let tags_json: String = row.get("tags")?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        Ok(Image {
            id: row.get("id")?,
            name: row.get("name")?,
            category: row.get("category")?,
            tags,
            path: row.get("path")?,
            size: row.get("size")?,
            mime_type: row.get("mime_type")?,
            image_hash: row.get("image_hash")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// A user-supplied tag/category category bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub emoji_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Category {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            emoji_count: row.get("emoji_count")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// The structured response a vision model returns for one enrichment request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EnrichmentResult {
    pub name: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub description: Option<String>,
    #[serde(rename = "newCategory")]
    pub new_category: Option<String>,
}

/// Task lifecycle state, stored as TEXT in `ai_tasks.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "PROCESSING" => Ok(TaskStatus::Processing),
            "SUCCEEDED" => Ok(TaskStatus::Succeeded),
            "FAILED" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// One row of the durable work queue.
#[derive(Debug, Clone)]
pub struct AiTask {
    pub id: i64,
    pub emoji_id: String,
    pub image_path: String,
    pub image_hash: String,
    pub status: TaskStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub next_retry_at: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AiTask {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status_text: String = row.get("status")?;
        let status = TaskStatus::from_str(&status_text).unwrap_or(TaskStatus::Pending);
        Ok(AiTask {
            id: row.get("id")?,
            emoji_id: row.get("emoji_id")?,
            image_path: row.get("image_path")?,
            image_hash: row.get("image_hash")?,
            status,
            attempts: row.get("attempts")?,
            last_error: row.get("last_error")?,
            next_retry_at: row.get("next_retry_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TaskStats {
    pub pending: i64,
    pub processing: i64,
    pub succeeded: i64,
    pub failed: i64,
}

/// Result of a non-recursive folder ingest.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub ok: Vec<Image>,
    pub failed: Vec<(String, String)>,
}

/// A random 128-bit hex identifier, used for image ids.
pub fn generate_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}
