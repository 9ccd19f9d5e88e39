//! File-backed collaborators: a ticket source and a result store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{AnalysisRepository, AnalysisResult, PulseError, RequestId, Ticket, TicketSource};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

fn collaborator_error(collaborator: &str, message: impl std::fmt::Display) -> PulseError {
    PulseError::CollaboratorFailed {
        collaborator: collaborator.to_string(),
        message: message.to_string(),
    }
}

/// Reads tickets from a JSON array or a JSON Lines file.
///
/// Each ticket is `{"id": "...", "subject": "...", "body": "..."}`; `subject`
/// and `body` may be omitted.
#[derive(Debug, Clone)]
pub struct FileTicketSource {
    path: PathBuf,
}

impl FileTicketSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TicketSource for FileTicketSource {
    async fn fetch_tickets(&self) -> Result<Vec<Ticket>, PulseError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| collaborator_error("ticket source", format!("{}: {e}", self.path.display())))?;
        parse_tickets(&content).map_err(|e| collaborator_error("ticket source", format!("{}: {e}", self.path.display())))
    }
}

fn parse_tickets(content: &str) -> Result<Vec<Ticket>, String> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content).map_err(|e| e.to_string());
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| serde_json::from_str(line).map_err(|e| format!("line {}: {e}", n + 1)))
        .collect()
}

/// Append-only JSON Lines store of analysis results.
///
/// The file is read once on open; later lines for the same id win. Each
/// `save` appends one line.
pub struct JsonlResultStore {
    path: PathBuf,
    index: Mutex<HashMap<RequestId, AnalysisResult>>,
}

impl JsonlResultStore {
    /// Opens `path`, creating nothing until the first save.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PulseError> {
        let path = path.as_ref().to_path_buf();
        let mut index = HashMap::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                for (n, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<AnalysisResult>(line) {
                        Ok(result) => {
                            index.insert(result.request_id.clone(), result);
                        }
                        Err(err) => {
                            tracing::warn!(path = %path.display(), line = n + 1, error = %err, "Skipping unreadable stored result");
                        }
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(collaborator_error("result store", format!("{}: {err}", path.display()))),
        }

        tracing::debug!(path = %path.display(), stored = index.len(), "Result store opened");
        Ok(Self {
            path,
            index: Mutex::new(index),
        })
    }

    pub async fn len(&self) -> usize {
        self.index.lock().await.len()
    }
}

#[async_trait]
impl AnalysisRepository for JsonlResultStore {
    async fn find(&self, id: &RequestId) -> Result<Option<AnalysisResult>, PulseError> {
        Ok(self.index.lock().await.get(id).cloned())
    }

    async fn save(&self, result: &AnalysisResult) -> Result<(), PulseError> {
        let mut line = serde_json::to_string(result).map_err(|e| collaborator_error("result store", e))?;
        line.push('\n');

        // Held across the write so appends from concurrent savers never interleave.
        let mut index = self.index.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| collaborator_error("result store", format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| collaborator_error("result store", e))?;
        file.flush().await.map_err(|e| collaborator_error("result store", e))?;

        index.insert(result.request_id.clone(), result.clone());
        Ok(())
    }
}
