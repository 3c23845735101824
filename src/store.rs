//! Message history persisted as a pretty-printed JSON array.
//!
//! The same file is served at `/messages.json` for the client's bulk load.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::ChatError;
use crate::message::Message;

pub struct MessageStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MessageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full history. A missing or unparsable file reads as empty.
    pub async fn load(&self) -> Vec<Message> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Append one message, rewriting the file.
    pub async fn append(&self, message: &Message) -> Result<(), ChatError> {
        let _guard = self.write_lock.lock().await;
        let mut messages = self.load().await;
        messages.push(message.clone());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(&messages)?;
        tokio::fs::write(&self.path, body).await?;
        Ok(())
    }
}
