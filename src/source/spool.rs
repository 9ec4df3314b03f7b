//! Spool-directory message source.
//!
//! Reads message JSON files from `<dir>/<user_id>/*.json` — each file
//! holds one `EmailMessage` or an array of them. Consumed files move to
//! a `processed/` subdirectory so a message is fetched once.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::source::MessageSource;
use crate::triage::types::EmailMessage;

/// File-based source for development and tests.
pub struct SpoolSource {
    dir: PathBuf,
}

impl SpoolSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl MessageSource for SpoolSource {
    fn name(&self) -> &str {
        "spool"
    }

    async fn fetch_messages(
        &self,
        user_id: &str,
        max_results: usize,
    ) -> Result<Vec<EmailMessage>, SourceError> {
        let user_dir = self.dir.join(user_id);
        if !user_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&user_dir)
            .map_err(|e| SourceError::Transient(format!("spool read_dir: {e}")))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let processed_dir = user_dir.join("processed");
        let mut messages = Vec::new();

        for path in paths {
            if messages.len() >= max_results {
                break;
            }
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable spool file");
                    continue;
                }
            };

            // One message or a batch per file.
            let mut parsed: Vec<EmailMessage> = match serde_json::from_str::<EmailMessage>(&raw) {
                Ok(one) => vec![one],
                Err(_) => match serde_json::from_str::<Vec<EmailMessage>>(&raw) {
                    Ok(many) => many,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping malformed spool file");
                        continue;
                    }
                },
            };
            parsed.truncate(max_results - messages.len());
            messages.append(&mut parsed);

            // Move the file out of the way; failing that, leave it and
            // let idempotent downstream merging absorb the repeat.
            if let Err(e) = std::fs::create_dir_all(&processed_dir) {
                warn!(error = %e, "Could not create processed dir");
            } else if let Some(name) = path.file_name()
                && let Err(e) = std::fs::rename(&path, processed_dir.join(name))
            {
                warn!(path = %path.display(), error = %e, "Could not archive spool file");
            }
        }

        debug!(user_id = %user_id, count = messages.len(), "Fetched spool messages");
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn write_message(dir: &std::path::Path, name: &str, id: &str) {
        let message = EmailMessage {
            id: id.into(),
            thread_id: None,
            subject: "Test subject".into(),
            from: "a@b.com".into(),
            to: None,
            date: Utc::now(),
            snippet: String::new(),
            body: "hello".into(),
            labels: vec![],
            is_read: false,
        };
        std::fs::write(dir.join(name), serde_json::to_string(&message).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn fetches_and_archives_messages() {
        let tmp = tempfile::tempdir().unwrap();
        let user_dir = tmp.path().join("u1");
        std::fs::create_dir_all(&user_dir).unwrap();
        write_message(&user_dir, "001.json", "m1");
        write_message(&user_dir, "002.json", "m2");

        let source = SpoolSource::new(tmp.path());
        let messages = source.fetch_messages("u1", 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m1");

        // Second fetch finds nothing — files were archived.
        let again = source.fetch_messages("u1", 10).await.unwrap();
        assert!(again.is_empty());
        assert!(user_dir.join("processed/001.json").exists());
    }

    #[tokio::test]
    async fn respects_max_results() {
        let tmp = tempfile::tempdir().unwrap();
        let user_dir = tmp.path().join("u1");
        std::fs::create_dir_all(&user_dir).unwrap();
        for i in 0..5 {
            write_message(&user_dir, &format!("{i:03}.json"), &format!("m{i}"));
        }

        let source = SpoolSource::new(tmp.path());
        let messages = source.fetch_messages("u1", 3).await.unwrap();
        assert_eq!(messages.len(), 3);
    }

    #[tokio::test]
    async fn missing_user_dir_is_empty_not_error() {
        let tmp = tempfile::tempdir().unwrap();
        let source = SpoolSource::new(tmp.path());
        let messages = source.fetch_messages("nobody", 10).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn malformed_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let user_dir = tmp.path().join("u1");
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::write(user_dir.join("000.json"), "{not json").unwrap();
        write_message(&user_dir, "001.json", "m1");

        let source = SpoolSource::new(tmp.path());
        let messages = source.fetch_messages("u1", 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "m1");
    }
}
