//! Breed validation gate.
//!
//! # Responsibility
//! - Ask the external breed directory whether a breed name is recognized.
//! - Race that lookup against a deadline without ever waiting past it.
//!
//! # Invariants
//! - The lookup runs on its own task; on deadline or caller drop the task is
//!   aborted and its eventual result is discarded.
//! - Lookup failures are reported separately from "unknown breed".
//! - Breed names compare case-insensitively after trimming.

use super::timeout::Deadline;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const DEFAULT_BREED_API_URL: &str = "https://api.thecatapi.com";

/// Source of recognized breed names. Treated as slow and untrusted.
#[async_trait]
pub trait BreedDirectory: Send + Sync {
    async fn breed_names(&self) -> Result<Vec<String>, BreedDirectoryError>;
}

/// Directory lookup failure.
#[derive(Debug)]
pub enum BreedDirectoryError {
    Transport(reqwest::Error),
    Status(u16),
    Other(String),
}

impl Display for BreedDirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "breed directory request failed: {err}"),
            Self::Status(code) => write!(f, "breed directory answered with status {code}"),
            Self::Other(message) => write!(f, "breed directory failure: {message}"),
        }
    }
}

impl Error for BreedDirectoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BreedDirectoryError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value)
    }
}

#[derive(Debug, Deserialize)]
struct BreedEntry {
    name: String,
}

/// Breed directory served over HTTP as `GET {base}/v1/breeds`.
pub struct HttpBreedDirectory {
    client: reqwest::Client,
    breeds_url: String,
}

impl HttpBreedDirectory {
    pub fn new(base_url: &str) -> Result<Self, BreedDirectoryError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            breeds_url: format!("{}/v1/breeds", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl BreedDirectory for HttpBreedDirectory {
    async fn breed_names(&self) -> Result<Vec<String>, BreedDirectoryError> {
        let response = self.client.get(&self.breeds_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BreedDirectoryError::Status(status.as_u16()));
        }
        let entries: Vec<BreedEntry> = response.json().await?;
        Ok(entries.into_iter().map(|entry| entry.name).collect())
    }
}

/// Outcome of a gate call that did not produce a membership answer.
#[derive(Debug)]
pub enum BreedGateError {
    Lookup(BreedDirectoryError),
    /// The lookup task panicked or was aborted by the runtime.
    Task(String),
    TimedOut,
}

impl Display for BreedGateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lookup(err) => write!(f, "{err}"),
            Self::Task(message) => write!(f, "breed lookup task failed: {message}"),
            Self::TimedOut => write!(f, "breed lookup timed out"),
        }
    }
}

impl Error for BreedGateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Lookup(err) => Some(err),
            _ => None,
        }
    }
}

/// Aborts the wrapped task when dropped, so an abandoned caller never
/// leaves the lookup running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Returns whether `name` is a recognized breed, deciding before `deadline`.
pub async fn validate_breed(
    directory: &Arc<dyn BreedDirectory>,
    name: &str,
    deadline: Deadline,
) -> Result<bool, BreedGateError> {
    let directory = Arc::clone(directory);
    let candidate = name.trim().to_string();
    let mut task = AbortOnDrop(tokio::spawn(async move {
        let names = directory.breed_names().await?;
        Ok::<bool, BreedDirectoryError>(
            names
                .iter()
                .any(|known| known.trim().eq_ignore_ascii_case(&candidate)),
        )
    }));

    let outcome = tokio::time::timeout_at(
        tokio::time::Instant::from_std(deadline.instant()),
        &mut task.0,
    )
    .await;

    match outcome {
        Ok(Ok(found)) => found.map_err(BreedGateError::Lookup),
        Ok(Err(join_err)) => Err(BreedGateError::Task(join_err.to_string())),
        Err(_) => {
            debug!("event=breed_lookup module=breed_gate status=timeout");
            Err(BreedGateError::TimedOut)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_breed, BreedDirectory, BreedDirectoryError, BreedGateError};
    use crate::service::timeout::Deadline;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct Listed(Vec<&'static str>);

    #[async_trait]
    impl BreedDirectory for Listed {
        async fn breed_names(&self) -> Result<Vec<String>, BreedDirectoryError> {
            Ok(self.0.iter().map(|name| name.to_string()).collect())
        }
    }

    struct Broken;

    #[async_trait]
    impl BreedDirectory for Broken {
        async fn breed_names(&self) -> Result<Vec<String>, BreedDirectoryError> {
            Err(BreedDirectoryError::Status(503))
        }
    }

    /// Never answers; records whether it was dropped mid-flight.
    struct Hung {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BreedDirectory for Hung {
        async fn breed_names(&self) -> Result<Vec<String>, BreedDirectoryError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn known_breed_matches_case_insensitively() {
        let directory: Arc<dyn BreedDirectory> = Arc::new(Listed(vec!["Abyssinian", "Bengal"]));
        let deadline = Deadline::after(Duration::from_secs(1));
        assert!(validate_breed(&directory, " bengal ", deadline).await.unwrap());
        assert!(!validate_breed(&directory, "Dragon", deadline).await.unwrap());
    }

    #[tokio::test]
    async fn lookup_failure_is_not_a_validation_answer() {
        let directory: Arc<dyn BreedDirectory> = Arc::new(Broken);
        let err = validate_breed(&directory, "Bengal", Deadline::after(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, BreedGateError::Lookup(BreedDirectoryError::Status(503))));
    }

    #[tokio::test]
    async fn hung_lookup_is_abandoned_at_deadline() {
        let finished = Arc::new(AtomicBool::new(false));
        let directory: Arc<dyn BreedDirectory> = Arc::new(Hung {
            finished: Arc::clone(&finished),
        });

        let started = Instant::now();
        let err = validate_breed(&directory, "Bengal", Deadline::after(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, BreedGateError::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!finished.load(Ordering::SeqCst));
        // Only the test keeps the directory alive once the task is aborted.
        assert_eq!(Arc::strong_count(&directory), 1);
    }
}
