use std::any::Any;
use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tempfile::NamedTempFile;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{FetchFailure, FetchOutcome, FetchRequest, ProteomeId};
use crate::error::ProteomeError;
use crate::uniprot::{ProteomeSource, SourceError, failure_outcome, fetch_proteome};

pub const DEFAULT_CONCURRENCY: usize = 16;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum fetches in flight. `0` launches every fetch at once.
    pub concurrency: usize,
    /// Where the artifact is created. Defaults to the system temp dir.
    pub artifact_dir: Option<PathBuf>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            artifact_dir: None,
        }
    }
}

/// A finished batch. The artifact file belongs to the caller.
#[derive(Debug)]
pub struct BatchResult {
    pub artifact_path: PathBuf,
    /// Identifiers written to the artifact, in file order.
    pub entries: Vec<ProteomeId>,
    /// Failed records, in completion order.
    pub failures: Vec<FetchFailure>,
}

impl BatchResult {
    pub fn failure_reasons(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.reason.as_str()).collect()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Fetches every request concurrently, waits for all of them, then writes the
/// successes into one fresh FASTA file. Individual fetch failures are
/// collected, never raised; only artifact I/O fails the batch.
pub async fn assemble_batch<S>(
    source: Arc<S>,
    requests: Vec<FetchRequest>,
    options: &BatchOptions,
    sink: &dyn ProgressSink,
) -> Result<BatchResult, ProteomeError>
where
    S: ProteomeSource + 'static,
{
    let artifact = create_artifact(options)?;
    let total = requests.len();
    let start = Instant::now();
    info!(
        records = total,
        concurrency = options.concurrency,
        artifact = %artifact.path().display(),
        "assembling proteome batch"
    );

    let limiter = (options.concurrency > 0).then(|| Arc::new(Semaphore::new(options.concurrency)));
    let mut tasks = JoinSet::new();
    let mut pending = HashMap::with_capacity(total);
    for request in requests {
        let source = Arc::clone(&source);
        let limiter = limiter.clone();
        let task_request = request.clone();
        let handle = tasks.spawn(async move {
            let _permit = match limiter {
                Some(limiter) => limiter.acquire_owned().await.ok(),
                None => None,
            };
            fetch_proteome(source.as_ref(), &task_request).await
        });
        pending.insert(handle.id(), request);
    }

    let mut outcomes = Vec::with_capacity(total);
    while let Some(joined) = tasks.join_next_with_id().await {
        let outcome = match joined {
            Ok((id, outcome)) => {
                pending.remove(&id);
                outcome
            }
            Err(err) => {
                let request = pending.remove(&err.id());
                debug_assert!(request.is_some(), "join error for an unregistered task");
                // Left in `pending`; settled after the join.
                let Some(request) = request else { continue };
                failure_outcome(&request, SourceError::Unexpected(join_error_detail(err)))
            }
        };
        sink.event(ProgressEvent {
            message: format!(
                "phase=Fetch; {}/{total} {} {}",
                outcomes.len() + 1,
                outcome.identifier(),
                if outcome.is_success() { "ok" } else { "failed" }
            ),
            elapsed: Some(start.elapsed()),
        });
        outcomes.push(outcome);
    }
    outcomes.extend(unfinished_outcomes(pending.into_values()));

    sink.event(ProgressEvent {
        message: "phase=Write; writing FASTA artifact".to_string(),
        elapsed: Some(start.elapsed()),
    });
    let result = tokio::task::spawn_blocking(move || write_artifact(artifact, outcomes))
        .await
        .map_err(|err| ProteomeError::ArtifactCreation(err.to_string()))??;

    info!(
        written = result.entries.len(),
        failed = result.failures.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        artifact = %result.artifact_path.display(),
        "proteome batch complete"
    );
    Ok(result)
}

fn create_artifact(options: &BatchOptions) -> Result<NamedTempFile, ProteomeError> {
    let dir = options
        .artifact_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    tempfile::Builder::new()
        .prefix("proteomes-")
        .suffix(".fasta")
        .tempfile_in(&dir)
        .map_err(|err| ProteomeError::ArtifactCreation(format!("{}: {err}", dir.display())))
}

fn write_artifact(
    artifact: NamedTempFile,
    outcomes: Vec<FetchOutcome>,
) -> Result<BatchResult, ProteomeError> {
    let mut entries = Vec::new();
    let mut failures = Vec::new();
    {
        let mut writer = BufWriter::new(artifact.as_file());
        for outcome in outcomes {
            match outcome {
                FetchOutcome::Success {
                    identifier,
                    label,
                    payload,
                } => {
                    write_entry(&mut writer, &identifier, &label, &payload)
                        .map_err(|err| ProteomeError::ArtifactCreation(err.to_string()))?;
                    entries.push(identifier);
                }
                FetchOutcome::Failure(failure) => failures.push(failure),
            }
        }
        writer
            .flush()
            .map_err(|err| ProteomeError::ArtifactCreation(err.to_string()))?;
    }
    let (_file, artifact_path) = artifact
        .keep()
        .map_err(|err| ProteomeError::ArtifactCreation(err.to_string()))?;
    Ok(BatchResult {
        artifact_path,
        entries,
        failures,
    })
}

/// `>{id} {label}` header, the payload as received, then a line break.
pub fn write_entry<W: Write>(
    writer: &mut W,
    identifier: &ProteomeId,
    label: &str,
    payload: &[u8],
) -> std::io::Result<()> {
    writeln!(writer, ">{identifier} {label}")?;
    writer.write_all(payload)?;
    writer.write_all(b"\n")
}

/// Failures for requests whose task reported nothing, so every request still
/// ends with exactly one outcome.
fn unfinished_outcomes(requests: impl IntoIterator<Item = FetchRequest>) -> Vec<FetchOutcome> {
    requests
        .into_iter()
        .map(|request| {
            failure_outcome(
                &request,
                SourceError::Unexpected("fetch task ended without an outcome".to_string()),
            )
        })
        .collect()
}

fn join_error_detail(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        err.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "fetch task panicked".to_string()
}
