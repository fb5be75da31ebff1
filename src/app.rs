use std::fs;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::batch::{BatchOptions, BatchResult, assemble_batch};
use crate::catalog::{Catalog, ProteomeRecord};
use crate::domain::FetchRequest;
use crate::error::ProteomeError;
use crate::fs_util::copy_file_atomic;
use crate::selection::{Page, Selection};
use crate::uniprot::ProteomeSource;

#[derive(Debug, Clone, Serialize)]
pub struct FilterResult {
    pub count: usize,
    pub page: usize,
    pub page_size: usize,
    pub preview: Vec<ProteomeRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub fasta_file: String,
    pub requested: usize,
    pub entries: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub generated_at: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress to the operational log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

/// Counts the rows `selection` picks from `catalog` and returns one page of
/// them. Needs no remote source.
pub fn filter(catalog: &Catalog, selection: &Selection, page: Page) -> FilterResult {
    let matches = selection.apply(catalog);
    FilterResult {
        count: matches.len(),
        page: page.page(),
        page_size: page.page_size(),
        preview: page.slice(&matches).iter().map(|r| (*r).clone()).collect(),
    }
}

pub struct App<S: ProteomeSource> {
    catalog: Catalog,
    source: Arc<S>,
    options: BatchOptions,
}

impl<S: ProteomeSource + 'static> App<S> {
    pub fn new(catalog: Catalog, source: S, options: BatchOptions) -> Self {
        Self {
            catalog,
            source: Arc::new(source),
            options,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn filter(&self, selection: &Selection, page: Page) -> FilterResult {
        filter(&self.catalog, selection, page)
    }

    /// Selected records as pipeline input, labelled by organism.
    pub fn fetch_requests(&self, selection: &Selection) -> Vec<FetchRequest> {
        selection
            .apply(&self.catalog)
            .into_iter()
            .map(ProteomeRecord::fetch_request)
            .collect()
    }

    /// Downloads every selected proteome into one FASTA file. With a
    /// `destination` the artifact is moved there; otherwise the temporary
    /// artifact path is reported.
    pub async fn download(
        &self,
        selection: &Selection,
        destination: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, ProteomeError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; selecting proteomes".to_string(),
            elapsed: None,
        });
        let requests = self.fetch_requests(selection);
        if requests.is_empty() {
            return Err(ProteomeError::NoProteomesSelected);
        }
        let requested = requests.len();

        let batch = assemble_batch(Arc::clone(&self.source), requests, &self.options, sink).await?;
        for reason in batch.failure_reasons() {
            warn!("Skipping proteome: {reason}");
        }
        let fasta_file = match destination {
            Some(dest) => place_artifact(&batch, dest)?,
            None => batch.artifact_path.display().to_string(),
        };

        Ok(DownloadResult {
            fasta_file,
            requested,
            entries: batch.entries.iter().map(|id| id.to_string()).collect(),
            errors: batch
                .failures
                .into_iter()
                .map(|failure| failure.reason)
                .collect(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

fn place_artifact(batch: &BatchResult, dest: &Utf8Path) -> Result<String, ProteomeError> {
    let artifact = Utf8PathBuf::from_path_buf(batch.artifact_path.clone())
        .map_err(|_| ProteomeError::Filesystem("artifact path is not UTF-8".to_string()))?;
    copy_file_atomic(&artifact, dest)?;
    if let Err(err) = fs::remove_file(artifact.as_std_path()) {
        warn!(path = %artifact, error = %err, "failed to remove temporary artifact");
    }
    Ok(dest.to_string())
}
