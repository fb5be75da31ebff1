use std::collections::{BTreeSet, HashMap};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use proteome_dl::batch::{BatchOptions, assemble_batch};
use proteome_dl::domain::{FailureKind, FetchRequest, ProteomeId};
use proteome_dl::error::ProteomeError;
use proteome_dl::output::JsonOutput;
use proteome_dl::uniprot::{HttpOptions, ProteomeSource, SourceError, UniprotProteomeClient};

/// Answers from a fixed table; unknown ids get a 404.
#[derive(Default)]
struct TableSource {
    answers: HashMap<String, Result<Vec<u8>, SourceError>>,
}

impl TableSource {
    fn ok(mut self, id: &str, payload: &str) -> Self {
        self.answers
            .insert(id.to_string(), Ok(payload.as_bytes().to_vec()));
        self
    }

    fn err(mut self, id: &str, err: SourceError) -> Self {
        self.answers.insert(id.to_string(), Err(err));
        self
    }
}

#[async_trait]
impl ProteomeSource for TableSource {
    async fn fetch_fasta(&self, id: &ProteomeId) -> Result<Vec<u8>, SourceError> {
        self.answers
            .get(id.as_str())
            .cloned()
            .unwrap_or(Err(SourceError::Status(404)))
    }
}

/// Sleeps on every fetch and records the peak number of fetches in flight.
#[derive(Default)]
struct SlowSource {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ProteomeSource for SlowSource {
    async fn fetch_fasta(&self, _id: &ProteomeId) -> Result<Vec<u8>, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(b"MKT\n".to_vec())
    }
}

struct PanickingSource;

#[async_trait]
impl ProteomeSource for PanickingSource {
    async fn fetch_fasta(&self, id: &ProteomeId) -> Result<Vec<u8>, SourceError> {
        if id.as_str() == "UPBOOM" {
            panic!("decoder exploded");
        }
        Ok(b"MKT\n".to_vec())
    }
}

fn request(id: &str, label: &str) -> FetchRequest {
    FetchRequest::new(id.parse().unwrap(), label)
}

fn options_in(dir: &tempfile::TempDir, concurrency: usize) -> BatchOptions {
    BatchOptions {
        concurrency,
        artifact_dir: Some(dir.path().to_path_buf()),
    }
}

/// Our headers are the only lines starting with `>UP`; fixture payloads
/// never do.
fn artifact_headers(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .filter(|line| line.starts_with(">UP") || line.starts_with(">BAD"))
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn scenario_one_good_one_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stream"))
        .and(query_param("query", "proteome:UP000005640"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(">sp|P69905|HBA_HUMAN Hemoglobin subunit alpha\nMVLSPADKTNVKAAW\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stream"))
        .and(query_param("query", "proteome:BADID"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let client = UniprotProteomeClient::with_options(HttpOptions {
        base_url: server.uri(),
        ..HttpOptions::default()
    })
    .unwrap();
    let temp = tempfile::tempdir().unwrap();
    let requests = vec![
        request("UP000005640", "Homo sapiens"),
        request("BADID", "Ghost taxon"),
    ];

    let result = assemble_batch(Arc::new(client), requests, &options_in(&temp, 0), &JsonOutput)
        .await
        .unwrap();

    let content = std::fs::read_to_string(&result.artifact_path).unwrap();
    assert!(content.starts_with(">UP000005640 Homo sapiens\n>sp|P69905|HBA_HUMAN"));
    assert_eq!(content.matches(">UP000005640 ").count(), 1);
    assert!(!content.contains("BADID"));
    assert_eq!(result.entries, vec!["UP000005640".parse::<ProteomeId>().unwrap()]);
    assert_eq!(
        result.failure_reasons(),
        vec!["Error downloading proteome for 'Ghost taxon' (Status code: 400)"]
    );
    assert_eq!(result.failures[0].kind, FailureKind::RemoteStatus(400));
}

#[tokio::test]
async fn every_request_yields_exactly_one_entry_or_failure() {
    let source = TableSource::default()
        .ok("UP000005640", "MVLSPADKTNVKAAW\n")
        .ok("UP000000589", "MVHLTDAEKAAVSCL\n")
        .ok("UP000000625", "MKRISTTITTTITIT\n")
        .err("UP000001410", SourceError::Status(500))
        .err(
            "UP000002311",
            SourceError::Transport("connection reset by peer".to_string()),
        );
    let requests = vec![
        request("UP000005640", "Homo sapiens"),
        request("UP000000589", "Mus musculus"),
        request("UP000000625", "Escherichia coli (strain K12)"),
        request("UP000001410", "Escherichia coli O6:H1"),
        request("UP000002311", "Saccharomyces cerevisiae"),
        request("UP000001940", "Caenorhabditis elegans"),
    ];
    let temp = tempfile::tempdir().unwrap();

    let result = assemble_batch(Arc::new(source), requests, &options_in(&temp, 2), &JsonOutput)
        .await
        .unwrap();

    assert_eq!(result.entries.len(), 3);
    assert_eq!(result.failures.len(), 3);

    let written: BTreeSet<&str> = result.entries.iter().map(ProteomeId::as_str).collect();
    let failed: BTreeSet<&str> = result
        .failures
        .iter()
        .map(|f| f.identifier.as_str())
        .collect();
    assert!(written.is_disjoint(&failed));
    assert_eq!(written.len() + failed.len(), 6);

    let content = std::fs::read_to_string(&result.artifact_path).unwrap();
    assert_eq!(
        artifact_headers(&content),
        BTreeSet::from([
            ">UP000005640 Homo sapiens".to_string(),
            ">UP000000589 Mus musculus".to_string(),
            ">UP000000625 Escherichia coli (strain K12)".to_string(),
        ])
    );
    assert!(content.contains(">UP000005640 Homo sapiens\nMVLSPADKTNVKAAW\n\n"));

    let kinds: Vec<FailureKind> = result.failures.iter().map(|f| f.kind).collect();
    assert!(kinds.contains(&FailureKind::RemoteStatus(500)));
    assert!(kinds.contains(&FailureKind::RemoteStatus(404)));
    assert!(kinds.contains(&FailureKind::Transport));
}

#[tokio::test]
async fn rerun_yields_same_sets() {
    let source = Arc::new(
        TableSource::default()
            .ok("UP000005640", "MVLS\n")
            .ok("UP000000589", "MVHL\n")
            .err("UP000000625", SourceError::Status(503)),
    );
    let requests = vec![
        request("UP000005640", "Homo sapiens"),
        request("UP000000589", "Mus musculus"),
        request("UP000000625", "Escherichia coli"),
    ];
    let temp = tempfile::tempdir().unwrap();
    let options = options_in(&temp, 0);

    let first = assemble_batch(Arc::clone(&source), requests.clone(), &options, &JsonOutput)
        .await
        .unwrap();
    let second = assemble_batch(Arc::clone(&source), requests, &options, &JsonOutput)
        .await
        .unwrap();

    assert_ne!(first.artifact_path, second.artifact_path);
    let set = |ids: &[ProteomeId]| ids.iter().cloned().collect::<BTreeSet<_>>();
    assert_eq!(set(first.entries.as_slice()), set(second.entries.as_slice()));
    let reasons = |r: &proteome_dl::batch::BatchResult| {
        r.failure_reasons()
            .into_iter()
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
    };
    assert_eq!(reasons(&first), reasons(&second));
}

#[tokio::test]
async fn empty_batch_creates_empty_artifact() {
    let temp = tempfile::tempdir().unwrap();
    let result = assemble_batch(
        Arc::new(TableSource::default()),
        Vec::new(),
        &options_in(&temp, 0),
        &JsonOutput,
    )
    .await
    .unwrap();

    assert!(result.artifact_path.is_file());
    assert!(result.artifact_path.starts_with(temp.path()));
    assert_eq!(std::fs::read(&result.artifact_path).unwrap(), b"");
    assert!(result.entries.is_empty());
    assert!(!result.has_failures());
}

#[tokio::test]
async fn transport_outage_still_returns_empty_artifact() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let client = UniprotProteomeClient::with_options(HttpOptions {
        base_url: format!("http://127.0.0.1:{port}"),
        ..HttpOptions::default()
    })
    .unwrap();
    let requests = vec![
        request("UP000005640", "Homo sapiens"),
        request("UP000000589", "Mus musculus"),
        request("UP000000625", "Escherichia coli"),
    ];
    let temp = tempfile::tempdir().unwrap();

    let result = assemble_batch(Arc::new(client), requests, &options_in(&temp, 0), &JsonOutput)
        .await
        .unwrap();

    assert!(result.artifact_path.is_file());
    assert_eq!(std::fs::read(&result.artifact_path).unwrap(), b"");
    assert!(result.entries.is_empty());
    assert_eq!(result.failures.len(), 3);
    assert!(
        result
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::Transport)
    );
}

#[tokio::test]
async fn concurrency_cap_limits_in_flight_fetches() {
    let source = Arc::new(SlowSource::default());
    let requests: Vec<FetchRequest> = (0..8)
        .map(|i| request(&format!("UP00000000{i}"), "Test organism"))
        .collect();
    let temp = tempfile::tempdir().unwrap();

    let result = assemble_batch(Arc::clone(&source), requests, &options_in(&temp, 2), &JsonOutput)
        .await
        .unwrap();

    assert_eq!(result.entries.len(), 8);
    assert!(source.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn uncapped_batch_runs_every_fetch_at_once() {
    let source = Arc::new(SlowSource::default());
    let requests: Vec<FetchRequest> = (0..5)
        .map(|i| request(&format!("UP00000000{i}"), "Test organism"))
        .collect();
    let temp = tempfile::tempdir().unwrap();

    let result = assemble_batch(Arc::clone(&source), requests, &options_in(&temp, 0), &JsonOutput)
        .await
        .unwrap();

    assert_eq!(result.entries.len(), 5);
    assert_eq!(source.peak.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn panicking_fetch_becomes_unexpected_failure() {
    let requests = vec![
        request("UP000005640", "Homo sapiens"),
        request("UPBOOM", "Cursed organism"),
    ];
    let temp = tempfile::tempdir().unwrap();

    let result = assemble_batch(
        Arc::new(PanickingSource),
        requests,
        &options_in(&temp, 0),
        &JsonOutput,
    )
    .await
    .unwrap();

    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.failures.len(), 1);
    let failure = &result.failures[0];
    assert_eq!(failure.identifier.as_str(), "UPBOOM");
    assert_eq!(failure.kind, FailureKind::Unexpected);
    assert_eq!(failure.reason, "Unexpected error occurred: decoder exploded");
}

#[tokio::test]
async fn unusable_artifact_dir_fails_the_batch() {
    let temp = tempfile::tempdir().unwrap();
    let options = BatchOptions {
        concurrency: 0,
        artifact_dir: Some(temp.path().join("missing").join("dir")),
    };

    let err = assemble_batch(
        Arc::new(TableSource::default().ok("UP000005640", "MVLS\n")),
        vec![request("UP000005640", "Homo sapiens")],
        &options,
        &JsonOutput,
    )
    .await
    .unwrap_err();

    assert_matches!(err, ProteomeError::ArtifactCreation(_));
}
