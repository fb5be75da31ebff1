use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ProteomeError {
    #[error("invalid proteome id: {0:?}")]
    InvalidProteomeId(String),

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("reference table not found at {0}")]
    #[diagnostic(help("pass --table or set reference_table in proteome-dl.json"))]
    MissingTable(PathBuf),

    #[error("failed to read reference table: {0}")]
    TableRead(String),

    #[error("malformed reference table: {0}")]
    TableParse(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("taxon {0:?} cannot be matched: {1}")]
    InvalidTaxon(String, String),

    #[error("failed to read taxa file at {0}")]
    TaxaFileRead(PathBuf),

    #[error("No proteomes selected")]
    NoProteomesSelected,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("failed to create FASTA artifact: {0}")]
    ArtifactCreation(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
