use std::io::Read;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{FetchRequest, ProteomeId};
use crate::error::ProteomeError;
use crate::fs_util::open_maybe_gz;

/// One row of the reference proteome table. Column names follow the
/// UniProt proteome export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProteomeRecord {
    #[serde(rename = "Proteome Id")]
    pub proteome_id: ProteomeId,
    #[serde(rename = "Organism", default)]
    pub organism: String,
    #[serde(rename = "Protein count", default)]
    pub protein_count: Option<u64>,
}

impl ProteomeRecord {
    pub fn fetch_request(&self) -> FetchRequest {
        FetchRequest::new(self.proteome_id.clone(), self.organism.clone())
    }
}

/// Read-only reference table, loaded once and shared for the life of the
/// process.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Vec<ProteomeRecord>,
}

impl Catalog {
    pub fn load(path: &Utf8Path) -> Result<Self, ProteomeError> {
        if !path.as_std_path().is_file() {
            return Err(ProteomeError::MissingTable(path.as_std_path().to_path_buf()));
        }
        let reader = open_maybe_gz(path)?;
        let catalog = Self::from_reader(reader)?;
        info!(path = %path, records = catalog.len(), "reference table loaded");
        Ok(catalog)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ProteomeError> {
        let mut tsv = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(reader);

        let headers = tsv
            .headers()
            .map_err(|err| ProteomeError::TableRead(err.to_string()))?;
        for required in ["Proteome Id", "Organism"] {
            if !headers.iter().any(|h| h == required) {
                return Err(ProteomeError::TableParse(format!(
                    "missing column {required:?}"
                )));
            }
        }

        let records = tsv
            .deserialize::<ProteomeRecord>()
            .map(|row| row.map_err(table_error))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }

    pub fn from_records(records: Vec<ProteomeRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ProteomeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn table_error(err: csv::Error) -> ProteomeError {
    match err.kind() {
        csv::ErrorKind::Io(_) => ProteomeError::TableRead(err.to_string()),
        _ => ProteomeError::TableParse(err.to_string()),
    }
}
