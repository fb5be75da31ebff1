use std::collections::HashSet;
use std::fs;

use camino::Utf8Path;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::catalog::{Catalog, ProteomeRecord};
use crate::error::ProteomeError;

pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Which rows of the reference table a request is about.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    taxa: Vec<String>,
    patterns: Vec<Regex>,
    pub remove_redundancy: bool,
}

impl Selection {
    /// Builds a selection from a typed comma-separated list and/or the
    /// contents of a taxa file (one taxon per line). Fails with
    /// [`ProteomeError::InvalidTaxon`] when a term cannot be compiled into a
    /// matcher.
    pub fn from_inputs(
        typed: Option<&str>,
        file_contents: Option<&str>,
        remove_redundancy: bool,
    ) -> Result<Self, ProteomeError> {
        let typed_terms = typed.into_iter().flat_map(|list| list.split(','));
        let file_terms = file_contents.into_iter().flat_map(str::lines);
        let taxa = normalize_taxa(typed_terms.chain(file_terms));
        let patterns = taxa
            .iter()
            .map(|taxon| taxon_pattern(taxon))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            taxa,
            patterns,
            remove_redundancy,
        })
    }

    pub fn from_sources(
        typed: Option<&str>,
        taxa_file: Option<&Utf8Path>,
        remove_redundancy: bool,
    ) -> Result<Self, ProteomeError> {
        let contents = taxa_file
            .map(|path| {
                fs::read_to_string(path.as_std_path())
                    .map_err(|_| ProteomeError::TaxaFileRead(path.as_std_path().to_path_buf()))
            })
            .transpose()?;
        Self::from_inputs(typed, contents.as_deref(), remove_redundancy)
    }

    /// Lowercased, trimmed, deduplicated taxa in first-seen order.
    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    /// Matching rows in table order per taxon. Without taxa the whole table
    /// is selected.
    pub fn apply<'a>(&self, catalog: &'a Catalog) -> Vec<&'a ProteomeRecord> {
        if self.taxa.is_empty() {
            let rows = catalog.records().iter();
            if !self.remove_redundancy {
                return rows.collect();
            }
            let mut seen = HashSet::new();
            return rows
                .filter(|record| seen.insert(record.organism.as_str()))
                .collect();
        }

        let mut selected: Vec<&ProteomeRecord> = Vec::new();
        let mut seen: HashSet<&ProteomeRecord> = HashSet::new();
        for pattern in &self.patterns {
            let matches = catalog
                .records()
                .iter()
                .filter(|record| pattern.is_match(&record.organism));
            let limit = if self.remove_redundancy { 1 } else { usize::MAX };
            for record in matches.take(limit) {
                if seen.insert(record) {
                    selected.push(record);
                }
            }
        }
        selected
    }
}

fn normalize_taxa<'a>(terms: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .filter(|term| seen.insert(term.clone()))
        .collect()
}

fn taxon_pattern(taxon: &str) -> Result<Regex, ProteomeError> {
    RegexBuilder::new(&regex::escape(taxon))
        .case_insensitive(true)
        .build()
        .map_err(|err| ProteomeError::InvalidTaxon(truncate_taxon(taxon), err.to_string()))
}

fn truncate_taxon(taxon: &str) -> String {
    const SHOWN: usize = 40;
    match taxon.char_indices().nth(SHOWN) {
        Some((cut, _)) => format!("{}...", &taxon[..cut]),
        None => taxon.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    page: usize,
    page_size: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn new(page: usize, page_size: usize) -> Result<Self, ProteomeError> {
        if page < 1 {
            return Err(ProteomeError::InvalidPagination(format!(
                "page must be at least 1, got {page}"
            )));
        }
        if page_size < 1 {
            return Err(ProteomeError::InvalidPagination(format!(
                "page size must be at least 1, got {page_size}"
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self
            .page
            .saturating_sub(1)
            .saturating_mul(self.page_size)
            .min(items.len());
        let end = start.saturating_add(self.page_size).min(items.len());
        &items[start..end]
    }
}
