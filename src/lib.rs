//! Taxon-driven proteome selection and bulk FASTA download from UniProt.
//!
//! A reference table of proteomes is filtered by taxon name, then the
//! selected proteomes are fetched concurrently and assembled into a single
//! FASTA file. Per-record failures are reported next to the file instead of
//! failing the whole download.

pub mod app;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod selection;
pub mod uniprot;
