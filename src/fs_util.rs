use std::fs;
use std::io::{BufReader, Read};

use camino::Utf8Path;
use flate2::read::MultiGzDecoder;

use crate::error::ProteomeError;

/// Opens `path` for reading, transparently gunzipping `*.gz` files.
pub fn open_maybe_gz(path: &Utf8Path) -> Result<Box<dyn Read>, ProteomeError> {
    let file = fs::File::open(path.as_std_path())
        .map_err(|err| ProteomeError::Filesystem(format!("open {path}: {err}")))?;
    let reader = BufReader::new(file);
    if path.extension() == Some("gz") {
        Ok(Box::new(MultiGzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Copies `source` to `dest` through a sibling temp file so readers of
/// `dest` never see a partial file.
pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), ProteomeError> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| ProteomeError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix(".proteome-dl")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| ProteomeError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| ProteomeError::Filesystem(format!("copy {source}: {err}")))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| ProteomeError::Filesystem(err.to_string()))?;
    Ok(())
}
