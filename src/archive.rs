//! Tar (optionally gzip-compressed) archive ingestion for taxonomy and
//! filing inputs, in the style of the teacher's `archive.rs`: entries are
//! walked one at a time via `tar::Archive`, matched by path, and read into
//! memory without unpacking to disk.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::bufread::GzDecoder;

use crate::errors::TaxonomyError;

/// Whether `path` names a tar archive this module knows how to open, judged
/// by its suffix (`.tar`, `.tar.gz`, `.tgz`) rather than by sniffing bytes.
pub fn is_tar_archive(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".tar") || name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

fn is_gzip(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

fn open_tar(path: &Path) -> std::io::Result<tar::Archive<Box<dyn Read>>> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(BufReader::new(file)))
    }
    else {
        Box::new(file)
    };
    Ok(tar::Archive::new(reader))
}

/// Reads one named entry out of a taxonomy archive (the entry-point manifest
/// at `entry_path`), mirroring `Archive::meta`'s entry-by-name scan.
pub fn read_taxonomy_entry(path: &Path, entry_path: &str) -> Result<String, TaxonomyError> {
    let mut archive = open_tar(path)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.header().path()?.to_str().unwrap_or_default().to_string();
        if name == entry_path {
            let mut contents = String::new();
            entry.read_to_string(&mut contents)?;
            return Ok(contents);
        }
    }

    Err(TaxonomyError::Incomplete(format!("archive '{}' has no entry '{entry_path}'", path.display())))
}

/// Reads every `.xml` entry out of a filings archive: name (file stem),
/// bytes, and the entry's recorded modification time (Unix seconds), used as
/// the filing's publication time when no metadata envelope is present.
pub fn read_filings(path: &Path) -> std::io::Result<Vec<(String, Vec<u8>, u64)>> {
    let mut archive = open_tar(path)?;
    let mut filings = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.header().path()?.to_str().unwrap_or_default().to_string();
        if !name.ends_with(".xml") {
            continue;
        }

        let mtime = entry.header().mtime()?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;

        let stem = Path::new(&name).file_stem().and_then(|s| s.to_str()).unwrap_or("filing").to_string();
        filings.push((stem, bytes, mtime));
    }

    filings.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(filings)
}
