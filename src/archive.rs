use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use crate::entry::{read_entry, ExportDocument, JournalEntry, RejectedEntry};
use crate::error::ExportError;

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Entries of one journal read out of an export archive
#[derive(Debug, Default)]
pub struct Extraction {
    pub entries: Vec<JournalEntry>,
    /// Entries of the journal that could not be read
    pub rejected: Vec<RejectedEntry>,
}

/// Read the entries of `journal` out of an export archive
///
/// The archive is either a bare JSON document or a zip holding one. Entries
/// come back in document order and are not deduplicated.
pub fn extract(archive: &Path, journal: &str) -> Result<Vec<JournalEntry>, ExportError> {
    read_journal(archive, journal).map(|extraction| extraction.entries)
}

/// Like [`extract`], also returning the journal's entries that could not be
/// read
///
/// A broken entry only fails itself. The archive as a whole is malformed
/// when it cannot be opened or its document is not an export.
pub fn read_journal(archive: &Path, journal: &str) -> Result<Extraction, ExportError> {
    let mut file = File::open(archive)?;

    let mut magic = [0u8; 4];
    let read = read_prefix(&mut file, &mut magic)?;
    file.rewind()?;

    let (json, member_journal) = if read == magic.len() && &magic == ZIP_MAGIC {
        read_zip_member(file, journal)?
    } else {
        let mut json = String::new();
        file.read_to_string(&mut json)
            .map_err(|e| ExportError::MalformedArchive(format!("{} is not UTF-8 JSON: {e}", archive.display())))?;
        (json, None)
    };

    let document: ExportDocument = serde_json::from_str(&json).map_err(|e| {
        ExportError::MalformedArchive(format!("invalid export JSON in {}: {e}", archive.display()))
    })?;

    let total = document.entries.len();
    let mut extraction = Extraction::default();
    for (index, value) in document.entries.into_iter().enumerate() {
        match read_entry(value, index, member_journal.as_deref()) {
            Ok(entry) if entry.belongs_to(journal) => extraction.entries.push(entry),
            Ok(_) => {}
            Err(rejected) if rejected.belongs_to(journal) => {
                log::warn!("Skipping unreadable entry {}: {}", rejected.id, rejected.reason);
                extraction.rejected.push(rejected);
            }
            Err(rejected) => log::debug!("Ignoring unreadable entry {} of another journal", rejected.id),
        }
    }

    log::info!(
        "Found {} of {} entries in the '{}' journal",
        extraction.entries.len(),
        total,
        journal
    );
    Ok(extraction)
}

fn read_prefix(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Pick the single JSON member of a zip export
///
/// With several JSON members, the one named exactly after the journal wins,
/// else the single one whose name contains it; anything else is ambiguous. Returns the member's content and
/// its file stem, which stands in for the journal of entries lacking one.
fn read_zip_member(file: File, journal: &str) -> Result<(String, Option<String>), ExportError> {
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| ExportError::MalformedArchive(format!("unreadable zip: {e}")))?;

    let candidates: Vec<String> = zip
        .file_names()
        .filter(|name| is_json_member(name))
        .map(str::to_string)
        .collect();

    let chosen = match candidates.len() {
        0 => {
            return Err(ExportError::MalformedArchive(
                "archive contains no JSON document".to_string(),
            ))
        }
        1 => candidates[0].clone(),
        _ => {
            let wanted = journal.to_lowercase();
            let exact: Vec<&String> = candidates
                .iter()
                .filter(|name| member_stem(name).to_lowercase() == wanted)
                .collect();
            let matching: Vec<&String> = if exact.is_empty() {
                candidates
                    .iter()
                    .filter(|name| member_stem(name).to_lowercase().contains(&wanted))
                    .collect()
            } else {
                exact
            };
            match matching.as_slice() {
                [only] => (*only).clone(),
                _ => {
                    return Err(ExportError::MalformedArchive(format!(
                        "ambiguous archive: {} JSON documents ({}) and {} match '{}'",
                        candidates.len(),
                        candidates.join(", "),
                        matching.len(),
                        journal
                    )))
                }
            }
        }
    };

    let mut member = zip
        .by_name(&chosen)
        .map_err(|e| ExportError::MalformedArchive(format!("cannot open {chosen}: {e}")))?;
    let mut json = String::new();
    member
        .read_to_string(&mut json)
        .map_err(|e| ExportError::MalformedArchive(format!("cannot read {chosen}: {e}")))?;

    log::debug!("Using archive member {chosen}");
    Ok((json, Some(member_stem(&chosen).to_string())))
}

fn is_json_member(name: &str) -> bool {
    !name.ends_with('/')
        && !name.starts_with("__MACOSX/")
        && name.to_lowercase().ends_with(".json")
}

fn member_stem(name: &str) -> &str {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem)
}
