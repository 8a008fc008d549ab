//! Archives embedded in the caller file
//!
//! Everything after a line reading `__DATA__` is a sequence of base64 blocks
//! separated by blank lines. Each block decodes to a tar stream, gzipped or not.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::Cursor;
use std::path::Path;

use super::{decompressing_reader, ArchiveRef, SourceError};

/// Source spec sentinel and data-section marker line
pub const DATA_SENTINEL: &str = "__DATA__";

/// Decode every block embedded in `caller`
pub fn open(caller: &Path) -> Result<Vec<ArchiveRef>, SourceError> {
    let raw = std::fs::read(caller).map_err(|e| SourceError::io(caller.display(), e))?;
    let text = String::from_utf8_lossy(&raw);

    let data = data_section(&text)
        .ok_or_else(|| SourceError::MissingDataSection(caller.to_path_buf()))?;

    let blocks = split_blocks(data);
    tracing::debug!(
        caller = %caller.display(),
        blocks = blocks.len(),
        "decoding embedded archives"
    );

    blocks
        .iter()
        .enumerate()
        .map(|(block, encoded)| -> Result<ArchiveRef, SourceError> {
            let bytes = STANDARD
                .decode(encoded)
                .map_err(|source| SourceError::Decode {
                    path: caller.to_path_buf(),
                    block,
                    source,
                })?;
            let source_path = format!("{}#{}[{}]", caller.display(), DATA_SENTINEL, block);
            let reader = decompressing_reader(Cursor::new(bytes))
                .map_err(|e| SourceError::io(&source_path, e))?;

            Ok(ArchiveRef {
                reader,
                name_prefix: String::new(),
                source_path,
                display_name: String::new(),
            })
        })
        .collect()
}

/// Text following the first `__DATA__` line
pub fn data_section(text: &str) -> Option<&str> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        offset += line.len();
        if line.trim_end_matches(['\r', '\n']) == DATA_SENTINEL {
            return Some(&text[offset..]);
        }
    }
    None
}

/// Split on runs of blank lines, dropping whitespace inside each block
pub fn split_blocks(data: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in data.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.extend(line.chars().filter(|c| !c.is_whitespace()));
        }
    }

    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}
