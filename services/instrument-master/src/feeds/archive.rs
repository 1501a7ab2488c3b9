//! In-memory zip handling for vendor downloads

use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

use crate::error::FeedError;

/// Every `.txt` member of a zip archive as (name, bytes), in archive order
pub fn text_members(url: &str, bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, FeedError> {
    let archive_err = |source| FeedError::Archive {
        url: url.to_string(),
        source,
    };
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(archive_err)?;
    let mut members = Vec::new();

    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(archive_err)?;
        if !file.is_file() || !file.name().to_ascii_lowercase().ends_with(".txt") {
            continue;
        }

        let name = file.name().to_string();
        let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or_default());
        file.read_to_end(&mut data).map_err(|source| FeedError::Io {
            member: name.clone(),
            source,
        })?;
        debug!("Extracted {} ({} bytes) from {}", name, data.len(), url);
        members.push((name, data));
    }

    if members.is_empty() {
        return Err(FeedError::EmptyArchive {
            url: url.to_string(),
        });
    }

    Ok(members)
}
