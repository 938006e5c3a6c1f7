use std::io::{Cursor, Read, Write};

use sift_core::error::AppError;
use sift_core::models::OutputBundle;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Pack every bundle document into an in-memory deflated `.zip`, one
/// pretty JSON entry per document, in bundle order.
pub fn zip_bundle(bundle: &OutputBundle) -> Result<Vec<u8>, AppError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for document in &bundle.documents {
        let data = document.to_pretty_bytes()?;
        writer
            .start_file(document.name.as_str(), options)
            .map_err(archive_error)?;
        writer.write_all(&data).map_err(archive_error)?;
    }
    let bytes = writer.finish().map_err(archive_error)?.into_inner();

    tracing::debug!(
        documents = bundle.len(),
        size_bytes = bytes.len(),
        "Archive built"
    );
    Ok(bytes)
}

/// Read a `.zip` back into `(name, bytes)` entries.
pub fn entries(archive: &[u8]) -> Result<Vec<(String, Vec<u8>)>, AppError> {
    let mut zip = ZipArchive::new(Cursor::new(archive)).map_err(archive_error)?;
    let mut out = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(archive_error)?;
        let name = file.name().to_string();
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(archive_error)?;
        out.push((name, data));
    }
    Ok(out)
}

fn archive_error(e: impl std::fmt::Display) -> AppError {
    AppError::Generic(format!("Archive error: {e}"))
}
