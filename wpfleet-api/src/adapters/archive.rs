//! `ArchiveOps` — unpacks an uploaded WordPress export/zip into a tar
//! stream the container adapter can copy into a site's volume, for the
//! static provisioning path.

use async_trait::async_trait;
use std::io::{Cursor, Read, Write};
use std::sync::Mutex;
use wpfleet_core::{Error, Result};

#[async_trait]
pub trait ArchiveOps: Send + Sync {
    /// Reads a zip archive from `zip_bytes` and returns a tar stream of its
    /// regular files, preserving relative paths and Unix file modes where
    /// present, ready to hand to [`crate::adapters::ContainerOps::copy_tar`].
    async fn zip_to_tar(&self, zip_bytes: Vec<u8>) -> Result<Vec<u8>>;
}

pub struct ZipExtractor;

impl ZipExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ZipExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArchiveOps for ZipExtractor {
    async fn zip_to_tar(&self, zip_bytes: Vec<u8>) -> Result<Vec<u8>> {
        // zip and tar are both synchronous, CPU-bound decoders; run them on
        // a blocking thread so they don't stall the async executor on a
        // large upload.
        tokio::task::spawn_blocking(move || convert(zip_bytes))
            .await
            .map_err(|e| Error::adapter("archive", e))?
    }
}

fn convert(zip_bytes: Vec<u8>) -> Result<Vec<u8>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(zip_bytes))
        .map_err(|e| Error::adapter("archive", e))?;

    let mut tar_builder = tar::Builder::new(Vec::new());

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| Error::adapter("archive", e))?;
        if entry.is_dir() {
            continue;
        }

        let name = match entry.enclosed_name() {
            Some(path) => path.to_owned(),
            None => continue, // reject entries with unsafe paths (e.g. `../`)
        };

        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut contents)
            .map_err(|e| Error::adapter("archive", e))?;

        let mode = entry.unix_mode().unwrap_or(0o644);

        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(mode);
        header.set_cksum();

        tar_builder
            .append_data(&mut header, &name, Cursor::new(contents))
            .map_err(|e| Error::adapter("archive", e))?;
    }

    tar_builder.into_inner().map_err(|e| Error::adapter("archive", e))
}

/// In-memory fake used by orchestrator unit tests: records the input it was
/// given and returns a fixed or injected tar payload rather than performing
/// any real decoding.
#[derive(Default)]
pub struct FakeArchive {
    pub last_input: Mutex<Option<Vec<u8>>>,
    pub output: Mutex<Vec<u8>>,
    pub should_fail: Mutex<bool>,
}

impl FakeArchive {
    pub fn new() -> Self {
        Self {
            last_input: Mutex::new(None),
            output: Mutex::new(b"fake-tar-stream".to_vec()),
            should_fail: Mutex::new(false),
        }
    }

    pub fn fail_next(&self) {
        *self.should_fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl ArchiveOps for FakeArchive {
    async fn zip_to_tar(&self, zip_bytes: Vec<u8>) -> Result<Vec<u8>> {
        if *self.should_fail.lock().unwrap() {
            *self.should_fail.lock().unwrap() = false;
            return Err(Error::adapter("archive", "forced failure"));
        }
        *self.last_input.lock().unwrap() = Some(zip_bytes);
        Ok(self.output.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_zip() -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Stored)
                .unix_permissions(0o644);
            writer.start_file("index.php", options).unwrap();
            writer.write_all(b"<?php echo 'hi'; ").unwrap();
            writer.start_file("wp-content/plugin.php", options).unwrap();
            writer.write_all(b"<?php // plugin").unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn zip_extractor_converts_to_a_readable_tar() {
        let extractor = ZipExtractor::new();
        let tar_bytes = extractor.zip_to_tar(sample_zip()).await.unwrap();

        let mut archive = tar::Archive::new(Cursor::new(tar_bytes));
        let entries: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();

        assert!(entries.contains(&"index.php".to_string()));
        assert!(entries.contains(&"wp-content/plugin.php".to_string()));
    }

    #[tokio::test]
    async fn fake_archive_records_input_and_can_be_forced_to_fail() {
        let fake = FakeArchive::new();
        fake.zip_to_tar(vec![1, 2, 3]).await.unwrap();
        assert_eq!(*fake.last_input.lock().unwrap(), Some(vec![1, 2, 3]));

        fake.fail_next();
        assert!(fake.zip_to_tar(vec![]).await.is_err());
    }
}
