//! Dataset download and extraction.
//!
//! The source is a fixed remote location serving the zipped sales CSV. The
//! download is skipped when the extracted file is already on disk, so
//! re-runs never touch the network.
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub const DATASET_FILE: &str = "10000 Sales Records.csv";
pub const DATASET_URL_KEY: &str = "SALESFLOW_DATASET_URL";

const DEFAULT_DATASET_URL: &str =
    "https://excelbianalytics.com/wp/wp-content/uploads/2017/07/10000-Sales-Records.zip";

// Some dataset hosts reject non-browser clients.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";

/// Source URL, honoring the override key.
pub fn dataset_url() -> String {
    std::env::var(DATASET_URL_KEY).unwrap_or_else(|_| DEFAULT_DATASET_URL.to_string())
}

/// Make sure the extracted dataset exists under `data_dir` and return its
/// path. Downloads and extracts only when the file is absent; the archive is
/// never written to disk.
pub fn ensure_dataset(data_dir: &Path, url: &str) -> Result<PathBuf> {
    let target = data_dir.join(DATASET_FILE);
    if target.exists() {
        tracing::info!("dataset already downloaded at {}", target.display());
        return Ok(target);
    }

    fs::create_dir_all(data_dir)
        .with_context(|| format!("create data dir {}", data_dir.display()))?;

    tracing::info!("downloading dataset from {url}");
    let mut response = ureq::get(url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", ACCEPT)
        .header("Accept-Language", "en-US,en;q=0.9")
        .call()
        .context("download dataset")?;
    let mut body = response.body_mut().as_reader();

    if url.ends_with(".zip") {
        // Zip extraction needs a seekable source.
        let mut archive = Vec::new();
        body.read_to_end(&mut archive).context("read dataset archive")?;
        extract_zip_csv(&archive, &target)?;
    } else {
        let mut out = fs::File::create(&target)
            .with_context(|| format!("create {}", target.display()))?;
        if url.ends_with(".gz") {
            let mut decoder = flate2::read::GzDecoder::new(&mut body);
            io::copy(&mut decoder, &mut out).context("decompress dataset")?;
        } else {
            io::copy(&mut body, &mut out).context("write dataset")?;
        }
    }

    tracing::info!("dataset extracted to {}", target.display());
    Ok(target)
}

/// Extract the first `.csv` entry of the archive to `target`.
fn extract_zip_csv(archive: &[u8], target: &Path) -> Result<()> {
    let mut archive =
        zip::ZipArchive::new(io::Cursor::new(archive)).context("open dataset archive")?;
    let index = (0..archive.len())
        .find(|&index| {
            archive
                .by_index(index)
                .map(|entry| entry.name().ends_with(".csv"))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("dataset archive contains no csv entry"))?;
    let mut entry = archive
        .by_index(index)
        .context("read dataset archive entry")?;
    let mut out =
        fs::File::create(target).with_context(|| format!("create {}", target.display()))?;
    io::copy(&mut entry, &mut out).context("extract dataset")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn zipped_csv(name: &str, content: &[u8]) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut writer = zip::ZipWriter::new(io::Cursor::new(&mut buffer));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file(name, options).expect("start zip entry");
        writer.write_all(content).expect("write zip entry");
        writer.finish().expect("finish zip archive");
        buffer
    }

    #[test]
    fn existing_dataset_skips_the_download() {
        let dir = tempdir().expect("create temp dir");
        let target = dir.path().join(DATASET_FILE);
        fs::write(&target, "Region,Country\n").expect("seed dataset");

        // An unreachable URL proves no network round trip happens.
        let path = ensure_dataset(dir.path(), "http://invalid.invalid/sales.zip")
            .expect("skip download");
        assert_eq!(path, target);
    }

    #[test]
    fn zip_extraction_pulls_the_csv_entry() {
        let dir = tempdir().expect("create temp dir");
        let target = dir.path().join(DATASET_FILE);
        let archive = zipped_csv("10000 Sales Records.csv", b"Region,Country\nAsia,Japan\n");

        extract_zip_csv(&archive, &target).expect("extract archive");
        let written = fs::read_to_string(&target).expect("read extracted csv");
        assert_eq!(written, "Region,Country\nAsia,Japan\n");
    }

    #[test]
    fn archive_without_a_csv_entry_is_rejected() {
        let dir = tempdir().expect("create temp dir");
        let target = dir.path().join(DATASET_FILE);
        let archive = zipped_csv("readme.txt", b"not the dataset");

        let err = extract_zip_csv(&archive, &target).expect_err("no csv entry");
        assert!(err.to_string().contains("no csv entry"), "{err:#}");
    }

    #[test]
    fn default_url_points_at_the_zipped_dataset() {
        assert!(DEFAULT_DATASET_URL.ends_with("10000-Sales-Records.zip"));
    }
}
