//! Download of the published ensemble data from a Zenodo record.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::settings::DownloadSettings;

/// One file listed in a record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordFile {
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
    pub links: RecordFileLinks,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordFileLinks {
    #[serde(rename = "self")]
    pub download: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordMetadata {
    pub files: Vec<RecordFile>,
}

/// Access to a remote data record.
pub trait RecordClient {
    fn fetch_metadata(&self, record_id: &str) -> AppResult<RecordMetadata>;

    /// Download `file` into `dir` and return the written path.
    fn download(&self, file: &RecordFile, dir: &Path) -> AppResult<PathBuf>;
}

/// Files of `metadata` to download: all of them, or only `target`.
pub fn select_files(
    record_id: &str,
    metadata: &RecordMetadata,
    target: Option<&str>,
) -> AppResult<Vec<RecordFile>> {
    let Some(target) = target else {
        return Ok(metadata.files.clone());
    };
    let selected: Vec<RecordFile> = metadata
        .files
        .iter()
        .filter(|f| f.key == target)
        .cloned()
        .collect();
    if selected.is_empty() {
        return Err(AppError::FileNotInRecord {
            record: record_id.to_string(),
            file: target.to_string(),
            available: metadata.files.iter().map(|f| f.key.clone()).collect(),
        });
    }
    Ok(selected)
}

/// Download the configured record files into the download directory.
pub fn download_record<C: RecordClient>(
    client: &C,
    settings: &DownloadSettings,
) -> AppResult<Vec<PathBuf>> {
    info!(record = %settings.record_id, "fetching record metadata");
    let metadata = client.fetch_metadata(&settings.record_id)?;
    let files = select_files(
        &settings.record_id,
        &metadata,
        settings.target_file.as_deref(),
    )?;
    info!(files = files.len(), "found file(s) to download");

    fs::create_dir_all(&settings.download_dir)?;
    files
        .iter()
        .map(|file| client.download(file, &settings.download_dir))
        .collect()
}

/// [`RecordClient`] for the Zenodo REST API.
pub struct ZenodoClient {
    api_base: String,
    attempts: u32,
    http: reqwest::blocking::Client,
}

impl ZenodoClient {
    pub fn new(settings: &DownloadSettings) -> AppResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_s))
            .build()?;
        Ok(Self {
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            attempts: settings.attempts.max(1),
            http,
        })
    }

    fn download_once(&self, file: &RecordFile, path: &Path) -> AppResult<u64> {
        let mut response = self.http.get(&file.links.download).send()?.error_for_status()?;
        let out = fs::File::create(path)?;
        let mut writer = BufWriter::new(out);
        let bytes = response.copy_to(&mut writer)?;
        writer.flush()?;
        Ok(bytes)
    }
}

impl RecordClient for ZenodoClient {
    fn fetch_metadata(&self, record_id: &str) -> AppResult<RecordMetadata> {
        let url = format!("{}/{}", self.api_base, record_id);
        let metadata = self
            .http
            .get(&url)
            .send()?
            .error_for_status()?
            .json::<RecordMetadata>()?;
        Ok(metadata)
    }

    fn download(&self, file: &RecordFile, dir: &Path) -> AppResult<PathBuf> {
        let path = dir.join(&file.key);
        let mut last_error = None;
        for attempt in 1..=self.attempts {
            info!(file = %file.key, attempt, "downloading");
            match self.download_once(file, &path) {
                Ok(bytes) => {
                    info!(file = %file.key, bytes, path = %path.display(), "download complete");
                    return Ok(path);
                }
                Err(e) => {
                    warn!(file = %file.key, attempt, error = %e, "download attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| AppError::Download(format!("no attempt made for {}", file.key))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const RECORD_JSON: &str = r#"{
        "id": 15101164,
        "files": [
            {"key": "README.md", "size": 120, "links": {"self": "https://example.org/f/README.md"}},
            {"key": "drb_historic_streamflow_ensemble_data.zip", "size": 9000,
             "links": {"self": "https://example.org/f/data.zip"}}
        ]
    }"#;

    fn metadata() -> RecordMetadata {
        serde_json::from_str(RECORD_JSON).unwrap()
    }

    #[test]
    fn metadata_parses_zenodo_layout() {
        let m = metadata();
        assert_eq!(m.files.len(), 2);
        assert_eq!(m.files[1].links.download, "https://example.org/f/data.zip");
        assert_eq!(m.files[0].size, Some(120));
    }

    #[test]
    fn select_all_or_one() {
        let m = metadata();
        assert_eq!(select_files("1", &m, None).unwrap().len(), 2);
        let one = select_files("1", &m, Some("drb_historic_streamflow_ensemble_data.zip")).unwrap();
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn missing_target_lists_available_files() {
        let err = select_files("1", &metadata(), Some("other.zip")).unwrap_err();
        match err {
            AppError::FileNotInRecord { available, .. } => {
                assert_eq!(
                    available,
                    ["README.md", "drb_historic_streamflow_ensemble_data.zip"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct FakeClient {
        downloaded: RefCell<Vec<String>>,
    }

    impl RecordClient for FakeClient {
        fn fetch_metadata(&self, _record_id: &str) -> AppResult<RecordMetadata> {
            Ok(metadata())
        }

        fn download(&self, file: &RecordFile, dir: &Path) -> AppResult<PathBuf> {
            self.downloaded.borrow_mut().push(file.key.clone());
            Ok(dir.join(&file.key))
        }
    }

    #[test]
    fn download_record_fetches_only_the_target() {
        let dir = std::env::temp_dir().join(format!("ef_app_download_{}", std::process::id()));
        let settings = DownloadSettings {
            download_dir: dir.clone(),
            ..DownloadSettings::default()
        };
        let client = FakeClient {
            downloaded: RefCell::new(Vec::new()),
        };
        let paths = download_record(&client, &settings).unwrap();

        assert_eq!(paths, [dir.join("drb_historic_streamflow_ensemble_data.zip")]);
        assert_eq!(
            *client.downloaded.borrow(),
            ["drb_historic_streamflow_ensemble_data.zip"]
        );
        let _ = fs::remove_dir_all(&dir);
    }
}
