//! Service info exchange (TO2 messages 68/69) and the device-side
//! service modules: devmod, fdo.download, fdo.upload, fdo.wget and
//! fdo.command.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde_cbor::Value;

use fdo_client_util::device_info::DevmodInfo;
use fdo_http_client::ServiceClient;

use crate::config::FsimConfig;
use crate::wire::{
    DeviceServiceInfo, OwnerServiceInfo, TO2_DEVICE_SERVICE_INFO, TO2_OWNER_SERVICE_INFO,
};

const MAX_SERVICE_INFO_LOOPS: u32 = 1000;

const MODULES: &[&str] = &["fdo.download", "fdo.upload", "fdo.wget", "fdo.command"];

/// Runs the service info loop: devmod first, then owner instructions
/// until the owner signals done.
pub async fn exchange(
    client: &mut ServiceClient,
    devmod: &DevmodInfo,
    fsim: &FsimConfig,
) -> Result<()> {
    let mut state = FsimState::new(fsim);
    let mut pending = devmod_entries(devmod);

    for _ in 0..MAX_SERVICE_INFO_LOOPS {
        let message = DeviceServiceInfo {
            more: false,
            service_info: std::mem::take(&mut pending),
        };
        let body = serde_cbor::to_vec(&message).context("error encoding DeviceServiceInfo")?;
        let response = client
            .send_request(TO2_DEVICE_SERVICE_INFO, body, TO2_OWNER_SERVICE_INFO)
            .await
            .context("error sending DeviceServiceInfo")?;
        let owner: OwnerServiceInfo =
            serde_cbor::from_slice(&response).context("error parsing OwnerServiceInfo")?;

        for (key, value) in &owner.service_info {
            pending.extend(state.process(key, value).await?);
        }

        if owner.more {
            log::trace!("Owner has more service info queued");
        }
        if owner.done && pending.is_empty() {
            return Ok(());
        }
    }
    bail!("service info exchange did not terminate");
}

/// The devmod module output: device description plus the module list.
fn devmod_entries(devmod: &DevmodInfo) -> Vec<(String, Value)> {
    let mut entries = vec![
        ("devmod:active".to_string(), Value::Bool(true)),
        ("devmod:os".to_string(), Value::Text(devmod.os.clone())),
        ("devmod:arch".to_string(), Value::Text(devmod.arch.clone())),
        (
            "devmod:version".to_string(),
            Value::Text(devmod.version.clone()),
        ),
        (
            "devmod:device".to_string(),
            Value::Text(devmod.device.clone()),
        ),
        (
            "devmod:sep".to_string(),
            Value::Text(devmod.file_sep.clone()),
        ),
        ("devmod:bin".to_string(), Value::Text(devmod.bin.clone())),
        (
            "devmod:nummodules".to_string(),
            Value::Integer(MODULES.len() as i128),
        ),
    ];
    entries.push((
        "devmod:modules".to_string(),
        Value::Array(
            MODULES
                .iter()
                .map(|m| Value::Text((*m).to_string()))
                .collect(),
        ),
    ));
    entries
}

/// A file transfer the owner is streaming to the device.
#[derive(Debug, Default)]
struct DownloadInProgress {
    name: Option<String>,
    length: Option<u64>,
    contents: Vec<u8>,
}

#[derive(Debug, Default)]
struct WgetInProgress {
    name: Option<String>,
}

struct FsimState<'a> {
    fsim: &'a FsimConfig,
    download: DownloadInProgress,
    wget: WgetInProgress,
    command: Option<String>,
}

impl<'a> FsimState<'a> {
    fn new(fsim: &'a FsimConfig) -> Self {
        FsimState {
            fsim,
            download: DownloadInProgress::default(),
            wget: WgetInProgress::default(),
            command: None,
        }
    }

    /// Handles one owner service info entry, returning the replies to
    /// queue for the next device message.
    async fn process(&mut self, key: &str, value: &Value) -> Result<Vec<(String, Value)>> {
        log::trace!("Processing owner service info entry {}", key);
        match key {
            "fdo.download:active" | "fdo.upload:active" | "fdo.wget:active"
            | "fdo.command:active" | "devmod:active" => Ok(vec![]),

            "fdo.download:name" => {
                self.download = DownloadInProgress {
                    name: Some(as_text(value)?),
                    ..Default::default()
                };
                Ok(vec![])
            }
            "fdo.download:length" => {
                self.download.length = Some(as_u64(value)?);
                Ok(vec![])
            }
            "fdo.download:sha-384" => Ok(vec![]),
            "fdo.download:data" => {
                self.download.contents.extend_from_slice(&as_bytes(value)?);
                if self.download.length.map(|l| self.download.contents.len() as u64 >= l)
                    == Some(true)
                {
                    return self.finish_download();
                }
                Ok(vec![])
            }

            "fdo.upload:name" => self.serve_upload(&as_text(value)?),

            "fdo.wget:name" => {
                self.wget.name = Some(as_text(value)?);
                Ok(vec![])
            }
            "fdo.wget:url" => self.fetch_wget(&as_text(value)?).await,

            "fdo.command:command" => {
                self.command = Some(as_text(value)?);
                Ok(vec![])
            }
            "fdo.command:execute" => self.run_command(),

            other => {
                log::warn!("Ignoring unknown owner service info entry: {}", other);
                Ok(vec![])
            }
        }
    }

    fn finish_download(&mut self) -> Result<Vec<(String, Value)>> {
        let download = std::mem::take(&mut self.download);
        let name = download
            .name
            .ok_or_else(|| anyhow!("fdo.download data without a name"))?;
        let path = destination_path(&name, self.fsim.download_dir.as_deref());
        std::fs::write(&path, &download.contents)
            .with_context(|| format!("error writing downloaded file {:?}", path))?;
        log::info!(
            "Downloaded file {:?} ({} bytes)",
            path,
            download.contents.len()
        );
        Ok(vec![(
            "fdo.download:done".to_string(),
            Value::Integer(download.contents.len() as i128),
        )])
    }

    fn serve_upload(&self, name: &str) -> Result<Vec<(String, Value)>> {
        let path = match self.fsim.uploads.resolve(name) {
            Some(path) => path,
            None => {
                log::error!("Owner requested upload of disallowed path: {}", name);
                return Ok(vec![(
                    "fdo.upload:done".to_string(),
                    Value::Integer(-1),
                )]);
            }
        };
        let contents = std::fs::read(&path)
            .with_context(|| format!("error reading upload file {:?}", path))?;
        log::info!("Uploading file {:?} ({} bytes)", path, contents.len());
        Ok(vec![
            (
                "fdo.upload:length".to_string(),
                Value::Integer(contents.len() as i128),
            ),
            ("fdo.upload:data".to_string(), Value::Bytes(contents)),
        ])
    }

    async fn fetch_wget(&mut self, url: &str) -> Result<Vec<(String, Value)>> {
        let name = self
            .wget
            .name
            .take()
            .ok_or_else(|| anyhow!("fdo.wget url without a name"))?;
        let response = reqwest::get(url)
            .await
            .with_context(|| format!("error fetching {}", url))?
            .error_for_status()
            .with_context(|| format!("error fetching {}", url))?;
        let contents = response
            .bytes()
            .await
            .with_context(|| format!("error reading body of {}", url))?;
        let path = destination_path(&name, self.fsim.wget_dir.as_deref());
        std::fs::write(&path, &contents)
            .with_context(|| format!("error writing wget file {:?}", path))?;
        log::info!("Fetched {} to {:?} ({} bytes)", url, path, contents.len());
        Ok(vec![(
            "fdo.wget:done".to_string(),
            Value::Integer(contents.len() as i128),
        )])
    }

    fn run_command(&mut self) -> Result<Vec<(String, Value)>> {
        let command = self
            .command
            .take()
            .ok_or_else(|| anyhow!("fdo.command execute without a command"))?;
        log::info!("Executing owner command: {}", command);
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .status()
            .with_context(|| format!("error spawning command {:?}", command))?;
        let exit_code = status.code().unwrap_or(-1);
        Ok(vec![(
            "fdo.command:exit_code".to_string(),
            Value::Integer(exit_code.into()),
        )])
    }
}

/// Where to place an owner-named file. With an override directory the
/// owner only controls the basename; otherwise its (cleaned) name is
/// used relative to the working directory.
fn destination_path(name: &str, override_dir: Option<&Path>) -> PathBuf {
    let base = Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download"));
    match override_dir {
        Some(dir) => dir.join(base),
        None => base,
    }
}

fn as_text(value: &Value) -> Result<String> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        other => bail!("expected text value, got {:?}", other),
    }
}

fn as_u64(value: &Value) -> Result<u64> {
    match value {
        Value::Integer(i) if *i >= 0 => Ok(*i as u64),
        other => bail!("expected unsigned integer value, got {:?}", other),
    }
}

fn as_bytes(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Bytes(b) => Ok(b.clone()),
        other => bail!("expected byte string value, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdo_client_util::upload_access::UploadAccessList;

    fn fsim_with_dirs(download_dir: Option<PathBuf>) -> FsimConfig {
        let mut uploads = UploadAccessList::new();
        uploads.allow_all();
        FsimConfig {
            download_dir,
            wget_dir: None,
            uploads,
        }
    }

    #[test]
    fn test_devmod_entries_shape() {
        let devmod = DevmodInfo {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            version: "Fedora Linux 40".to_string(),
            device: "test-box".to_string(),
            file_sep: ";".to_string(),
            bin: "x86_64".to_string(),
        };
        let entries = devmod_entries(&devmod);
        assert_eq!(entries[0].0, "devmod:active");
        assert_eq!(entries[0].1, Value::Bool(true));
        assert!(entries.iter().any(|(k, _)| k == "devmod:modules"));
    }

    #[tokio::test]
    async fn test_download_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let fsim = fsim_with_dirs(Some(dir.path().to_path_buf()));
        let mut state = FsimState::new(&fsim);

        assert!(state
            .process("fdo.download:name", &Value::Text("payload.bin".to_string()))
            .await
            .unwrap()
            .is_empty());
        assert!(state
            .process("fdo.download:length", &Value::Integer(6))
            .await
            .unwrap()
            .is_empty());
        assert!(state
            .process("fdo.download:data", &Value::Bytes(b"abc".to_vec()))
            .await
            .unwrap()
            .is_empty());
        let replies = state
            .process("fdo.download:data", &Value::Bytes(b"def".to_vec()))
            .await
            .unwrap();
        assert_eq!(replies, vec![("fdo.download:done".to_string(), Value::Integer(6))]);
        assert_eq!(
            std::fs::read(dir.path().join("payload.bin")).unwrap(),
            b"abcdef"
        );
    }

    #[tokio::test]
    async fn test_upload_allowed_and_refused() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.txt");
        std::fs::write(&file, b"contents").unwrap();

        let mut uploads = UploadAccessList::new();
        uploads.insert(file.to_str().unwrap()).unwrap();
        let fsim = FsimConfig {
            download_dir: None,
            wget_dir: None,
            uploads,
        };
        let mut state = FsimState::new(&fsim);

        let allowed = file.to_str().unwrap().trim_start_matches('/').to_string();
        let replies = state
            .process("fdo.upload:name", &Value::Text(allowed))
            .await
            .unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[1].1, Value::Bytes(b"contents".to_vec()));

        let refused = state
            .process("fdo.upload:name", &Value::Text("etc/shadow".to_string()))
            .await
            .unwrap();
        assert_eq!(refused, vec![("fdo.upload:done".to_string(), Value::Integer(-1))]);
    }

    #[tokio::test]
    async fn test_command_exit_code() {
        let fsim = fsim_with_dirs(None);
        let mut state = FsimState::new(&fsim);
        assert!(state
            .process("fdo.command:command", &Value::Text("exit 7".to_string()))
            .await
            .unwrap()
            .is_empty());
        let replies = state
            .process("fdo.command:execute", &Value::Null)
            .await
            .unwrap();
        assert_eq!(replies, vec![("fdo.command:exit_code".to_string(), Value::Integer(7))]);
    }

    #[test]
    fn test_destination_path_override_strips_dirs() {
        assert_eq!(
            destination_path("../../etc/passwd", Some(Path::new("/downloads"))),
            PathBuf::from("/downloads/passwd")
        );
        assert_eq!(destination_path("file.txt", None), PathBuf::from("file.txt"));
    }
}
