use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::credential::PersistedCredential;
use crate::{CredentialStore, StoreError};

/// File-backed credential store.
///
/// Writes go to a temporary file in the blob's directory which is then
/// renamed over the blob, so a crash mid-write never leaves a torn
/// credential behind.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FileCredentialStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn path_string(&self) -> String {
        self.path.display().to_string()
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<PersistedCredential>, StoreError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(
                    "Device credential file {} does not exist",
                    self.path.display()
                );
                return Ok(None);
            }
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.path_string(),
                    source: e,
                })
            }
        };
        if contents.is_empty() {
            log::debug!("Device credential file {} is empty", self.path.display());
            return Ok(None);
        }
        let persisted =
            serde_cbor::from_slice(&contents).map_err(|e| StoreError::Parse {
                path: self.path_string(),
                source: e,
            })?;
        Ok(Some(persisted))
    }

    fn save(&self, credential: &PersistedCredential) -> Result<(), StoreError> {
        let contents = serde_cbor::to_vec(credential).map_err(StoreError::Serialize)?;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::Builder::new()
            .prefix("fdo_cred_")
            .tempfile_in(parent)
            .map_err(|e| StoreError::Write {
                path: self.path_string(),
                source: e,
            })?;
        tmp.write_all(&contents).map_err(|e| StoreError::Write {
            path: self.path_string(),
            source: e,
        })?;
        tmp.persist(&self.path).map_err(|e| StoreError::Write {
            path: self.path_string(),
            source: e.error,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rvinfo::{RendezvousInfo, RvDirectiveInfo, TransportProtocol};
    use crate::{DeviceCredential, DeviceState};

    fn test_credential() -> PersistedCredential {
        PersistedCredential {
            credential: DeviceCredential {
                active: true,
                guid: uuid::Uuid::new_v4(),
                device_info: "test-device".to_string(),
                rendezvous_info: RendezvousInfo(vec![RvDirectiveInfo {
                    protocol: TransportProtocol::Http,
                    dns_name: Some("rv.example.com".to_string()),
                    ip_addresses: vec![],
                    port: 8041,
                    delay_secs: 30,
                    bypass: false,
                }]),
                manufacturer_pubkey_hash: vec![0xAB; 32],
                private_key_der: vec![0x30, 0x82],
                hmac_secret: vec![0x11; 32],
            },
            state: DeviceState::PreTo1,
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("cred.bin"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cred.bin");
        fs::write(&path, b"").unwrap();
        let store = FileCredentialStore::new(path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cred.bin");
        fs::write(&path, b"not cbor at all").unwrap();
        let store = FileCredentialStore::new(path);
        assert!(matches!(store.load(), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("cred.bin"));
        let persisted = test_credential();
        store.save(&persisted).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.credential.guid, persisted.credential.guid);
        assert_eq!(loaded.credential.device_info, "test-device");
        assert_eq!(loaded.state, DeviceState::PreTo1);
        assert_eq!(
            loaded.credential.rendezvous_info.directives()[0].delay_secs,
            30
        );
    }

    #[test]
    fn test_save_replaces_existing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("cred.bin"));
        let mut persisted = test_credential();
        store.save(&persisted).unwrap();

        persisted.state = DeviceState::Idle;
        store.save(&persisted).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.state, DeviceState::Idle);

        // No temp files may be left behind in the blob directory.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n.to_string_lossy().starts_with("fdo_cred_"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
