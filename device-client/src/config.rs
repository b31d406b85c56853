//! Configuration layering for the client commands: defaults, then the
//! optional YAML config file, then CLI flags, with the CLI winning.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use fdo_client_util::upload_access::UploadAccessList;
use fdo_onboard_core::{CipherSuite, KexSuite, OnboardConfig};

/// Key types supported for the device credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Ec256,
    Ec384,
    Rsa2048,
    Rsa3072,
}

impl KeyType {
    pub fn name(&self) -> &'static str {
        match self {
            KeyType::Ec256 => "ec256",
            KeyType::Ec384 => "ec384",
            KeyType::Rsa2048 => "rsa2048",
            KeyType::Rsa3072 => "rsa3072",
        }
    }
}

impl FromStr for KeyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ec256" => Ok(KeyType::Ec256),
            "ec384" => Ok(KeyType::Ec384),
            "rsa2048" => Ok(KeyType::Rsa2048),
            "rsa3072" => Ok(KeyType::Rsa3072),
            other => Err(anyhow!(
                "invalid --key type: '{}' [options: ec256, ec384, rsa2048, rsa3072]",
                other
            )),
        }
    }
}

/// Public key encodings for the manufacturer key in DI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    X509,
    X5Chain,
    Cose,
}

impl FromStr for KeyEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "x509" => Ok(KeyEncoding::X509),
            "x5chain" => Ok(KeyEncoding::X5Chain),
            "cose" => Ok(KeyEncoding::Cose),
            other => Err(anyhow!("invalid DI key encoding: {}", other)),
        }
    }
}

/// The config file as deserialized from YAML. All fields optional;
/// the merge step applies defaults and CLI overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub blob: Option<PathBuf>,
    pub debug: Option<bool>,
    pub key: Option<String>,
    #[serde(rename = "device-init", default)]
    pub device_init: DeviceInitFileConfig,
    #[serde(default)]
    pub onboard: OnboardFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceInitFileConfig {
    #[serde(rename = "server-url")]
    pub server_url: Option<String>,
    #[serde(rename = "key-enc")]
    pub key_enc: Option<String>,
    #[serde(rename = "device-info")]
    pub device_info: Option<String>,
    #[serde(rename = "device-info-mac")]
    pub device_info_mac: Option<String>,
    #[serde(rename = "insecure-tls")]
    pub insecure_tls: Option<bool>,
    #[serde(rename = "serial-number")]
    pub serial_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnboardFileConfig {
    pub kex: Option<String>,
    pub cipher: Option<String>,
    pub download: Option<PathBuf>,
    #[serde(rename = "insecure-tls")]
    pub insecure_tls: Option<bool>,
    #[serde(rename = "max-serviceinfo-size")]
    pub max_serviceinfo_size: Option<u32>,
    #[serde(rename = "allow-credential-reuse")]
    pub allow_credential_reuse: Option<bool>,
    pub resale: Option<bool>,
    #[serde(rename = "to2-retry-delay")]
    pub to2_retry_delay: Option<u64>,
    #[serde(default)]
    pub upload: Vec<String>,
    #[serde(rename = "wget-dir")]
    pub wget_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(FileConfig::default()),
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {:?}", path))?;
                serde_yaml::from_str(&contents)
                    .with_context(|| format!("failed to parse config file {:?}", path))
            }
        }
    }
}

/// Global settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub blob: PathBuf,
    pub debug: bool,
    pub key: Option<KeyType>,
}

impl GlobalConfig {
    pub fn merge(
        file: &FileConfig,
        blob: Option<PathBuf>,
        debug: bool,
        key: Option<String>,
    ) -> Result<Self> {
        let blob = blob
            .or_else(|| file.blob.clone())
            .ok_or_else(|| anyhow!("--blob must be specified (via CLI or config file)"))?;
        let key = match key.or_else(|| file.key.clone()) {
            Some(key) => Some(key.parse()?),
            None => None,
        };
        Ok(GlobalConfig {
            blob,
            debug: debug || file.debug.unwrap_or(false),
            key,
        })
    }
}

/// Resolved device-init settings.
#[derive(Debug, Clone)]
pub struct DeviceInitConfig {
    pub server_url: String,
    pub key: KeyType,
    pub key_enc: KeyEncoding,
    pub device_info: Option<String>,
    pub device_info_mac: Option<String>,
    pub insecure_tls: bool,
    pub serial_number: Option<String>,
}

pub struct DeviceInitCliArgs {
    pub server_url: Option<String>,
    pub key_enc: Option<String>,
    pub device_info: Option<String>,
    pub device_info_mac: Option<String>,
    pub insecure_tls: bool,
    pub serial_number: Option<String>,
}

impl DeviceInitConfig {
    pub fn merge(global: &GlobalConfig, file: &FileConfig, cli: DeviceInitCliArgs) -> Result<Self> {
        let server_url = cli
            .server_url
            .or_else(|| file.device_init.server_url.clone())
            .ok_or_else(|| {
                anyhow!("server-url is required (via positional argument, or config file)")
            })?;
        let key = global
            .key
            .ok_or_else(|| anyhow!("--key is required (via CLI flag or config file)"))?;
        let key_enc = cli
            .key_enc
            .or_else(|| file.device_init.key_enc.clone())
            .unwrap_or_else(|| "x509".to_string())
            .parse()?;

        let config = DeviceInitConfig {
            server_url,
            key,
            key_enc,
            device_info: cli.device_info.or_else(|| file.device_init.device_info.clone()),
            device_info_mac: cli
                .device_info_mac
                .or_else(|| file.device_init.device_info_mac.clone()),
            insecure_tls: cli.insecure_tls || file.device_init.insecure_tls.unwrap_or(false),
            serial_number: cli
                .serial_number
                .or_else(|| file.device_init.serial_number.clone()),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.device_info.is_some() && self.device_info_mac.is_some() {
            bail!("can't specify both --device-info and --device-info-mac");
        }
        let parsed = url::Url::parse(&self.server_url)
            .map_err(|_| anyhow!("invalid DI URL: {}", self.server_url))?;
        if parsed.host_str().is_none() {
            bail!("invalid DI URL: {}", self.server_url);
        }
        Ok(())
    }
}

/// Resolved onboard settings: the transfer-loop configuration plus
/// the service info module wiring.
#[derive(Debug)]
pub struct OnboardCommandConfig {
    pub onboard: OnboardConfig,
    pub fsim: FsimConfig,
}

/// Service info module (FSIM) wiring from CLI/config.
#[derive(Debug, Default, Clone)]
pub struct FsimConfig {
    /// Overrides the owner-chosen destination for fdo.download.
    pub download_dir: Option<PathBuf>,
    /// Overrides the owner-chosen destination for fdo.wget.
    pub wget_dir: Option<PathBuf>,
    /// Files and directories the owner may read via fdo.upload.
    pub uploads: UploadAccessList,
}

pub struct OnboardCliArgs {
    pub kex: Option<String>,
    pub cipher: Option<String>,
    pub download: Option<PathBuf>,
    pub insecure_tls: bool,
    pub max_serviceinfo_size: Option<u32>,
    pub allow_credential_reuse: bool,
    pub resale: bool,
    pub to2_retry_delay: Option<u64>,
    pub upload: Vec<String>,
    pub wget_dir: Option<PathBuf>,
}

impl OnboardCommandConfig {
    pub fn merge(file: &FileConfig, cli: OnboardCliArgs) -> Result<Self> {
        let cipher: CipherSuite = cli
            .cipher
            .or_else(|| file.onboard.cipher.clone())
            .unwrap_or_else(|| "A128GCM".to_string())
            .parse()?;
        let kex: KexSuite = cli
            .kex
            .or_else(|| file.onboard.kex.clone())
            .ok_or_else(|| anyhow!("--kex is required (via CLI flag or config file)"))?
            .parse()?;

        let max_serviceinfo_size = cli
            .max_serviceinfo_size
            .or(file.onboard.max_serviceinfo_size)
            .unwrap_or(1300);
        if max_serviceinfo_size > u32::from(u16::MAX) {
            bail!("max-serviceinfo-size must be between 0 and {}", u16::MAX);
        }

        let download_dir = cli.download.or_else(|| file.onboard.download.clone());
        if let Some(dir) = &download_dir {
            if !dir.exists() {
                bail!("invalid download directory: {}", dir.display());
            }
        }
        let wget_dir = cli.wget_dir.or_else(|| file.onboard.wget_dir.clone());
        if let Some(dir) = &wget_dir {
            if !dir.exists() {
                bail!("invalid wget directory: {}", dir.display());
            }
        }

        let mut uploads = UploadAccessList::new();
        for paths in cli.upload.iter().chain(file.onboard.upload.iter()) {
            for path in paths.split(',') {
                if !Path::new(path).exists() {
                    bail!("file doesn't exist: {}", path);
                }
            }
            uploads.insert(paths)?;
        }
        // No restrictions given: the owner may read any file the
        // client process can.
        if uploads.is_empty() {
            uploads.allow_all();
        }

        let to2_retry_delay = cli
            .to2_retry_delay
            .or(file.onboard.to2_retry_delay)
            .unwrap_or(0);

        Ok(OnboardCommandConfig {
            onboard: OnboardConfig {
                cipher_suite: cipher,
                kex_suite: kex,
                max_serviceinfo_size: max_serviceinfo_size as u16,
                allow_credential_reuse: cli.allow_credential_reuse
                    || file.onboard.allow_credential_reuse.unwrap_or(false),
                to2_retry_delay: Duration::from_secs(to2_retry_delay),
                insecure_tls: cli.insecure_tls || file.onboard.insecure_tls.unwrap_or(false),
                resale: cli.resale || file.onboard.resale.unwrap_or(false),
            },
            fsim: FsimConfig {
                download_dir,
                wget_dir,
                uploads,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn onboard_cli_defaults() -> OnboardCliArgs {
        OnboardCliArgs {
            kex: None,
            cipher: None,
            download: None,
            insecure_tls: false,
            max_serviceinfo_size: None,
            allow_credential_reuse: false,
            resale: false,
            to2_retry_delay: None,
            upload: vec![],
            wget_dir: None,
        }
    }

    #[test]
    fn test_file_config_parse() {
        let yaml = r#"
blob: /var/lib/fdo/cred.bin
key: ec256
onboard:
  kex: ECDH256
  cipher: A256GCM
  to2-retry-delay: 3
device-init:
  server-url: http://mfg.example.com:8038
  serial-number: ABC123
"#;
        let config: FileConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.blob, Some(PathBuf::from("/var/lib/fdo/cred.bin")));
        assert_eq!(config.onboard.kex.as_deref(), Some("ECDH256"));
        assert_eq!(config.onboard.to2_retry_delay, Some(3));
        assert_eq!(
            config.device_init.server_url.as_deref(),
            Some("http://mfg.example.com:8038")
        );
    }

    #[test]
    fn test_unknown_config_keys_rejected() {
        assert!(serde_yaml::from_str::<FileConfig>("blobb: /x\n").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: FileConfig = serde_yaml::from_str("blob: /from/file\nkey: ec256\n").unwrap();
        let global = GlobalConfig::merge(
            &file,
            Some(PathBuf::from("/from/cli")),
            false,
            Some("rsa2048".to_string()),
        )
        .unwrap();
        assert_eq!(global.blob, PathBuf::from("/from/cli"));
        assert_eq!(global.key, Some(KeyType::Rsa2048));
    }

    #[test]
    fn test_file_fills_missing_cli() {
        let file: FileConfig = serde_yaml::from_str("blob: /from/file\ndebug: true\n").unwrap();
        let global = GlobalConfig::merge(&file, None, false, None).unwrap();
        assert_eq!(global.blob, PathBuf::from("/from/file"));
        assert!(global.debug);
        assert!(global.key.is_none());
    }

    #[test]
    fn test_blob_required() {
        assert!(GlobalConfig::merge(&FileConfig::default(), None, false, None).is_err());
    }

    #[test]
    fn test_onboard_requires_kex() {
        let err = OnboardCommandConfig::merge(&FileConfig::default(), onboard_cli_defaults())
            .unwrap_err();
        assert!(err.to_string().contains("--kex is required"));
    }

    #[test]
    fn test_onboard_invalid_cipher_rejected() {
        let mut cli = onboard_cli_defaults();
        cli.kex = Some("ECDH384".to_string());
        cli.cipher = Some("ROT13".to_string());
        assert!(OnboardCommandConfig::merge(&FileConfig::default(), cli).is_err());
    }

    #[test]
    fn test_onboard_defaults_and_upload_sentinel() {
        let mut cli = onboard_cli_defaults();
        cli.kex = Some("ECDH384".to_string());
        let config = OnboardCommandConfig::merge(&FileConfig::default(), cli).unwrap();
        assert_eq!(config.onboard.cipher_suite, CipherSuite::A128Gcm);
        assert_eq!(config.onboard.max_serviceinfo_size, 1300);
        assert_eq!(config.onboard.to2_retry_delay, Duration::ZERO);
        // Without restrictions, uploads resolve anywhere.
        assert!(config.fsim.uploads.resolve("etc/hostname").is_some());
    }

    #[test]
    fn test_onboard_missing_upload_path_rejected() {
        let mut cli = onboard_cli_defaults();
        cli.kex = Some("ECDH384".to_string());
        cli.upload = vec!["/does/not/exist/anywhere".to_string()];
        let err = OnboardCommandConfig::merge(&FileConfig::default(), cli).unwrap_err();
        assert!(err.to_string().contains("doesn't exist"));
    }

    #[test]
    fn test_device_init_validation() {
        let file = FileConfig::default();
        let global = GlobalConfig {
            blob: PathBuf::from("/tmp/cred.bin"),
            debug: false,
            key: Some(KeyType::Ec256),
        };
        let cli = DeviceInitCliArgs {
            server_url: Some("http://mfg.example.com:8038".to_string()),
            key_enc: None,
            device_info: Some("dev".to_string()),
            device_info_mac: Some("eth0".to_string()),
            insecure_tls: false,
            serial_number: None,
        };
        let err = DeviceInitConfig::merge(&global, &file, cli).unwrap_err();
        assert!(err
            .to_string()
            .contains("can't specify both --device-info and --device-info-mac"));
    }

    #[test]
    fn test_device_init_bad_url_rejected() {
        let file = FileConfig::default();
        let global = GlobalConfig {
            blob: PathBuf::from("/tmp/cred.bin"),
            debug: false,
            key: Some(KeyType::Ec256),
        };
        let cli = DeviceInitCliArgs {
            server_url: Some("not-a-url".to_string()),
            key_enc: None,
            device_info: None,
            device_info_mac: None,
            insecure_tls: false,
            serial_number: Some("ABC".to_string()),
        };
        assert!(DeviceInitConfig::merge(&global, &file, cli).is_err());
    }
}
