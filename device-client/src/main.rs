//! FIDO Device Onboard client: device initialization, TO1/TO2
//! onboarding, and credential inspection.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use fdo_credential_store::{DeviceState, FileCredentialStore};

mod config;
mod credential;
mod device_init;
mod onboard;
mod protocol;
mod serviceinfo;
mod wire;

use config::{
    DeviceInitCliArgs, DeviceInitConfig, FileConfig, GlobalConfig, OnboardCliArgs,
    OnboardCommandConfig,
};

#[derive(Parser)]
#[command(name = "fdo-device-client", about = "FIDO Device Onboard Client", version)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// File path of device credential blob
    #[arg(long, global = true)]
    blob: Option<PathBuf>,
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
    /// Key type for device credential [options: ec256, ec384, rsa2048, rsa3072]
    #[arg(long, global = true)]
    key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run device initialization (DI)
    DeviceInit {
        /// Manufacturer server URL
        server_url: Option<String>,
        /// Public key encoding for the manufacturer key [x509, x5chain, cose]
        #[arg(long)]
        key_enc: Option<String>,
        /// Device information for device credentials; gathered from
        /// the system when not specified
        #[arg(long)]
        device_info: Option<String>,
        /// Interface whose MAC address becomes the device info, e.g. eth0
        #[arg(long)]
        device_info_mac: Option<String>,
        /// Skip TLS certificate verification
        #[arg(long)]
        insecure_tls: bool,
        /// Serial number for device credentials; gathered from the
        /// system when not specified
        #[arg(long)]
        serial_number: Option<String>,
    },
    /// Run FDO TO1 and TO2 onboarding
    Onboard {
        /// Name of suite to use for key exchange
        #[arg(long)]
        kex: Option<String>,
        /// Name of cipher suite to use for encryption
        #[arg(long)]
        cipher: Option<String>,
        /// fdo.download: override destination directory set by Owner server
        #[arg(long)]
        download: Option<PathBuf>,
        /// Skip TLS certificate verification
        #[arg(long)]
        insecure_tls: bool,
        /// Maximum service info size to receive
        #[arg(long)]
        max_serviceinfo_size: Option<u32>,
        /// Allow credential reuse protocol during onboarding
        #[arg(long)]
        allow_credential_reuse: bool,
        /// Perform resale
        #[arg(long)]
        resale: bool,
        /// Seconds between failed TO2 attempts when trying multiple
        /// Owner URLs from the same RV directive (0=disabled)
        #[arg(long)]
        to2_retry_delay: Option<u64>,
        /// fdo.upload: restrict Owner server upload access to specific
        /// dirs and files, comma-separated and/or given multiple times
        #[arg(long)]
        upload: Vec<String>,
        /// fdo.wget: override destination directory set by Owner server
        #[arg(long)]
        wget_dir: Option<PathBuf>,
    },
    /// Print device credential blob and exit
    Print,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file = FileConfig::load(cli.config.as_deref())?;
    fdo_client_util::init_logging(cli.debug || file.debug.unwrap_or(false));

    let global = GlobalConfig::merge(&file, cli.blob.clone(), cli.debug, cli.key.clone())?;
    let store = FileCredentialStore::new(&global.blob);

    // Interrupts cancel the onboarding loop at its next suspension
    // point rather than killing the process mid-write.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::DeviceInit {
            server_url,
            key_enc,
            device_info,
            device_info_mac,
            insecure_tls,
            serial_number,
        } => {
            let config = DeviceInitConfig::merge(
                &global,
                &file,
                DeviceInitCliArgs {
                    server_url,
                    key_enc,
                    device_info,
                    device_info_mac,
                    insecure_tls,
                    serial_number,
                },
            )
            .context("validation error")?;
            run_device_init(&store, &config).await
        }
        Command::Onboard {
            kex,
            cipher,
            download,
            insecure_tls,
            max_serviceinfo_size,
            allow_credential_reuse,
            resale,
            to2_retry_delay,
            upload,
            wget_dir,
        } => {
            let config = OnboardCommandConfig::merge(
                &file,
                OnboardCliArgs {
                    kex,
                    cipher,
                    download,
                    insecure_tls,
                    max_serviceinfo_size,
                    allow_credential_reuse,
                    resale,
                    to2_retry_delay,
                    upload,
                    wget_dir,
                },
            )
            .context("validation error")?;
            onboard::run(&cancel, &store, config).await
        }
        Command::Print => credential::print_credential(&store),
    }
}

async fn run_device_init(store: &FileCredentialStore, config: &DeviceInitConfig) -> Result<()> {
    let (status, _) = credential::load_device_status(store)?;
    match status {
        DeviceState::PreDi => device_init::run(store, config).await,
        DeviceState::PreTo1 => {
            println!("Device already initialized, ready to onboard");
            Ok(())
        }
        DeviceState::Idle => bail!("device has already completed onboarding"),
        other => bail!("device state is invalid: {}", other),
    }
}
