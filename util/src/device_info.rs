//! Hardware and OS identity for device initialization and the devmod
//! service info module, read from DMI sysfs and os-release.

use std::fs;
use std::io::{self, BufRead};
use std::path::Path;

const OS_INFO_PATH: &str = "/etc/os-release";
const PRODUCT_NAME_PATH: &str = "/sys/devices/virtual/dmi/id/product_name";

const SERIAL_PATHS: &[&str] = &[
    "/sys/devices/virtual/dmi/id/product_serial",
    "/sys/devices/virtual/dmi/id/chassis_serial",
];

/// Reads the system serial number from DMI. Tries the product serial
/// first, then the chassis serial; fails if neither is populated.
pub fn get_serial() -> io::Result<String> {
    for serial_path in SERIAL_PATHS {
        match fs::read_to_string(serial_path) {
            Ok(serial) => {
                let serial = serial.trim();
                if !serial.is_empty() {
                    return Ok(serial.to_string());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                log::error!("opening {:?}: {}", serial_path, e);
            }
            Err(_) => continue,
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        "error determining system serial number for device from dmi",
    ))
}

/// Reads the OS version (PRETTY_NAME from os-release).
pub fn get_os_version() -> io::Result<String> {
    let file = fs::File::open(OS_INFO_PATH)?;
    match parse_pretty_name(io::BufReader::new(file))? {
        Some(pretty_name) => Ok(pretty_name),
        None => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("could not determine OS version from file {}", OS_INFO_PATH),
        )),
    }
}

fn parse_pretty_name<R: BufRead>(reader: R) -> io::Result<Option<String>> {
    for line in reader.lines() {
        let line = line?;
        if let Some(value) = line.strip_prefix("PRETTY_NAME=") {
            let value = value.trim();
            // Strip outer quotes if any.
            let value = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                &value[1..value.len() - 1]
            } else {
                value
            };
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

/// Reads the hardware product name from DMI.
pub fn get_device_name() -> io::Result<String> {
    let name = fs::read_to_string(PRODUCT_NAME_PATH)?;
    Ok(name.trim().to_string())
}

/// Reads the MAC address of a network interface; zeroed addresses are
/// rejected, they identify nothing.
pub fn get_mac(iface: &str) -> io::Result<String> {
    let path = format!("/sys/class/net/{}/address", iface);
    let mac = fs::read_to_string(Path::new(&path))?;
    let mac = mac.trim();
    if mac == "00:00:00:00:00:00" {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("mac address for {} is zero", iface),
        ));
    }
    Ok(mac.to_string())
}

/// Device description fields sent in the devmod service info module
/// during TO2.
#[derive(Debug, Clone)]
pub struct DevmodInfo {
    pub os: String,
    pub arch: String,
    pub version: String,
    pub device: String,
    pub file_sep: String,
    pub bin: String,
}

impl DevmodInfo {
    /// Gathers devmod fields from the running system. Unreadable
    /// fields degrade to a fallback with a warning; they never fail
    /// onboarding.
    pub fn gather() -> Self {
        let version = get_os_version()
            .or_else(|_| sys_info::os_release())
            .unwrap_or_else(|e| {
                log::warn!("Could not determine OS version: {}, using \"unknown\"", e);
                "unknown".to_string()
            });
        let device = get_device_name()
            .or_else(|_| {
                sys_info::hostname().map_err(|e| io::Error::new(io::ErrorKind::Other, e))
            })
            .unwrap_or_else(|e| {
                log::warn!("Could not determine device name: {}, using \"unknown\"", e);
                "unknown".to_string()
            });
        DevmodInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            version,
            device,
            file_sep: ";".to_string(),
            bin: std::env::consts::ARCH.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pretty_name_quoted() {
        let content = "NAME=Fedora\nPRETTY_NAME=\"Fedora Linux 40 (Server Edition)\"\nID=fedora\n";
        let parsed = parse_pretty_name(content.as_bytes()).unwrap();
        assert_eq!(parsed.as_deref(), Some("Fedora Linux 40 (Server Edition)"));
    }

    #[test]
    fn test_parse_pretty_name_unquoted() {
        let content = "PRETTY_NAME=Debian\n";
        let parsed = parse_pretty_name(content.as_bytes()).unwrap();
        assert_eq!(parsed.as_deref(), Some("Debian"));
    }

    #[test]
    fn test_parse_pretty_name_missing() {
        let content = "NAME=Fedora\nID=fedora\n";
        assert!(parse_pretty_name(content.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn test_gather_never_panics() {
        let devmod = DevmodInfo::gather();
        assert!(!devmod.os.is_empty());
        assert!(!devmod.arch.is_empty());
        assert_eq!(devmod.file_sep, ";");
    }
}
