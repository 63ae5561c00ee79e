use std::path::{Path, PathBuf};

use crate::error::Result;

/// Device-name prefixes for USB serial adapters, most specific first.
const USB_PREFIXES: &[&str] = &[
    "ttyUSB",
    "ttyACM",
    "cu.usbserial",
    "cu.SLAB_USBtoUART",
    "cu.usbmodem",
    "tty.usbserial",
    "tty.SLAB_USBtoUART",
    "tty.usbmodem",
];

/// Other device nodes that can carry a serial line.
const OTHER_PREFIXES: &[&str] = &["ttyS", "ttyAMA", "cu.", "tty."];

/// A candidate serial device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Full device path.
    pub path: PathBuf,
    /// True for USB-UART adapters (the usual way the board is attached).
    pub usb: bool,
}

/// Enumerate serial device nodes under `/dev`, USB adapters first.
pub fn list_serial_ports() -> Result<Vec<PortInfo>> {
    list_serial_ports_in(Path::new("/dev"))
}

/// Enumerate serial device nodes in `dir`.
pub fn list_serial_ports_in(dir: &Path) -> Result<Vec<PortInfo>> {
    let mut ports = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(usb) = classify(name) {
            ports.push(PortInfo {
                path: entry.path(),
                usb,
            });
        }
    }
    ports.sort_by(|a, b| b.usb.cmp(&a.usb).then_with(|| a.path.cmp(&b.path)));
    Ok(ports)
}

fn classify(name: &str) -> Option<bool> {
    if USB_PREFIXES.iter().any(|p| name.starts_with(p)) || name.contains("USB") {
        return Some(true);
    }
    if OTHER_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return Some(false);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_names() {
        assert_eq!(classify("ttyUSB0"), Some(true));
        assert_eq!(classify("cu.SLAB_USBtoUART"), Some(true));
        assert_eq!(classify("ttyS0"), Some(false));
        assert_eq!(classify("tty.Bluetooth-Incoming-Port"), Some(false));
        assert_eq!(classify("null"), None);
        assert_eq!(classify("tty"), None);
    }

    #[test]
    fn usb_ports_sort_first() {
        let dir = std::env::temp_dir().join(format!("sensorbridge-ports-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["ttyS1", "ttyUSB0", "null", "ttyACM0"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let ports = list_serial_ports_in(&dir).unwrap();
        let names: Vec<_> = ports
            .iter()
            .map(|p| p.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ttyACM0", "ttyUSB0", "ttyS1"]);
        assert!(ports[0].usb && ports[1].usb && !ports[2].usb);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
