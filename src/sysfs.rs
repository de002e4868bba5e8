//! Path layout and tolerant reads over the kernel's sysfs tree.
//!
//! Entries may vanish while adapters are hot-plugged, so every read here
//! returns `Option` and the callers treat a missing file as "not matching".

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub(crate) const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// Hex digits of the IPoIB queue-pair prefix in front of the port GID.
const IPOIB_QPN_HEX_LEN: usize = 8;

#[derive(Debug, Clone)]
pub(crate) struct Sysfs {
    root: PathBuf,
}

impl Sysfs {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub(crate) fn infiniband_class(&self) -> PathBuf {
        self.root.join("class/infiniband")
    }

    pub(crate) fn net_class(&self) -> PathBuf {
        self.root.join("class/net")
    }

    pub(crate) fn interface(&self, name: &str) -> PathBuf {
        self.net_class().join(name)
    }

    /// Fails fast when the interface enumeration root is absent.
    pub(crate) fn check(&self) -> Result<(), Error> {
        let net = self.net_class();
        if net.is_dir() {
            Ok(())
        } else {
            Err(Error::PlatformUnsupported { path: net })
        }
    }
}

/// Reads the first line of a sysfs attribute, trimmed.
pub(crate) fn read_attr(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    Some(content.lines().next().unwrap_or_default().trim().to_string())
}

/// Lists `(name, path)` of the entries in `dir`, sorted by name.
///
/// An unreadable directory yields an empty list.
pub(crate) fn sorted_entries(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<(String, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some((name, entry.path()))
        })
        .collect();
    found.sort_by(|a, b| a.0.cmp(&b.0));
    found
}

/// Strips byte separators and lowercases, so `FE80:0000:...` and
/// `fe80:0000:...` compare equal.
pub(crate) fn normalize_hex(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.') && !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// The port GID embedded in a normalized IPoIB hardware address.
///
/// IPoIB addresses are 20 bytes: a 4-byte queue-pair prefix followed by
/// the 16-byte GID of the port the interface rides on.
pub(crate) fn gid_of_hw_addr(address: &str) -> Option<&str> {
    if address.len() <= IPOIB_QPN_HEX_LEN || !address.is_char_boundary(IPOIB_QPN_HEX_LEN) {
        return None;
    }
    Some(&address[IPOIB_QPN_HEX_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_hex() {
        assert_eq!(
            normalize_hex("FE80:0000:0000:0000:0002:C903:0029:7DE1\n"),
            "fe800000000000000002c90300297de1"
        );
        assert_eq!(normalize_hex("aa-bb-cc"), "aabbcc");
        assert_eq!(normalize_hex(""), "");
    }

    #[test]
    fn test_gid_of_hw_addr() {
        let addr = normalize_hex("80:00:02:08:fe:80:00:00:00:00:00:00:00:02:c9:03:00:29:7d:e1");
        assert_eq!(
            gid_of_hw_addr(&addr),
            Some("fe800000000000000002c90300297de1")
        );
        assert_eq!(gid_of_hw_addr("aabbccdd"), None);
        assert_eq!(gid_of_hw_addr(""), None);
    }

    #[test]
    fn test_check_requires_net_class() {
        let tmp = TempDir::new().unwrap();
        let sysfs = Sysfs::new(tmp.path());
        assert!(matches!(
            sysfs.check(),
            Err(Error::PlatformUnsupported { .. })
        ));

        fs::create_dir_all(tmp.path().join("class/net")).unwrap();
        assert!(sysfs.check().is_ok());
    }

    #[test]
    fn test_read_attr_first_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state");
        fs::write(&path, "4: ACTIVE\nextra\n").unwrap();
        assert_eq!(read_attr(&path).as_deref(), Some("4: ACTIVE"));
        assert_eq!(read_attr(&tmp.path().join("missing")), None);
    }

    #[test]
    fn test_sorted_entries() {
        let tmp = TempDir::new().unwrap();
        for name in ["ib1", "eth0", "ib0"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
        }
        let names: Vec<String> = sorted_entries(tmp.path())
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["eth0", "ib0", "ib1"]);
        assert!(sorted_entries(&tmp.path().join("nope")).is_empty());
    }
}
