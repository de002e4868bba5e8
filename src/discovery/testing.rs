//! Throwaway sysfs trees for tests.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::sysfs::{normalize_hex, Sysfs};

/// Queue-pair prefix the kernel puts in front of the GID.
const IPOIB_QPN: &str = "80:00:02:08";

pub(crate) struct FakeSysfs {
    dir: TempDir,
}

impl FakeSysfs {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("class/net")).unwrap();
        fs::create_dir_all(dir.path().join("class/infiniband")).unwrap();
        Self { dir }
    }

    pub(crate) fn sysfs(&self) -> Sysfs {
        Sysfs::new(self.dir.path())
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn write(&self, rel: &str, content: &str) {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub(crate) fn remove(&self, rel: &str) {
        fs::remove_file(self.dir.path().join(rel)).unwrap();
    }

    pub(crate) fn ib_port(&self, device: &str, port: u16, state: &str, gid: &str) {
        let base = format!("class/infiniband/{device}/ports/{port}");
        self.write(&format!("{base}/state"), &format!("{state}\n"));
        self.write(&format!("{base}/gids/0"), &format!("{gid}\n"));
    }

    /// An IPoIB interface riding on `device`/`port`, whose GID is `gid`.
    pub(crate) fn ipoib(&self, name: &str, operstate: &str, device: &str, port: u16, gid: &str) {
        let base = format!("class/net/{name}");
        self.write(
            &format!("{base}/address"),
            &format!("{}\n", ipoib_address(gid)),
        );
        self.write(&format!("{base}/operstate"), &format!("{operstate}\n"));
        self.write(
            &format!("{base}/device/infiniband/{device}/ports/{port}/gids/0"),
            &format!("{gid}\n"),
        );
    }

    pub(crate) fn ethernet(&self, name: &str, operstate: &str, mac: &str) {
        let base = format!("class/net/{name}");
        self.write(&format!("{base}/address"), &format!("{mac}\n"));
        self.write(&format!("{base}/operstate"), &format!("{operstate}\n"));
    }
}

/// Formats the 20-byte hardware address of an IPoIB interface on `gid`.
pub(crate) fn ipoib_address(gid: &str) -> String {
    let hex = normalize_hex(gid);
    let bytes: Vec<&str> = (0..hex.len())
        .step_by(2)
        .map(|i| &hex[i..(i + 2).min(hex.len())])
        .collect();
    format!("{IPOIB_QPN}:{}", bytes.join(":"))
}
