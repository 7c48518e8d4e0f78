//! Process-scoped host facts, gathered once per run and read-only after.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ProbeError;
use crate::probe;
use crate::runner::Runner;

/// Facts about the host this process runs on. Derived fresh on every
/// invocation; nothing here is persisted between runs.
#[derive(Debug, Clone)]
pub struct HostContext {
    /// `uname -r`, e.g. `6.1.0-18-amd64`.
    pub kernel_release: String,
    /// `ID` from os-release, e.g. `debian`.
    pub distro_id: String,
    /// `VERSION_CODENAME` from os-release, e.g. `bookworm`.
    pub codename: String,
    /// Whether the distro is Debian or derived from it.
    pub debian_family: bool,
    /// Effective uid of this process.
    pub euid: u32,
    /// Whether the package manager left a reboot marker behind.
    pub reboot_pending: bool,
    /// Whether any apt source enables the non-free component.
    pub non_free_enabled: bool,
}

/// Filesystem locations consulted while gathering facts. Overridable so
/// tests can point at a scratch directory.
pub struct HostPaths {
    pub os_release: PathBuf,
    pub reboot_marker: PathBuf,
    pub sources_list: PathBuf,
    pub sources_dir: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            os_release: PathBuf::from("/etc/os-release"),
            reboot_marker: PathBuf::from("/run/reboot-required"),
            sources_list: PathBuf::from("/etc/apt/sources.list"),
            sources_dir: PathBuf::from("/etc/apt/sources.list.d"),
        }
    }
}

impl HostContext {
    pub fn gather(runner: &dyn Runner) -> Result<Self, ProbeError> {
        Self::gather_from(runner, &HostPaths::default())
    }

    pub fn gather_from(runner: &dyn Runner, paths: &HostPaths) -> Result<Self, ProbeError> {
        let kernel_release = probe::capture(runner, "uname", &["-r"])?
            .stdout_str()
            .trim()
            .to_string();
        let euid = probe::capture(runner, "id", &["-u"])?
            .stdout_str()
            .trim()
            .parse::<u32>()
            .map_err(|e| ProbeError::ToolError {
                tool: "id".to_string(),
                message: format!("unparseable uid: {e}"),
            })?;

        let os_release = fs::read_to_string(&paths.os_release).unwrap_or_default();
        let distro_id = os_release_value(&os_release, "ID").unwrap_or_default();
        let codename = os_release_value(&os_release, "VERSION_CODENAME").unwrap_or_default();
        let id_like = os_release_value(&os_release, "ID_LIKE").unwrap_or_default();
        let debian_family = distro_id == "debian"
            || distro_id == "ubuntu"
            || id_like.split_whitespace().any(|id| id == "debian");

        Ok(Self {
            kernel_release,
            distro_id,
            codename,
            debian_family,
            euid,
            reboot_pending: paths.reboot_marker.exists(),
            non_free_enabled: non_free_enabled(&paths.sources_list, &paths.sources_dir),
        })
    }

    pub fn is_root(&self) -> bool {
        self.euid == 0
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self {
            kernel_release: "6.1.0-18-amd64".to_string(),
            distro_id: "debian".to_string(),
            codename: "bookworm".to_string(),
            debian_family: true,
            euid: 0,
            reboot_pending: false,
            non_free_enabled: true,
        }
    }
}

/// Pull a `KEY=value` out of os-release content, stripping optional quotes.
fn os_release_value(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix('=')?;
        Some(rest.trim().trim_matches('"').to_string())
    })
}

/// Scan sources.list plus sources.list.d for an active non-free entry.
/// Matches both one-line format (`deb ... main non-free`) and deb822 files
/// (`Components: main non-free`).
fn non_free_enabled(sources_list: &Path, sources_dir: &Path) -> bool {
    let mut contents = Vec::new();
    if let Ok(c) = fs::read_to_string(sources_list) {
        contents.push(c);
    }
    if let Ok(entries) = fs::read_dir(sources_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let is_source = path
                .extension()
                .is_some_and(|ext| ext == "list" || ext == "sources");
            if is_source {
                if let Ok(c) = fs::read_to_string(&path) {
                    contents.push(c);
                }
            }
        }
    }

    contents.iter().any(|content| {
        content.lines().any(|line| {
            let line = line.trim();
            if line.starts_with('#') {
                return false;
            }
            (line.starts_with("deb") || line.starts_with("Components:"))
                && line.split_whitespace().any(|word| word == "non-free")
        })
    })
}
