//! Filesystem usage metrics
//!
//! Enumerates mounted filesystems and reports capacity/usage per mount
//! point. Linux walks `/proc/mounts` and stats each real mount; other unix
//! platforms report the root filesystem; Windows enumerates drive roots.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Usage of one mounted filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilestoreUsage {
    pub mount_point: String,
    pub fs_type: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
}

impl FilestoreUsage {
    fn new(mount_point: String, fs_type: String, total_bytes: u64, available_bytes: u64) -> Self {
        let used = total_bytes.saturating_sub(available_bytes);
        let used_percent = if total_bytes > 0 {
            used as f64 / total_bytes as f64 * 100.0
        } else {
            0.0
        };
        Self {
            mount_point,
            fs_type,
            total_bytes,
            available_bytes,
            used_percent,
        }
    }
}

/// Filesystem usage keyed by mount point. Pseudo and zero-capacity
/// filesystems are skipped.
pub fn filestore_usage() -> Result<HashMap<String, FilestoreUsage>> {
    collect()
}

#[cfg(unix)]
fn stat_mount(mount_point: &str, fs_type: &str) -> Option<FilestoreUsage> {
    let stat = nix::sys::statvfs::statvfs(mount_point).ok()?;
    let frag_size = stat.fragment_size() as u64;
    let total = stat.blocks() as u64 * frag_size;
    if total == 0 {
        return None;
    }
    let available = stat.blocks_available() as u64 * frag_size;
    Some(FilestoreUsage::new(
        mount_point.to_string(),
        fs_type.to_string(),
        total,
        available,
    ))
}

#[cfg(target_os = "linux")]
fn is_pseudo_fs(fs_type: &str) -> bool {
    matches!(
        fs_type,
        "proc"
            | "sysfs"
            | "devtmpfs"
            | "devpts"
            | "tmpfs"
            | "cgroup"
            | "cgroup2"
            | "securityfs"
            | "debugfs"
            | "tracefs"
            | "pstore"
            | "bpf"
            | "configfs"
            | "fusectl"
            | "hugetlbfs"
            | "mqueue"
            | "autofs"
            | "binfmt_misc"
            | "ramfs"
            | "efivarfs"
    )
}

#[cfg(target_os = "linux")]
fn collect() -> Result<HashMap<String, FilestoreUsage>> {
    let mounts = std::fs::read_to_string("/proc/mounts")?;
    let mut usage = HashMap::new();
    for line in mounts.lines() {
        let mut fields = line.split_whitespace();
        let _device = fields.next();
        let mount_point = match fields.next() {
            Some(m) => m,
            None => continue,
        };
        let fs_type = fields.next().unwrap_or("unknown");
        if is_pseudo_fs(fs_type) {
            continue;
        }
        // octal escapes in mount paths (e.g. \040 for space)
        let mount_point = unescape_mount(mount_point);
        if let Some(entry) = stat_mount(&mount_point, fs_type) {
            usage.insert(mount_point, entry);
        }
    }
    Ok(usage)
}

/// /proc/mounts escapes space, tab, newline and backslash as octal.
#[cfg(target_os = "linux")]
fn unescape_mount(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let oct = [bytes[i + 1], bytes[i + 2], bytes[i + 3]];
            // a three-digit octal byte: leading digit capped at 3 (\377 max)
            if (b'0'..=b'3').contains(&oct[0])
                && oct[1..].iter().all(|b| (b'0'..=b'7').contains(b))
            {
                let code =
                    (oct[0] - b'0') * 64 + (oct[1] - b'0') * 8 + (oct[2] - b'0');
                out.push(code);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn collect() -> Result<HashMap<String, FilestoreUsage>> {
    let mut usage = HashMap::new();
    if let Some(entry) = stat_mount("/", "unknown") {
        usage.insert("/".to_string(), entry);
    }
    Ok(usage)
}

#[cfg(windows)]
fn collect() -> Result<HashMap<String, FilestoreUsage>> {
    use windows::core::HSTRING;
    use windows::Win32::Storage::FileSystem::{GetDiskFreeSpaceExW, GetLogicalDrives};

    let mut usage = HashMap::new();
    let mask = unsafe { GetLogicalDrives() };
    for index in 0..26u32 {
        if mask & (1 << index) == 0 {
            continue;
        }
        let root = format!("{}:\\", (b'A' + index as u8) as char);
        let wide = HSTRING::from(root.as_str());
        let mut available: u64 = 0;
        let mut total: u64 = 0;
        let ok = unsafe {
            GetDiskFreeSpaceExW(&wide, Some(&mut available), Some(&mut total), None)
        };
        if ok.is_ok() && total > 0 {
            usage.insert(
                root.clone(),
                FilestoreUsage::new(root, "unknown".to_string(), total, available),
            );
        }
    }
    Ok(usage)
}
