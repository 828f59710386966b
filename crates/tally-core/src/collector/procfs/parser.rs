//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions that parse the content of various `/proc` files
//! into structured data. They are designed to be easily testable with string inputs.

use std::collections::HashMap;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parsed data from `/proc/meminfo` (kB).
#[derive(Debug, Clone, Default)]
pub struct MemInfo {
    pub mem_total: u64,
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let value = content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "MemTotal")
        .map(|(_, value)| value)
        .ok_or_else(|| ParseError::new("missing MemTotal in meminfo"))?;

    let mem_total = value
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    Ok(MemInfo { mem_total })
}

/// Parsed data from `/proc/loadavg`.
#[derive(Debug, Clone, Default)]
pub struct LoadAvg {
    pub load1: f64,
}

/// Parses `/proc/loadavg` content.
///
/// Format: `load1 load5 load15 running/total last_pid`
pub fn parse_loadavg(content: &str) -> Result<LoadAvg, ParseError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(ParseError::new("invalid loadavg format"));
    }

    let load1 = parts[0]
        .parse()
        .map_err(|_| ParseError::new("invalid load1"))?;

    Ok(LoadAvg { load1 })
}

/// Counts the per-CPU lines (`cpu0`, `cpu1`, ...) in `/proc/stat`.
///
/// The aggregate `cpu` line is not counted.
pub fn parse_cpu_count(content: &str) -> usize {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|label| label.strip_prefix("cpu"))
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        .count()
}

/// Parses `/proc/uptime` content into seconds since boot.
pub fn parse_uptime(content: &str) -> Result<f64, ParseError> {
    content
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::new("empty uptime"))?
        .parse()
        .map_err(|_| ParseError::new("invalid uptime"))
}

/// Extracts `starttime` (clock ticks after boot) from `/proc/[pid]/stat`.
///
/// The comm field may contain spaces and parentheses, so fields are counted
/// from the last `)`.
pub fn parse_proc_starttime(content: &str) -> Result<u64, ParseError> {
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    // Field 22 of stat; the first field after ')' is field 3 (state).
    content[close_paren + 1..]
        .split_whitespace()
        .nth(19)
        .ok_or_else(|| ParseError::new("missing field starttime"))?
        .parse()
        .map_err(|_| ParseError::new("invalid starttime"))
}

/// Parsed data from `/proc/[pid]/status`. Memory figures are in kB.
#[derive(Debug, Clone, Default)]
pub struct ProcStatus {
    pub threads: u64,
    pub vm_size: u64,
    pub vm_data: u64,
    pub vm_stk: u64,
    pub vm_exe: u64,
    pub vm_lib: u64,
}

/// Parses `/proc/[pid]/status` content.
///
/// Format is key:\tvalue pairs, one per line.
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, ParseError> {
    let fields: HashMap<&str, &str> = content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect();

    if !fields.contains_key("Threads") {
        return Err(ParseError::new("missing Threads in status"));
    }

    // Memory fields are in kB format: "12345 kB"
    let parse_num = |key: &str| -> u64 {
        fields
            .get(key)
            .and_then(|s| s.split_whitespace().next())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };

    Ok(ProcStatus {
        threads: parse_num("Threads"),
        vm_size: parse_num("VmSize"),
        vm_data: parse_num("VmData"),
        vm_stk: parse_num("VmStk"),
        vm_exe: parse_num("VmExe"),
        vm_lib: parse_num("VmLib"),
    })
}

/// Extracts the soft "Max open files" limit from `/proc/[pid]/limits`.
///
/// Returns `Ok(None)` when the limit is `unlimited`.
pub fn parse_open_files_limit(content: &str) -> Result<Option<u64>, ParseError> {
    let line = content
        .lines()
        .find_map(|line| line.strip_prefix("Max open files"))
        .ok_or_else(|| ParseError::new("missing Max open files in limits"))?;

    let soft = line
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::new("missing soft limit for open files"))?;

    if soft == "unlimited" {
        return Ok(None);
    }
    soft.parse()
        .map(Some)
        .map_err(|_| ParseError::new(format!("invalid open files limit '{}'", soft)))
}

/// One line of `/proc/[pid]/mounts`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountEntry {
    /// Mount source, e.g. `/dev/sda1` or `tmpfs`.
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub read_only: bool,
}

/// Parses `/proc/[pid]/mounts` content.
///
/// Format: `device mount_point fs_type options dump pass`. Spaces and other
/// special characters in paths are octal-escaped (`\040`).
pub fn parse_mounts(content: &str) -> Vec<MountEntry> {
    let mut mounts = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue; // Skip malformed lines
        }

        mounts.push(MountEntry {
            device: unescape_octal(parts[0]),
            mount_point: unescape_octal(parts[1]),
            fs_type: parts[2].to_string(),
            read_only: parts[3].split(',').any(|opt| opt == "ro"),
        });
    }

    mounts
}

/// Decodes `\NNN` octal escapes used by the kernel in mount tables.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..=i + 3].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = (bytes[i + 1] - b'0') as u32 * 64
                + (bytes[i + 2] - b'0') as u32 * 8
                + (bytes[i + 3] - b'0') as u32;
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
