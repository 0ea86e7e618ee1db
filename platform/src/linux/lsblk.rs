use automount_core::Media;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::Chars;

/// Columns requested from `lsblk -b -P -o ...`.
pub const LSBLK_COLUMNS: &str = "NAME,SIZE,TYPE,FSTYPE,LABEL,MODEL,RM,HOTPLUG,MOUNTPOINT";

/// Mount points that mark a device as part of the running system.
const SYSTEM_MOUNT_POINTS: &[&str] = &["/", "/boot", "/boot/efi", "/usr", "/var", "/home"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub kind: String,
    pub fstype: Option<String>,
    pub label: Option<String>,
    pub model: Option<String>,
    pub removable: bool,
    pub mount_point: Option<PathBuf>,
}

impl BlockDevice {
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let name = fields.get("NAME").filter(|n| !n.is_empty())?.clone();
        let non_empty = |key: &str| {
            fields
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Some(Self {
            path: format!("/dev/{}", name),
            size: fields.get("SIZE").and_then(|s| s.parse::<u64>().ok()).unwrap_or(0),
            kind: fields.get("TYPE").cloned().unwrap_or_default(),
            fstype: non_empty("FSTYPE"),
            label: non_empty("LABEL"),
            model: non_empty("MODEL"),
            removable: fields.get("RM").is_some_and(|rm| rm == "1")
                || fields.get("HOTPLUG").is_some_and(|hp| hp == "1"),
            mount_point: non_empty("MOUNTPOINT").map(PathBuf::from),
            name,
        })
    }

    pub fn is_system(&self) -> bool {
        self.mount_point
            .as_ref()
            .is_some_and(|mp| SYSTEM_MOUNT_POINTS.iter().any(|sys| mp.as_path() == Path::new(sys)))
    }

    /// Removable, carries a filesystem, and is not holding up the running system.
    pub fn is_mountable_media(&self) -> bool {
        matches!(self.kind.as_str(), "part" | "disk")
            && self.removable
            && self.fstype.is_some()
            && self.fstype.as_deref() != Some("swap")
            && !self.is_system()
    }

    pub fn display_name(&self) -> String {
        let title = self
            .label
            .as_deref()
            .or(self.model.as_deref())
            .unwrap_or(&self.name);
        format!("{} ({}, {:.1} GB)", title, self.name, self.size as f64 / 1_000_000_000.0)
    }

    pub fn to_media(&self) -> Media {
        Media::new(self.path.clone(), self.display_name())
    }
}

/// Parse `lsblk -P` output into the devices worth offering as media.
pub fn parse_lsblk(output: &str) -> Vec<BlockDevice> {
    output
        .lines()
        .map(parse_pairs)
        .filter_map(|fields| BlockDevice::from_fields(&fields))
        .filter(BlockDevice::is_mountable_media)
        .collect()
}

/// Parse one line of `KEY="value"` pairs. lsblk escapes unsafe bytes as `\xHH`.
pub fn parse_pairs(line: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let mut key = String::new();
    let mut value: Vec<u8> = Vec::new();
    let mut in_quotes = false;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' => {
                    in_quotes = false;
                    fields.insert(
                        std::mem::take(&mut key),
                        String::from_utf8_lossy(&value).into_owned(),
                    );
                    value.clear();
                }
                '\\' => unescape(&mut chars, &mut value),
                _ => {
                    let mut buf = [0u8; 4];
                    value.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
            }
        } else {
            match ch {
                '"' => in_quotes = true,
                // Separators between and inside pairs
                '=' | ' ' => {}
                _ => key.push(ch),
            }
        }
    }

    fields
}

fn unescape(chars: &mut Chars<'_>, value: &mut Vec<u8>) {
    match chars.next() {
        Some('x') => {
            let hex: String = chars.by_ref().take(2).collect();
            match u8::from_str_radix(&hex, 16) {
                Ok(byte) => value.push(byte),
                Err(_) => {
                    value.extend_from_slice(b"\\x");
                    value.extend_from_slice(hex.as_bytes());
                }
            }
        }
        Some(other) => {
            let mut buf = [0u8; 4];
            value.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
        }
        None => value.push(b'\\'),
    }
}
