//! Device groups.
//!
//! Named sets of MACs the dashboard uses to fold several devices into one
//! line. Stored as a single JSON file next to the database; small enough
//! that the whole map is rewritten on every change, through the same
//! write-then-rename swap the report cache uses.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ServerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub devices: Vec<String>,
}

pub struct GroupStore {
    path: PathBuf,
    groups: Mutex<BTreeMap<String, Vec<String>>>,
}

impl GroupStore {
    /// Load groups from `path`. A missing file is an empty set; an
    /// unreadable one is logged and treated as empty rather than blocking
    /// startup.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let groups = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(groups) => groups,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable groups file, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            groups: Mutex::new(groups),
        }
    }

    pub fn list(&self) -> Vec<Group> {
        self.groups
            .lock()
            .iter()
            .map(|(name, devices)| Group {
                name: name.clone(),
                devices: devices.clone(),
            })
            .collect()
    }

    /// Create or replace a group.
    pub fn upsert(&self, group: Group) -> Result<(), ServerError> {
        let mut groups = self.groups.lock();
        groups.insert(group.name, group.devices);
        self.persist(&groups)
    }

    /// Delete a group. Returns whether it existed.
    pub fn remove(&self, name: &str) -> Result<bool, ServerError> {
        let mut groups = self.groups.lock();
        let existed = groups.remove(name).is_some();
        if existed {
            self.persist(&groups)?;
        }
        Ok(existed)
    }

    fn persist(&self, groups: &BTreeMap<String, Vec<String>>) -> Result<(), ServerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(&self.path);
        let bytes = serde_json::to_vec_pretty(groups)?;
        if let Err(e) = fs::write(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
