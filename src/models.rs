use serde::{Deserialize, Serialize};

/// Persisted catalog record, one per installed game. Field casing matches the
/// on-disk `games.json` produced by earlier releases.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub path: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon_path: Option<String>,
}

/// Kinds of long-running operations a catalog entry can be tagged with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Install,
    Compile,
    Remove,
}

/// Associates a catalog entry with one in-flight operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressTag {
    pub id: u64,
    pub kind: OperationKind,
}

/// Incoming value for one optional field of a catalog entry.
///
/// `Keep` means the caller did not specify the field, `Clear` means the
/// caller explicitly emptied it. The distinction matters during merges:
/// `Keep` preserves whatever the entry already holds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    pub fn resolve(self, current: Option<T>) -> Option<T> {
        match self {
            FieldUpdate::Keep => current,
            FieldUpdate::Clear => None,
            FieldUpdate::Set(value) => Some(value),
        }
    }
}

/// Merge payload handed to the catalog after an install resolves identities.
#[derive(Clone, Debug, Default)]
pub struct GameUpdate {
    pub path: String,
    pub name: FieldUpdate<String>,
    pub icon_path: FieldUpdate<String>,
}

impl GameUpdate {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = FieldUpdate::Set(name.into());
        self
    }

    pub fn with_icon_path(mut self, icon_path: impl Into<String>) -> Self {
        self.icon_path = FieldUpdate::Set(icon_path.into());
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FirmwareStatus {
    #[default]
    None,
    Installed,
    Compiled,
}

/// Persisted singleton firmware record.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareInfo {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: FirmwareStatus,
}
