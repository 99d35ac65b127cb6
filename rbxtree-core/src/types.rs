//! Domain types shared by every rbxtree crate.
//!
//! Wire field names follow the extractor's JSON (`referenceId`, `className`,
//! `parentId`); Rust field names describe what the value means.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property and attribute bags carry arbitrary JSON values.
pub type PropertyMap = Map<String, Value>;

/// Class name given to instances that arrive without one.
pub const UNKNOWN_KIND: &str = "Unknown";

/// Class name of synthesized intermediate containers.
pub const FOLDER_KIND: &str = "Folder";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque, producer-assigned instance identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Dotted instance path: names from a root service down, joined by `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstancePath(pub String);

impl InstancePath {
    pub const SEPARATOR: char = '.';

    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Self {
        let joined = segments
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(".");
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(Self::SEPARATOR)
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last segment, the instance's own name.
    pub fn leaf(&self) -> &str {
        self.0.rsplit(Self::SEPARATOR).next().unwrap_or(&self.0)
    }

    /// The `(N-1)`-segment prefix, or `None` for a single-segment path.
    pub fn parent(&self) -> Option<InstancePath> {
        self.0
            .rfind(Self::SEPARATOR)
            .map(|idx| InstancePath(self.0[..idx].to_owned()))
    }

    /// Every proper prefix, shortest first.
    pub fn ancestors(&self) -> Vec<InstancePath> {
        let mut out = Vec::new();
        for (idx, ch) in self.0.char_indices() {
            if ch == Self::SEPARATOR {
                out.push(InstancePath(self.0[..idx].to_owned()));
            }
        }
        out
    }

    pub fn child(&self, name: &str) -> InstancePath {
        InstancePath(format!("{}{}{}", self.0, Self::SEPARATOR, name))
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for InstancePath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstancePath {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Script kinds
// ---------------------------------------------------------------------------

/// Sub-kind of an executable-source unit. Encoded in the source file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// Runs on the server only (`Script`).
    Server,
    /// Runs on the client only (`LocalScript`).
    Client,
    /// Shared library code (`ModuleScript`).
    Module,
}

impl ScriptKind {
    /// Suffixes in match priority: the two dual-part suffixes before `.luau`.
    pub const ALL: [ScriptKind; 3] = [ScriptKind::Server, ScriptKind::Client, ScriptKind::Module];

    pub fn suffix(self) -> &'static str {
        match self {
            ScriptKind::Server => ".server.luau",
            ScriptKind::Client => ".client.luau",
            ScriptKind::Module => ".luau",
        }
    }

    pub fn class_name(self) -> &'static str {
        match self {
            ScriptKind::Server => "Script",
            ScriptKind::Client => "LocalScript",
            ScriptKind::Module => "ModuleScript",
        }
    }

    /// Any class that is not `Script` or `LocalScript` is treated as shared.
    pub fn from_class_name(class_name: &str) -> ScriptKind {
        match class_name {
            "Script" => ScriptKind::Server,
            "LocalScript" => ScriptKind::Client,
            _ => ScriptKind::Module,
        }
    }

    pub fn is_script_class(class_name: &str) -> bool {
        matches!(class_name, "Script" | "LocalScript" | "ModuleScript")
    }

    /// Split `file_name` into `(stem, kind)` if it carries a source suffix.
    pub fn strip_suffix(file_name: &str) -> Option<(&str, ScriptKind)> {
        ScriptKind::ALL.iter().find_map(|kind| {
            file_name
                .strip_suffix(kind.suffix())
                .filter(|stem| !stem.is_empty())
                .map(|stem| (stem, *kind))
        })
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptKind::Server => write!(f, "server"),
            ScriptKind::Client => write!(f, "client"),
            ScriptKind::Module => write!(f, "module"),
        }
    }
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

fn unknown_kind() -> String {
    UNKNOWN_KIND.to_string()
}

/// One node of the object graph as emitted by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(rename = "referenceId", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<InstanceId>,
    #[serde(rename = "className", default = "unknown_kind")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<PropertyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Fields this crate does not interpret; kept for the canonical dataset.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Instance {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            name: name.into(),
            parent_id: None,
            properties: None,
            attributes: None,
            tags: None,
            source: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<InstanceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<InstanceId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_properties(mut self, properties: PropertyMap) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Script classes and anything carrying source text.
    pub fn is_executable_source(&self) -> bool {
        self.source.is_some() || ScriptKind::is_script_class(&self.kind)
    }

    pub fn script_kind(&self) -> ScriptKind {
        ScriptKind::from_class_name(&self.kind)
    }

    /// Contents of the instance's metadata file (never carries source).
    pub fn to_meta(&self) -> InstanceMeta {
        InstanceMeta {
            kind: Some(self.kind.clone()),
            name: Some(self.name.clone()),
            id: self.id.clone(),
            properties: self.properties.clone(),
            attributes: self.attributes.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// On-disk metadata document (`_meta.rbxjson` / `<stem>.rbxjson`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceMeta {
    #[serde(rename = "className", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "referenceId", default)]
    pub id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<PropertyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Instance payload carried by an operation: no `referenceId` or `parentId`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceData {
    #[serde(rename = "className", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<PropertyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl From<InstanceMeta> for InstanceData {
    fn from(meta: InstanceMeta) -> Self {
        Self {
            kind: meta.kind,
            name: meta.name,
            properties: meta.properties,
            attributes: meta.attributes,
            tags: meta.tags,
            source: None,
        }
    }
}

impl From<&Instance> for InstanceData {
    fn from(inst: &Instance) -> Self {
        Self {
            kind: Some(inst.kind.clone()),
            name: Some(inst.name.clone()),
            properties: inst.properties.clone(),
            attributes: inst.attributes.clone(),
            tags: inst.tags.clone(),
            source: inst.source.clone(),
        }
    }
}

/// Operation verb. Only create-or-replace exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Update,
}

/// Idempotent create-or-replace directive against one instance path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type", default)]
    pub kind: OperationKind,
    pub path: InstancePath,
    pub data: InstanceData,
}

impl Operation {
    pub fn update(path: impl Into<InstancePath>, data: InstanceData) -> Self {
        Self {
            kind: OperationKind::Update,
            path: path.into(),
            data,
        }
    }

    /// Minimal container stub for an ancestor nothing else creates.
    pub fn folder(path: InstancePath) -> Self {
        let name = path.leaf().to_string();
        Self::update(
            path,
            InstanceData {
                kind: Some(FOLDER_KIND.to_string()),
                name: Some(name),
                ..InstanceData::default()
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
