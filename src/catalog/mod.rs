//! Static registry of the pipeline modules the server knows about.
//!
//! Every module has a phase [`Category`], the parameters it cannot run
//! without, and optionally an exclusion group shared with the modules it can
//! substitute for. The registry is read-only once built; the default one is
//! [`ModuleCatalog::builtin`].

mod builtin;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::document::ConfigDocument;
use crate::errors::ConfigError;

/// Pipeline phase a module belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "implicit")]
    Implicit,
    #[serde(rename = "implicit.parser")]
    ImplicitParser,
    #[serde(rename = "seq")]
    Seq,
    #[serde(rename = "classifier")]
    Classifier,
    #[serde(rename = "r")]
    R,
    #[serde(rename = "report")]
    Report,
    #[serde(rename = "qiime")]
    Qiime,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Self::Implicit,
        Self::Seq,
        Self::Classifier,
        Self::ImplicitParser,
        Self::Qiime,
        Self::R,
        Self::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Implicit => "implicit",
            Self::ImplicitParser => "implicit.parser",
            Self::Seq => "seq",
            Self::Classifier => "classifier",
            Self::R => "r",
            Self::Report => "report",
            Self::Qiime => "qiime",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "implicit" => Ok(Self::Implicit),
            "implicit.parser" => Ok(Self::ImplicitParser),
            "seq" => Ok(Self::Seq),
            "classifier" => Ok(Self::Classifier),
            "r" => Ok(Self::R),
            "report" => Ok(Self::Report),
            "qiime" => Ok(Self::Qiime),
            _ => Err(format!("Invalid module category: {}", s)),
        }
    }
}

/// A parameter a module needs before it can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamRequirement {
    /// The key must be present.
    Param { key: String, prompt: String },
    /// At least one of the keys must be present.
    AnyOf { keys: Vec<String>, prompt: String },
}

impl ParamRequirement {
    pub fn is_met(&self, doc: &ConfigDocument) -> bool {
        match self {
            Self::Param { key, .. } => doc.contains_param(key),
            Self::AnyOf { keys, .. } => keys.iter().any(|k| doc.contains_param(k)),
        }
    }

    /// The key reported when the requirement is not met.
    pub fn key(&self) -> &str {
        match self {
            Self::Param { key, .. } => key,
            Self::AnyOf { keys, .. } => keys.first().map(String::as_str).unwrap_or_default(),
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            Self::Param { prompt, .. } | Self::AnyOf { prompt, .. } => prompt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptor {
    pub id: String,
    pub category: Category,
    pub required_params: Vec<ParamRequirement>,
    pub exclusion_group: Option<String>,
}

impl ModuleDescriptor {
    pub fn new(id: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            category,
            required_params: Vec::new(),
            exclusion_group: None,
        }
    }

    pub fn requires(mut self, key: &str, prompt: &str) -> Self {
        self.required_params.push(ParamRequirement::Param {
            key: key.to_string(),
            prompt: prompt.to_string(),
        });
        self
    }

    pub fn requires_all(mut self, params: &[(&str, &str)]) -> Self {
        for (key, prompt) in params {
            self = self.requires(key, prompt);
        }
        self
    }

    pub fn requires_any(mut self, keys: &[&str], prompt: &str) -> Self {
        self.required_params.push(ParamRequirement::AnyOf {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            prompt: prompt.to_string(),
        });
        self
    }

    pub fn exclusive_in(mut self, group: &str) -> Self {
        self.exclusion_group = Some(group.to_string());
        self
    }
}

/// Read-only module lookup table.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: Vec<ModuleDescriptor>,
    index: HashMap<String, usize>,
}

static BUILTIN: LazyLock<ModuleCatalog> = LazyLock::new(|| ModuleCatalog::new(builtin::modules()));

impl ModuleCatalog {
    /// Build a catalog from descriptors. A repeated id replaces the earlier entry.
    pub fn new(descriptors: impl IntoIterator<Item = ModuleDescriptor>) -> Self {
        let mut catalog = Self::default();
        for descriptor in descriptors {
            match catalog.index.get(&descriptor.id) {
                Some(&pos) => catalog.modules[pos] = descriptor,
                None => {
                    catalog.index.insert(descriptor.id.clone(), catalog.modules.len());
                    catalog.modules.push(descriptor);
                }
            }
        }
        catalog
    }

    /// The catalog of modules shipped with the pipeline tool.
    pub fn builtin() -> &'static ModuleCatalog {
        &BUILTIN
    }

    pub fn resolve(&self, id: &str) -> Result<&ModuleDescriptor, ConfigError> {
        self.index
            .get(id)
            .map(|&pos| &self.modules[pos])
            .ok_or_else(|| ConfigError::UnknownModule { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Reject a document that references any module this catalog lacks.
    pub fn check_known(&self, doc: &ConfigDocument) -> Result<(), ConfigError> {
        for module in doc.modules() {
            self.resolve(module)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.iter()
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.iter().filter(move |m| m.category == category)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
