//! In-memory pipeline configuration.
//!
//! A [`ConfigDocument`] holds the ordered module list and the ordered
//! parameter pairs a user selected. [`flat_file`] converts it to and from the
//! persisted text format and [`store`] keeps those files on disk.

pub mod flat_file;
pub mod store;

pub use flat_file::{decode, encode};
pub use store::ConfigStore;

use crate::errors::ConfigError;

/// Parameter naming the file a configuration is persisted as.
pub const CONFIG_FILE_PARAM: &str = "pipeline.configFile";

/// File extension of persisted configurations.
pub const CONFIG_EXTENSION: &str = "properties";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    source_name: String,
    modules: Vec<String>,
    params: Vec<(String, String)>,
}

impl ConfigDocument {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            ..Default::default()
        }
    }

    /// Build a document from the parallel arrays a browser submits.
    pub fn from_parallel(
        source_name: impl Into<String>,
        modules: impl IntoIterator<Item = String>,
        keys: Vec<String>,
        values: Vec<String>,
    ) -> Result<Self, ConfigError> {
        if keys.len() != values.len() {
            return Err(ConfigError::ParamLengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        let mut doc = Self::new(source_name);
        for module in modules {
            doc.push_module(module)?;
        }
        for (key, value) in keys.into_iter().zip(values) {
            doc.set_param(key, value)?;
        }
        Ok(doc)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn set_source_name(&mut self, name: impl Into<String>) {
        self.source_name = name.into();
    }

    /// Append a module. Module ids are unique within a document.
    pub fn push_module(&mut self, id: impl Into<String>) -> Result<(), ConfigError> {
        let id = id.into();
        if !is_valid_module_id(&id) {
            return Err(ConfigError::InvalidModuleId { id });
        }
        if self.modules.contains(&id) {
            return Err(ConfigError::DuplicateModule { id });
        }
        self.modules.push(id);
        Ok(())
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Set a parameter. An existing key keeps its position.
    ///
    /// Keys and values are held to what a flat-file line can carry, so every
    /// document encodes to text that decodes back to the same document.
    pub fn set_param(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ConfigError> {
        let key = key.into();
        let value = value.into();
        if !is_valid_param_key(&key) {
            return Err(ConfigError::InvalidParamKey { key });
        }
        if has_line_break(&value) {
            return Err(ConfigError::MultiLineValue { key });
        }
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `key` when present and not blank.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn contains_param(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn param_keys(&self) -> Vec<String> {
        self.params.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn param_values(&self) -> Vec<String> {
        self.params.iter().map(|(_, v)| v.clone()).collect()
    }

    /// The file name this document is persisted under, from `pipeline.configFile`.
    pub fn config_file_name(&self) -> Option<String> {
        let name = self.get_non_empty(CONFIG_FILE_PARAM)?.trim();
        Some(with_extension(name))
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\n', '\r'])
}

/// Non-empty, no surrounding whitespace, one line.
fn is_valid_module_id(id: &str) -> bool {
    !id.is_empty() && id.trim() == id && !has_line_break(id)
}

/// Non-empty, one line, no `=`, and not read back as a comment.
fn is_valid_param_key(key: &str) -> bool {
    !key.trim().is_empty()
        && !key.contains('=')
        && !key.starts_with(flat_file::COMMENT_MARKER)
        && !has_line_break(key)
}

/// Append `.properties` unless the name already ends with it.
pub fn with_extension(name: &str) -> String {
    let suffix = format!(".{CONFIG_EXTENSION}");
    if name.ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

/// Name without the `.properties` extension.
pub fn stem(name: &str) -> &str {
    name.strip_suffix(format!(".{CONFIG_EXTENSION}").as_str())
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_set_param_replaces_in_place() {
        let mut doc = ConfigDocument::new("demo.properties");
        doc.set_param("a", "1").unwrap();
        doc.set_param("b", "2").unwrap();
        doc.set_param("a", "3").unwrap();
        let pairs: Vec<_> = doc.params().collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_push_module_rejects_duplicate() {
        let mut doc = ConfigDocument::new("demo");
        doc.push_module("m.one").unwrap();
        let err = doc.push_module("m.one").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateModule { id } if id == "m.one"));
        assert_eq!(doc.modules().len(), 1);
    }

    #[test]
    fn test_from_parallel_length_mismatch() {
        let err = ConfigDocument::from_parallel(
            "demo",
            Vec::new(),
            strings(&["a", "b"]),
            strings(&["1"]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ParamLengthMismatch { keys: 2, values: 1 }
        ));
    }

    #[test]
    fn test_from_parallel_keeps_order() {
        let doc = ConfigDocument::from_parallel(
            "demo",
            strings(&["m.b", "m.a"]),
            strings(&["z", "y"]),
            strings(&["1", "2"]),
        )
        .unwrap();
        assert_eq!(doc.modules(), &strings(&["m.b", "m.a"])[..]);
        assert_eq!(doc.param_keys(), strings(&["z", "y"]));
        assert_eq!(doc.param_values(), strings(&["1", "2"]));
    }

    #[test]
    fn test_config_file_name_appends_extension() {
        let mut doc = ConfigDocument::new("");
        assert_eq!(doc.config_file_name(), None);
        doc.set_param(CONFIG_FILE_PARAM, "  ").unwrap();
        assert_eq!(doc.config_file_name(), None);
        doc.set_param(CONFIG_FILE_PARAM, "myRun").unwrap();
        assert_eq!(doc.config_file_name().as_deref(), Some("myRun.properties"));
        doc.set_param(CONFIG_FILE_PARAM, "myRun.properties").unwrap();
        assert_eq!(doc.config_file_name().as_deref(), Some("myRun.properties"));
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("a.properties"), "a");
        assert_eq!(stem("a"), "a");
    }

    #[test]
    fn test_set_param_rejects_line_breaks_in_value() {
        let mut doc = ConfigDocument::new("demo");
        for value in ["/data\n#BioModule pkg.seq.X", "a\rb", "tail\n"] {
            let err = doc.set_param("input.dirPaths", value).unwrap_err();
            assert!(matches!(err, ConfigError::MultiLineValue { key } if key == "input.dirPaths"));
        }
        assert!(doc.params().next().is_none());
    }

    #[test]
    fn test_set_param_rejects_keys_the_codec_cannot_carry() {
        let mut doc = ConfigDocument::new("demo");
        for key in ["", "  ", "a=b", "#comment", "#BioModule x", "a\nb"] {
            let err = doc.set_param(key, "v").unwrap_err();
            assert!(matches!(err, ConfigError::InvalidParamKey { .. }), "key {key:?}");
        }
        // Interior `#` and a `=` in the value are fine.
        doc.set_param("a#b", "x=y").unwrap();
        assert_eq!(doc.get("a#b"), Some("x=y"));
    }

    #[test]
    fn test_push_module_rejects_blank_or_padded_ids() {
        let mut doc = ConfigDocument::new("demo");
        for id in ["", " ", " pkg.seq.X", "pkg.seq.X ", "pkg.seq.X\n#BioModule y"] {
            let err = doc.push_module(id).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidModuleId { .. }), "id {id:?}");
        }
        assert!(doc.modules().is_empty());
    }

    #[test]
    fn test_from_parallel_rejects_injected_module_line() {
        let err = ConfigDocument::from_parallel(
            "demo",
            strings(&["pkg.classifier.Y"]),
            strings(&["input.dirPaths"]),
            strings(&["/data\n#BioModule pkg.seq.X"]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MultiLineValue { .. }));
    }

    #[test]
    fn test_every_buildable_document_survives_the_codec() {
        let doc = ConfigDocument::from_parallel(
            "demo.properties",
            strings(&["pkg.seq.X", "pkg.classifier.Y"]),
            strings(&["a#b", " padded", "url", "empty"]),
            strings(&["#!/bin/bash", " v ", "http://h/?a=b", ""]),
        )
        .unwrap();
        assert_eq!(decode("demo.properties", &encode(&doc)).unwrap(), doc);
    }
}
