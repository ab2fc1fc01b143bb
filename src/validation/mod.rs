//! Completeness and ordering checks run before a pipeline may launch.
//!
//! Checks run in a fixed sequence and stop at the first failure:
//!
//! | Step | Check | Failure |
//! |------|-------|---------|
//! | 1 | at least one module | `NoModuleSelected` |
//! | 2 | global parameters present | `MissingRequiredParameter` |
//! | 3 | barcode column for barcode demultiplexing | `ConditionalRequirementUnmet` |
//! | 4 | modules known, their parameters present | `UnknownModule`, `MissingRequiredParameter` |
//! | 5 | one module per exclusion group | `ExclusionGroupConflict` |
//! | 6 | phase order | `InvalidModuleOrder` |

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::{Category, ModuleCatalog};
use crate::document::ConfigDocument;

/// Parameters every pipeline needs, in the order they are checked.
pub const GLOBAL_REQUIRED: &[(&str, &str)] = &[
    ("input.dirPaths", "What is your sequence input directory path?"),
    (
        "report.taxonomyLevels",
        "What taxonomy levels would you like in the report?",
    ),
    ("script.permissions", "What are the script permissions?"),
    ("script.defaultHeader", "What are the script default headers?"),
    (
        "demultiplexer.strategy",
        "What demultiplexing strategy do you want to use?",
    ),
    (
        "pipeline.env",
        "In which environment do you wish to run this project?",
    ),
];

pub const BARCODE_STRATEGIES: &[&str] = &["barcode_in_header", "barcode_in_seq"];
pub const BARCODE_COLUMN_PARAM: &str = "metadata.barcodeColumn";

/// Categories that may not appear after a module of the key category.
const DISALLOWED_AFTER: &[(Category, &[Category])] = &[
    (Category::Classifier, &[Category::Seq]),
    (
        Category::ImplicitParser,
        &[Category::Seq, Category::Classifier],
    ),
    (
        Category::Report,
        &[Category::Seq, Category::Classifier, Category::ImplicitParser],
    ),
    (
        Category::R,
        &[Category::Seq, Category::Classifier, Category::ImplicitParser],
    ),
];

fn disallowed_after(category: Category) -> &'static [Category] {
    DISALLOWED_AFTER
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, later)| *later)
        .unwrap_or(&[])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationKind {
    NoModuleSelected,
    MissingRequiredParameter,
    ConditionalRequirementUnmet,
    UnknownModule,
    ExclusionGroupConflict,
    InvalidModuleOrder,
}

/// The first rule a document broke.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ValidationFailure {
    pub kind: ValidationKind,
    pub offending_module: Option<String>,
    pub offending_parameter: Option<String>,
    pub message: String,
}

impl ValidationFailure {
    pub fn missing_parameter(module: Option<&str>, param: &str) -> Self {
        let message = match module {
            Some(module) => format!("Module {module} requires parameter {param}"),
            None => format!("Required parameter {param} is missing"),
        };
        Self {
            kind: ValidationKind::MissingRequiredParameter,
            offending_module: module.map(str::to_string),
            offending_parameter: Some(param.to_string()),
            message,
        }
    }

    fn with_prompt(mut self, prompt: &str) -> Self {
        if !prompt.is_empty() {
            self.message = format!("{}: {}", self.message, prompt);
        }
        self
    }

    fn module(kind: ValidationKind, module: &str, message: String) -> Self {
        Self {
            kind,
            offending_module: Some(module.to_string()),
            offending_parameter: None,
            message,
        }
    }
}

pub struct OrderingValidator<'a> {
    catalog: &'a ModuleCatalog,
}

impl<'a> OrderingValidator<'a> {
    pub fn new(catalog: &'a ModuleCatalog) -> Self {
        Self { catalog }
    }

    pub fn validate(&self, doc: &ConfigDocument) -> Result<(), ValidationFailure> {
        if doc.modules().is_empty() {
            return Err(ValidationFailure {
                kind: ValidationKind::NoModuleSelected,
                offending_module: None,
                offending_parameter: None,
                message: "Please select at least one module".to_string(),
            });
        }

        for (param, prompt) in GLOBAL_REQUIRED {
            if doc.get_non_empty(param).is_none() {
                return Err(ValidationFailure::missing_parameter(None, param).with_prompt(prompt));
            }
        }

        self.check_barcode_column(doc)?;
        self.check_module_requirements(doc)?;
        self.check_exclusion_groups(doc)?;
        self.check_order(doc)
    }

    fn check_barcode_column(&self, doc: &ConfigDocument) -> Result<(), ValidationFailure> {
        let strategy = doc.get("demultiplexer.strategy").unwrap_or_default().trim();
        if BARCODE_STRATEGIES.contains(&strategy) && doc.get_non_empty(BARCODE_COLUMN_PARAM).is_none()
        {
            return Err(ValidationFailure {
                kind: ValidationKind::ConditionalRequirementUnmet,
                offending_module: None,
                offending_parameter: Some(BARCODE_COLUMN_PARAM.to_string()),
                message: format!(
                    "Demultiplexer strategy {strategy} requires {BARCODE_COLUMN_PARAM}"
                ),
            });
        }
        Ok(())
    }

    fn check_module_requirements(&self, doc: &ConfigDocument) -> Result<(), ValidationFailure> {
        for module in doc.modules() {
            let descriptor = self.catalog.resolve(module).map_err(|_| {
                ValidationFailure::module(
                    ValidationKind::UnknownModule,
                    module,
                    format!("Unknown module {module}"),
                )
            })?;
            if let Some(req) = descriptor.required_params.iter().find(|r| !r.is_met(doc)) {
                return Err(
                    ValidationFailure::missing_parameter(Some(module), req.key())
                        .with_prompt(req.prompt()),
                );
            }
        }
        Ok(())
    }

    fn check_exclusion_groups(&self, doc: &ConfigDocument) -> Result<(), ValidationFailure> {
        let mut active: HashMap<&str, &str> = HashMap::new();
        for module in doc.modules() {
            let Ok(descriptor) = self.catalog.resolve(module) else {
                continue;
            };
            let Some(group) = descriptor.exclusion_group.as_deref() else {
                continue;
            };
            if let Some(first) = active.get(group) {
                return Err(ValidationFailure::module(
                    ValidationKind::ExclusionGroupConflict,
                    module,
                    format!("Module {module} cannot be combined with {first}"),
                ));
            }
            active.insert(group, module);
        }
        Ok(())
    }

    fn check_order(&self, doc: &ConfigDocument) -> Result<(), ValidationFailure> {
        let mut seen: Vec<(&str, Category)> = Vec::new();
        for module in doc.modules() {
            let Ok(descriptor) = self.catalog.resolve(module) else {
                continue;
            };
            let category = descriptor.category;
            if let Some((earlier, earlier_category)) = seen
                .iter()
                .find(|(_, c)| disallowed_after(*c).contains(&category))
            {
                return Err(ValidationFailure::module(
                    ValidationKind::InvalidModuleOrder,
                    module,
                    format!(
                        "{category} module {module} cannot run after {earlier_category} module {earlier}"
                    ),
                ));
            }
            seen.push((module, category));
        }
        Ok(())
    }
}
