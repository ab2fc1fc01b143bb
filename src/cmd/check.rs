//! Offline config check: `blj-web check <config-file>`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use blj_web::catalog::ModuleCatalog;
use blj_web::document::flat_file;
use blj_web::launch::LaunchAction;
use blj_web::settings::ServerSettings;
use blj_web::validation::OrderingValidator;

/// Decode and validate a flat file, then print the argv a launch would use.
pub fn cmd_check(settings: &ServerSettings, config_file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(config_file)
        .with_context(|| format!("Failed to read {}", config_file.display()))?;
    let file_name = config_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let doc = flat_file::decode(&file_name, &text)
        .with_context(|| format!("Failed to parse {}", config_file.display()))?;

    println!(
        "{}: {} modules, {} parameters",
        config_file.display(),
        doc.modules().len(),
        doc.params().count()
    );

    if let Err(failure) = OrderingValidator::new(ModuleCatalog::builtin()).validate(&doc) {
        if let Some(module) = &failure.offending_module {
            println!("  module:    {}", module);
        }
        if let Some(param) = &failure.offending_parameter {
            println!("  parameter: {}", param);
        }
        bail!("Invalid config ({:?}): {}", failure.kind, failure.message);
    }

    let local = std::path::absolute(config_file)
        .with_context(|| format!("Failed to resolve {}", config_file.display()))?;
    let config_path = settings.launch_config_path(&file_name, &local);
    let command = settings
        .launch_builder()
        .build(&doc, Some(&config_path), LaunchAction::LaunchNew, None)?;

    println!("Valid. Launch command:");
    println!("  {}", command);
    Ok(())
}
