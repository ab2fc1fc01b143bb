//! Module listing: `blj-web catalog`.

use anyhow::Result;
use blj_web::catalog::{Category, ModuleCatalog};

pub fn cmd_catalog(json: bool) -> Result<()> {
    let catalog = ModuleCatalog::builtin();

    if json {
        let modules: Vec<_> = catalog.iter().collect();
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }

    for category in Category::ALL {
        let modules: Vec<_> = catalog.by_category(category).collect();
        if modules.is_empty() {
            continue;
        }
        println!("[{}]", category);
        for module in modules {
            let mut line = format!("  {}", module.id);
            if let Some(group) = &module.exclusion_group {
                line.push_str(&format!("  (one {} only)", group));
            }
            if !module.required_params.is_empty() {
                let keys: Vec<_> = module.required_params.iter().map(|r| r.key()).collect();
                line.push_str(&format!("  requires: {}", keys.join(", ")));
            }
            println!("{}", line);
        }
        println!();
    }
    Ok(())
}
