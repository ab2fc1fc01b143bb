//! Command-line tests for blj-web.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn blj_web() -> Command {
    let mut cmd = cargo_bin_cmd!("blj-web");
    for var in ["BLJ", "HOST_BLJ", "BLJ_CONFIG", "BLJ_PROJ", "BLJ_LOG_DIR", "BLJ_WEB_SETTINGS"] {
        cmd.env_remove(var);
    }
    cmd
}

const GLOBALS: &str = "\
input.dirPaths=/data/seqs
report.taxonomyLevels=phylum,genus
script.permissions=770
script.defaultHeader=#!/bin/bash
demultiplexer.strategy=do_not_demux
pipeline.env=local
";

fn write_config(dir: &TempDir, name: &str, modules: &[&str]) -> std::path::PathBuf {
    let mut text = String::new();
    for module in modules {
        text.push_str(&format!("#BioModule {module}\n"));
    }
    text.push_str(GLOBALS);
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        blj_web()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("check"));
    }

    #[test]
    fn test_version() {
        blj_web().arg("--version").assert().success();
    }

    #[test]
    fn test_missing_explicit_settings_file_fails() {
        let dir = TempDir::new().unwrap();
        blj_web()
            .current_dir(dir.path())
            .args(["--settings", "nope.toml", "catalog"])
            .assert()
            .failure();
    }
}

mod catalog {
    use super::*;

    #[test]
    fn test_catalog_lists_modules_by_category() {
        blj_web()
            .arg("catalog")
            .assert()
            .success()
            .stdout(predicate::str::contains("[seq]"))
            .stdout(predicate::str::contains("biolockj.module.seq.Rarefier"))
            .stdout(predicate::str::contains("kraken.db"));
    }

    #[test]
    fn test_catalog_json_is_parseable() {
        let output = blj_web().args(["catalog", "--json"]).output().unwrap();
        assert!(output.status.success());
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert!(value.as_array().is_some_and(|a| !a.is_empty()));
    }
}

mod check {
    use super::*;

    #[test]
    fn test_valid_config_prints_launch_command() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "run1.properties",
            &[
                "biolockj.module.seq.Gunzipper",
                "biolockj.module.classifier.wgs.MetaphlanClassifier",
            ],
        );

        blj_web()
            .current_dir(dir.path())
            .arg("check")
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("Valid"))
            .stdout(predicate::str::contains("biolockj -i=/data/seqs -c="))
            .stdout(predicate::str::contains("run1.properties --docker"));
    }

    #[test]
    fn test_out_of_order_config_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "run2.properties",
            &[
                "biolockj.module.classifier.wgs.MetaphlanClassifier",
                "biolockj.module.seq.Gunzipper",
            ],
        );

        blj_web()
            .current_dir(dir.path())
            .arg("check")
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("InvalidModuleOrder"));
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.properties");
        fs::write(&path, "#BioModule biolockj.module.seq.Gunzipper\nnot a pair\n").unwrap();

        blj_web()
            .current_dir(dir.path())
            .arg("check")
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("line 2"));
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        blj_web()
            .current_dir(dir.path())
            .args(["check", "absent.properties"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read"));
    }
}
