//! # Validate Subcommand
//!
//! Loads a pack directory through the full pipeline and reports whether
//! its data, references and resources are sound.

use std::fmt::Write as _;
use std::path::PathBuf;

use apack_pack::LoadReport;
use apack_state::PackState;
use clap::Args;
use serde::Serialize;

use crate::load::{load_directory, CliConfig};
use crate::OutputOptions;

/// Arguments for the validate subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Pack directory containing the manifest.
    pub dir: PathBuf,

    /// Treat resource errors as failures.
    #[arg(long)]
    pub strict: bool,
}

/// Machine-readable validation result.
#[derive(Debug, Serialize)]
pub struct ValidationSummary {
    /// Pack namespace.
    pub namespace: String,
    /// Pack version.
    pub version: String,
    /// State the load settled in.
    pub state: PackState,
    /// Whether the pack passed.
    pub passed: bool,
    /// The load report.
    pub report: LoadReport,
}

/// Rendered output plus the verdict.
#[derive(Debug)]
pub struct ValidateOutput {
    /// Text or JSON to print.
    pub text: String,
    /// Whether the pack passed.
    pub passed: bool,
}

fn flag(value: Option<bool>) -> &'static str {
    match value {
        None => "not checked",
        Some(false) => "ok",
        Some(true) => "faulty",
    }
}

fn render_text(summary: &ValidationSummary) -> String {
    let report = &summary.report;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}: {}",
        summary.namespace, summary.version, summary.state
    );
    let _ = writeln!(
        out,
        "  data: {}, references: {}, resources: {}",
        flag(report.faulty_data),
        flag(report.faulty_references),
        flag(report.faulty_resources)
    );
    for e in &report.data_errors {
        let _ = writeln!(out, "  data error: {e}");
    }
    if report.data_errors.is_empty() {
        if let Some(e) = report.first_error.as_deref().filter(|e| e.is_fatal()) {
            let _ = writeln!(out, "  error: {e}");
        }
    }
    for e in &report.resource_errors {
        let _ = writeln!(out, "  resource error: {e}");
    }
    let _ = write!(out, "{}", if summary.passed { "PASS" } else { "FAIL" });
    out
}

/// Load the pack and render its report.
pub async fn run(
    args: &ValidateArgs,
    config: &CliConfig,
    output: &OutputOptions,
) -> anyhow::Result<ValidateOutput> {
    let loaded = load_directory(&args.dir, config).await?;
    let report = loaded.pack.report();
    let passed = loaded.state == PackState::Loaded
        && !(args.strict && report.faulty_resources == Some(true));
    let summary = ValidationSummary {
        namespace: loaded.pack.namespace().to_string(),
        version: loaded.pack.manifest().version().to_string(),
        state: loaded.state,
        passed,
        report,
    };
    let text = if output.json {
        serde_json::to_string_pretty(&summary)?
    } else {
        render_text(&summary)
    };
    loaded.pack.disable(true).await?;
    Ok(ValidateOutput { text, passed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn args(dir: &std::path::Path, strict: bool) -> ValidateArgs {
        ValidateArgs {
            dir: dir.to_path_buf(),
            strict,
        }
    }

    #[tokio::test]
    async fn sound_pack_passes() {
        let dir = fixtures::pack_dir(fixtures::ACHIEVEMENTS);
        let out = run(&args(dir.path(), true), &CliConfig::default(), &OutputOptions::default())
            .await
            .unwrap();
        assert!(out.passed, "{}", out.text);
        assert!(out.text.starts_with("tyria 1.2.0: LOADED"));
        assert!(out.text.contains("data: ok, references: ok, resources: ok"));
    }

    #[tokio::test]
    async fn broken_reference_fails() {
        let dir = fixtures::pack_dir(&fixtures::ACHIEVEMENTS.replace(".events.daily.first", ".events.daily.gone"));
        let out = run(&args(dir.path(), false), &CliConfig::default(), &OutputOptions::default())
            .await
            .unwrap();
        assert!(!out.passed);
        assert!(out.text.contains("references: faulty"));
        assert!(out.text.contains("gone"));
        assert!(out.text.ends_with("FAIL"));
    }

    #[tokio::test]
    async fn strict_mode_fails_on_missing_resources() {
        let dir = fixtures::pack_dir(fixtures::ACHIEVEMENTS);
        std::fs::remove_file(dir.path().join("resources/icons/first.png")).unwrap();

        let lenient = run(&args(dir.path(), false), &CliConfig::default(), &OutputOptions::default())
            .await
            .unwrap();
        assert!(lenient.passed);
        assert!(lenient.text.contains("resource error"));

        let strict = run(&args(dir.path(), true), &CliConfig::default(), &OutputOptions::default())
            .await
            .unwrap();
        assert!(!strict.passed);
    }

    #[tokio::test]
    async fn json_output_carries_report() {
        let dir = fixtures::pack_dir(fixtures::ACHIEVEMENTS);
        let output = OutputOptions {
            json: true,
            ..OutputOptions::default()
        };
        let out = run(&args(dir.path(), false), &CliConfig::default(), &output)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(value["state"], "LOADED");
        assert_eq!(value["report"]["faulty_data"], false);
        assert_eq!(value["namespace"], "tyria");
    }
}
