//! # Inspect Subcommand
//!
//! Prints the object outline of a loaded pack, or the details of one
//! object when `--reference` is given.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::bail;
use apack_core::identity;
use apack_pack::{AchievementStatus, OutlineEntry, Pack};
use apack_state::PackState;
use clap::Args;
use serde::Serialize;

use crate::load::{load_directory, CliConfig};
use crate::OutputOptions;

/// Arguments for the inspect subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Pack directory containing the manifest.
    pub dir: PathBuf,

    /// Full name of one object; a leading `.` is relative to the pack.
    #[arg(long)]
    pub reference: Option<String>,
}

/// One outline line with its name rendered in the requested language.
#[derive(Debug, Serialize)]
pub struct OutlineLine {
    /// Full name.
    pub full_name: String,
    /// Object kind.
    pub kind: &'static str,
    /// Localized display name.
    pub name: String,
    /// Distance from the pack root.
    pub depth: usize,
    /// Progress, for achievements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AchievementStatus>,
}

fn line(pack: &Pack, entry: OutlineEntry, lang: &str) -> OutlineLine {
    let status = match entry.kind {
        "achievement" => pack.achievement_status(&entry.full_name).ok(),
        _ => None,
    };
    OutlineLine {
        name: entry.name.get_or_empty(lang).to_string(),
        full_name: entry.full_name,
        kind: entry.kind,
        depth: entry.depth,
        status,
    }
}

fn render_line(out: &mut String, line: &OutlineLine) {
    let _ = write!(
        out,
        "{:indent$}{} [{}] {}",
        "",
        line.name,
        line.kind,
        line.full_name,
        indent = line.depth * 2
    );
    if let Some(status) = &line.status {
        let _ = write!(
            out,
            " ({}/{} objectives, {} points{})",
            status.completed_objectives,
            status.total_objectives,
            status.points,
            if status.locked { ", locked" } else { "" }
        );
    }
    out.push('\n');
}

fn render_details(out: &mut String, line: &OutlineLine) {
    let _ = writeln!(out, "{}", line.full_name);
    let _ = writeln!(out, "  kind: {}", line.kind);
    let _ = writeln!(out, "  name: {}", line.name);
    if let Some(status) = &line.status {
        let tier = status
            .tier
            .map_or_else(|| "none".to_string(), |t| (t + 1).to_string());
        let _ = writeln!(
            out,
            "  objectives: {}/{}",
            status.completed_objectives, status.total_objectives
        );
        let _ = writeln!(out, "  tier: {tier}");
        let _ = writeln!(out, "  points: {}", status.points);
        let _ = writeln!(out, "  locked: {}", status.locked);
        let _ = writeln!(out, "  completed: {}", status.completed);
        let _ = writeln!(out, "  tracked: {}", status.tracked);
    }
}

/// Load the pack and render its outline or one object.
pub async fn run(
    args: &InspectArgs,
    config: &CliConfig,
    output: &OutputOptions,
) -> anyhow::Result<String> {
    let loaded = load_directory(&args.dir, config).await?;
    let pack = &loaded.pack;
    if loaded.state != PackState::Loaded {
        let reason = pack
            .report()
            .first_error
            .map_or_else(|| "unknown error".to_string(), |e| e.to_string());
        bail!("pack {} did not load ({}): {reason}", pack.namespace(), loaded.state);
    }

    let mut lines: Vec<OutlineLine> = pack
        .outline()
        .into_iter()
        .map(|entry| line(pack, entry, &output.lang))
        .collect();
    if let Some(reference) = &args.reference {
        let full_name = identity::qualify(pack.namespace(), reference);
        lines.retain(|l| l.full_name == full_name);
        if lines.is_empty() {
            bail!("no object named {full_name} in pack {}", pack.namespace());
        }
    }

    let text = if output.json {
        serde_json::to_string_pretty(&lines)? + "\n"
    } else {
        let mut out = String::new();
        match (&args.reference, lines.first()) {
            (Some(_), Some(first)) => render_details(&mut out, first),
            _ => lines.iter().for_each(|l| render_line(&mut out, l)),
        }
        out
    };
    pack.disable(true).await?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn args(dir: &std::path::Path, reference: Option<&str>) -> InspectArgs {
        InspectArgs {
            dir: dir.to_path_buf(),
            reference: reference.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn outline_lists_every_object() {
        let dir = fixtures::pack_dir(fixtures::ACHIEVEMENTS);
        let text = run(&args(dir.path(), None), &CliConfig::default(), &OutputOptions::default())
            .await
            .unwrap();
        assert_eq!(text.lines().count(), 8);
        assert!(text.starts_with("Tyria [pack] tyria"));
        assert!(text.contains("      First Steps [achievement] tyria.events.daily.first (0/2 objectives, 0 points)"));
        assert!(text.contains("tyria.events.daily.second (0/1 objectives, 0 points, locked)"));
    }

    #[tokio::test]
    async fn names_follow_the_requested_language() {
        let dir = fixtures::pack_dir(fixtures::ACHIEVEMENTS);
        let output = OutputOptions {
            json: false,
            lang: "de".into(),
        };
        let text = run(&args(dir.path(), None), &CliConfig::default(), &output)
            .await
            .unwrap();
        assert!(text.contains("Erste Schritte"));
        // No German name: falls back to English.
        assert!(text.contains("Second Wind"));
    }

    #[tokio::test]
    async fn relative_reference_shows_details() {
        let dir = fixtures::pack_dir(fixtures::ACHIEVEMENTS);
        let text = run(
            &args(dir.path(), Some(".events.daily.second")),
            &CliConfig::default(),
            &OutputOptions::default(),
        )
        .await
        .unwrap();
        assert!(text.starts_with("tyria.events.daily.second\n"));
        assert!(text.contains("  tier: none"));
        assert!(text.contains("  locked: true"));
    }

    #[tokio::test]
    async fn unknown_reference_is_an_error() {
        let dir = fixtures::pack_dir(fixtures::ACHIEVEMENTS);
        let err = run(
            &args(dir.path(), Some("tyria.events.weekly")),
            &CliConfig::default(),
            &OutputOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("tyria.events.weekly"));
    }

    #[tokio::test]
    async fn failed_pack_cannot_be_inspected() {
        let dir = fixtures::pack_dir(&fixtures::ACHIEVEMENTS.replace("map_id: 50", "map_id: -1"));
        let err = run(&args(dir.path(), None), &CliConfig::default(), &OutputOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not load"));
    }

    #[tokio::test]
    async fn json_outline_includes_status() {
        let dir = fixtures::pack_dir(fixtures::ACHIEVEMENTS);
        let output = OutputOptions {
            json: true,
            ..OutputOptions::default()
        };
        let text = run(&args(dir.path(), Some(".events.daily.first")), &CliConfig::default(), &output)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["kind"], "achievement");
        assert_eq!(value[0]["status"]["total_objectives"], 2);
    }
}
