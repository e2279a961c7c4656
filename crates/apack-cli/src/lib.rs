//! # apack-cli: Content Pack Command-Line Interface
//!
//! ## Subcommands
//!
//! - `validate`: load a pack directory and print its load report
//! - `inspect`: print the object outline of a loaded pack, or the progress
//!   of one object
//!
//! ## Crate Policy
//!
//! - Argument parsing lives in the binary and the `*Args` structs; handlers
//!   delegate to `apack-pack` and only render results.
//! - Handlers return rendered text so output can be tested without a
//!   terminal.

pub mod inspect;
pub mod load;
pub mod validate;

/// Output settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Render JSON instead of text.
    pub json: bool,
    /// Preferred language for localized names.
    pub lang: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            json: false,
            lang: apack_pack::text::FALLBACK_LANGUAGE.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use tempfile::TempDir;

    pub const ACHIEVEMENTS: &str = r#"
categories:
  - id: events
    name: { en: Events, de: Ereignisse }
    collections:
      - id: daily
        name: Daily
        achievements:
          - id: first
            name: { en: First Steps, de: Erste Schritte }
            icon: icons/first.png
            tiers: [ { count: 1, points: 5 }, { count: 2, points: 10 } ]
            objectives:
              - id: visit
                name: "Visit Lion's Arch"
                condition: { action: { type: map, map_id: 50 } }
              - id: wave
                name: Wave
                condition: { action: { type: manual } }
          - id: second
            name: Second Wind
            prerequisites: [ ".events.daily.first" ]
            tiers: [ { count: 1, points: 10 } ]
            objectives:
              - id: after
                name: Finish First Steps
                condition: { action: { type: achievement, achievement: ".events.daily.first" } }
"#;

    /// A pack directory with one YAML data file and one icon.
    pub fn pack_dir(data: &str) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(
            root.join("manifest.json"),
            r#"{"format_version": 1, "namespace": "tyria", "version": "1.2.0",
                "author": "Tyria Trackers", "name": {"en": "Tyria", "de": "Tyria"}}"#,
        )
        .unwrap();
        std::fs::create_dir_all(root.join("data")).unwrap();
        std::fs::write(root.join("data/daily.yaml"), data).unwrap();
        std::fs::create_dir_all(root.join("resources/icons")).unwrap();
        std::fs::write(root.join("resources/icons/first.png"), [0x89, b'P', b'N', b'G']).unwrap();
        dir
    }
}
