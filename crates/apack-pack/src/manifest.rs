//! Pack manifest (`manifest.json` at the archive root).
//!
//! The manifest is read and validated once, when a pack is registered. A
//! pack with a rejected manifest never exists in the catalog, and the
//! accepted manifest is immutable afterwards.
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "namespace": "community.daily",
//!   "version": "1.2.0",
//!   "author": "Tyria Trackers",
//!   "name": { "en": "Daily Routines" },
//!   "description": "Things to do every day.",
//!   "dependencies": ["core"]
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use apack_core::identity;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::text::LocalizedText;

/// The only manifest format this loader understands.
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

/// A semantic version: `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    /// Incompatible changes.
    pub major: u64,
    /// Compatible additions.
    pub minor: u64,
    /// Fixes.
    pub patch: u64,
    /// Pre-release tag without the leading `-`.
    pub pre: Option<String>,
    /// Build metadata without the leading `+`.
    pub build: Option<String>,
}

impl FromStr for Version {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ManifestError::InvalidVersion {
            version: s.to_string(),
            reason: reason.to_string(),
        };

        let (rest, build) = match s.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (s, None),
        };
        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (rest, None),
        };

        let mut numbers = core.split('.');
        let mut next = |name: &str| -> Result<u64, ManifestError> {
            let part = numbers
                .next()
                .ok_or_else(|| invalid(&format!("missing {name} component")))?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(&format!("{name} component must be numeric")));
            }
            if part.len() > 1 && part.starts_with('0') {
                return Err(invalid(&format!("{name} component has a leading zero")));
            }
            part.parse()
                .map_err(|_| invalid(&format!("{name} component is too large")))
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        if numbers.next().is_some() {
            return Err(invalid("expected exactly three components"));
        }

        let check_tag = |tag: &str, what: &str| -> Result<String, ManifestError> {
            let ok = !tag.is_empty()
                && tag.split('.').all(|part| {
                    !part.is_empty() && part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
                });
            if ok {
                Ok(tag.to_string())
            } else {
                Err(invalid(&format!("malformed {what}")))
            }
        };

        Ok(Self {
            major,
            minor,
            patch,
            pre: pre.map(|p| check_tag(p, "pre-release")).transpose()?,
            build: build.map(|b| check_tag(b, "build metadata")).transpose()?,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct RawManifest {
    format_version: u32,
    version: String,
    author: String,
    namespace: String,
    name: LocalizedText,
    #[serde(default)]
    description: LocalizedText,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// A validated pack manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    format_version: u32,
    version: Version,
    author: String,
    namespace: String,
    name: LocalizedText,
    description: LocalizedText,
    dependencies: Vec<String>,
}

impl Manifest {
    /// Decode and validate manifest bytes. `path` is used in errors.
    pub fn parse(path: &str, bytes: &[u8]) -> Result<Self, ManifestError> {
        let raw: RawManifest =
            serde_json::from_slice(bytes).map_err(|e| ManifestError::Malformed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        if raw.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ManifestError::UnsupportedFormat {
                found: raw.format_version,
                supported: SUPPORTED_FORMAT_VERSION,
            });
        }
        let version: Version = raw.version.parse()?;
        if raw.author.trim().is_empty() {
            return Err(ManifestError::EmptyField { field: "author" });
        }
        if raw.namespace.is_empty() {
            return Err(ManifestError::EmptyField { field: "namespace" });
        }
        check_namespace(&raw.namespace)?;
        if raw.name.is_blank() {
            return Err(ManifestError::EmptyField { field: "name" });
        }
        for dependency in &raw.dependencies {
            check_namespace(dependency)?;
        }

        Ok(Self {
            format_version: raw.format_version,
            version,
            author: raw.author,
            namespace: raw.namespace,
            name: raw.name,
            description: raw.description,
            dependencies: raw.dependencies,
        })
    }

    /// Manifest format version.
    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Pack version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Pack author.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Root namespace of every object in the pack.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Display name.
    pub fn name(&self) -> &LocalizedText {
        &self.name
    }

    /// Display description.
    pub fn description(&self) -> &LocalizedText {
        &self.description
    }

    /// Namespaces that must be loaded before this pack resolves.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

fn check_namespace(namespace: &str) -> Result<(), ManifestError> {
    identity::validate_namespace(namespace).map_err(|e| ManifestError::InvalidNamespace {
        namespace: namespace.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(format_version: u32, version: &str, author: &str, namespace: &str) -> Vec<u8> {
        serde_json::json!({
            "format_version": format_version,
            "version": version,
            "author": author,
            "namespace": namespace,
            "name": {"en": "Daily Routines"},
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn accepts_valid_manifest() {
        let m = Manifest::parse("manifest.json", &manifest(1, "1.2.0", "me", "community.daily"))
            .unwrap();
        assert_eq!(m.namespace(), "community.daily");
        assert_eq!(m.version().minor, 2);
        assert_eq!(m.name().get("de"), Some("Daily Routines"));
        assert!(m.dependencies().is_empty());
    }

    #[test]
    fn rejects_unsupported_format() {
        let err = Manifest::parse("manifest.json", &manifest(2, "1.0.0", "me", "core")).unwrap_err();
        assert_eq!(
            err,
            ManifestError::UnsupportedFormat {
                found: 2,
                supported: 1
            }
        );
    }

    #[test]
    fn rejects_empty_author_and_namespace() {
        assert_eq!(
            Manifest::parse("m", &manifest(1, "1.0.0", " ", "core")).unwrap_err(),
            ManifestError::EmptyField { field: "author" }
        );
        assert_eq!(
            Manifest::parse("m", &manifest(1, "1.0.0", "me", "")).unwrap_err(),
            ManifestError::EmptyField { field: "namespace" }
        );
        assert!(matches!(
            Manifest::parse("m", &manifest(1, "1.0.0", "me", "bad name")),
            Err(ManifestError::InvalidNamespace { .. })
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Manifest::parse("m", b"{ not json"),
            Err(ManifestError::Malformed { .. })
        ));
        assert!(matches!(
            Manifest::parse("m", br#"{"format_version": 1}"#),
            Err(ManifestError::Malformed { .. })
        ));
    }

    #[test]
    fn version_parsing() {
        let v: Version = "1.0.0-beta.2+build.7".parse().unwrap();
        assert_eq!(v.pre.as_deref(), Some("beta.2"));
        assert_eq!(v.build.as_deref(), Some("build.7"));
        assert_eq!(v.to_string(), "1.0.0-beta.2+build.7");

        for bad in ["1.0", "1.0.0.0", "01.0.0", "1.x.0", "1.0.0-", "", "1.0.0+a..b"] {
            assert!(bad.parse::<Version>().is_err(), "{bad} should be rejected");
        }
    }
}
