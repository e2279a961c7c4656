//! Load outcome reporting.

use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::error::{FormatError, PackError, ResourceError};

/// What happened during the last load of a pack.
///
/// The three flags are tri-state: `None` means the step producing them
/// never ran (for example, references are not evaluated when the data is
/// already faulty).
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Data files failed to parse or validate.
    pub faulty_data: Option<bool>,
    /// A reference could not be resolved.
    pub faulty_references: Option<bool>,
    /// A resource could not be loaded.
    pub faulty_resources: Option<bool>,
    /// The first error captured, fatal or not.
    #[serde(serialize_with = "serialize_error")]
    pub first_error: Option<Arc<PackError>>,
    /// Every data error collected before the fatal abort.
    #[serde(serialize_with = "serialize_display_list")]
    pub data_errors: Vec<FormatError>,
    /// Every aggregated resource error.
    #[serde(serialize_with = "serialize_display_list")]
    pub resource_errors: Vec<ResourceError>,
}

fn serialize_error<S: Serializer>(error: &Option<Arc<PackError>>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

#[allow(clippy::ptr_arg)]
fn serialize_display_list<S, E>(errors: &Vec<E>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    E: std::fmt::Display,
{
    s.collect_seq(errors.iter().map(ToString::to_string))
}

impl LoadReport {
    /// Remember `error` if it is the first one. Returns the shared handle.
    pub fn record_error(&mut self, error: PackError) -> Arc<PackError> {
        let error = Arc::new(error);
        if self.first_error.is_none() {
            self.first_error = Some(Arc::clone(&error));
        }
        error
    }

    /// Whether every evaluated flag is false and nothing failed.
    pub fn is_clean(&self) -> bool {
        self.first_error.is_none()
            && [self.faulty_data, self.faulty_references, self.faulty_resources]
                .iter()
                .all(|flag| *flag != Some(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_sticks() {
        let mut report = LoadReport::default();
        assert!(report.is_clean());
        report.record_error(PackError::NoRuntime);
        report.record_error(PackError::UnknownObject("x".into()));
        assert!(matches!(
            report.first_error.as_deref(),
            Some(PackError::NoRuntime)
        ));
        assert!(!report.is_clean());
    }

    #[test]
    fn serializes_errors_as_text() {
        let mut report = LoadReport {
            faulty_resources: Some(true),
            ..LoadReport::default()
        };
        report.resource_errors.push(ResourceError::Missing {
            path: "icons/a.png".into(),
            owner: "core.a.b.c".into(),
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["faulty_resources"], true);
        assert_eq!(json["faulty_data"], serde_json::Value::Null);
        assert!(json["resource_errors"][0].as_str().unwrap().contains("icons/a.png"));
    }
}
