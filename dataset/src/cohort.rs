//! Patient cohort model and annotation loading
//!
//! A cohort maps patient identifiers to their outcome labels and collection
//! site. Annotation documents are JSON objects keyed by patient:
//!
//! ```json
//! { "TCGA-01": { "subtype": "LUAD", "stage": 2, "site": "A1" } }
//! ```
//!
//! Scalar values (string, number, boolean) are stored as strings. The `site`
//! attribute fills [`Patient::site`]; every other attribute is an outcome.

use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Attribute name holding a patient's collection site
pub const SITE_KEY: &str = "site";

/// Errors that can occur when building or querying a cohort
#[derive(Debug, Error)]
pub enum CohortError {
    #[error("Invalid annotations: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Patient '{patient}' attribute '{key}' is not a scalar value")]
    NonScalar { patient: String, key: String },

    #[error("Patient '{patient}' has no attribute '{key}'")]
    MissingAttribute { patient: String, key: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Outcome labels and site for a single patient
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    /// Outcome name -> categorical label
    #[serde(default)]
    pub outcomes: IndexMap<String, String>,
    /// Originating site, if annotated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

impl Patient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(mut self, key: impl Into<String>, label: impl Into<String>) -> Self {
        self.outcomes.insert(key.into(), label.into());
        self
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn outcome(&self, key: &str) -> Option<&str> {
        self.outcomes.get(key).map(String::as_str)
    }
}

/// Insertion-ordered mapping from patient id to [`Patient`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cohort {
    patients: IndexMap<String, Patient>,
}

impl Cohort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an annotations document
    pub fn from_json_str(json: &str) -> Result<Self, CohortError> {
        let raw: IndexMap<String, IndexMap<String, Value>> = serde_json::from_str(json)?;
        let mut cohort = Self::new();

        for (id, attributes) in raw {
            let mut patient = Patient::new();
            for (key, value) in attributes {
                let Some(text) = scalar_to_string(&value).ok_or_else(|| CohortError::NonScalar {
                    patient: id.clone(),
                    key: key.clone(),
                })?
                else {
                    continue;
                };
                if key == SITE_KEY {
                    patient.site = Some(text);
                } else {
                    patient.outcomes.insert(key, text);
                }
            }
            cohort.insert(id, patient);
        }

        debug!("Parsed cohort with {} patients", cohort.len());
        Ok(cohort)
    }

    /// Read and parse an annotations file
    pub fn from_json_file(path: &Path) -> Result<Self, CohortError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Add or replace a patient
    pub fn insert(&mut self, id: impl Into<String>, patient: Patient) -> Option<Patient> {
        self.patients.insert(id.into(), patient)
    }

    pub fn get(&self, id: &str) -> Option<&Patient> {
        self.patients.get(id)
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Patient ids in insertion order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.patients.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Patient)> {
        self.patients.iter().map(|(id, p)| (id.as_str(), p))
    }

    /// Label of `id` under `key`
    pub fn label(&self, id: &str, key: &str) -> Result<&str, CohortError> {
        self.get(id)
            .and_then(|p| p.outcome(key))
            .ok_or_else(|| CohortError::MissingAttribute {
                patient: id.to_string(),
                key: key.to_string(),
            })
    }

    /// Site of `id`
    pub fn site(&self, id: &str) -> Result<&str, CohortError> {
        self.get(id)
            .and_then(|p| p.site.as_deref())
            .ok_or_else(|| CohortError::MissingAttribute {
                patient: id.to_string(),
                key: SITE_KEY.to_string(),
            })
    }

    /// Distinct labels under `key`, sorted
    pub fn labels(&self, key: &str) -> Result<Vec<String>, CohortError> {
        let mut labels = BTreeSet::new();
        for id in self.ids() {
            labels.insert(self.label(id, key)?.to_string());
        }
        Ok(labels.into_iter().collect())
    }

    /// Distinct annotated sites, sorted
    pub fn sites(&self) -> Vec<String> {
        self.patients
            .values()
            .filter_map(|p| p.site.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl<S: Into<String>> FromIterator<(S, Patient)> for Cohort {
    fn from_iter<I: IntoIterator<Item = (S, Patient)>>(iter: I) -> Self {
        Self {
            patients: iter.into_iter().map(|(id, p)| (id.into(), p)).collect(),
        }
    }
}

/// `Some(None)` for null, `None` for arrays/objects
fn scalar_to_string(value: &Value) -> Option<Option<String>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) => Some(Some(s.clone())),
        Value::Number(n) => Some(Some(n.to_string())),
        Value::Bool(b) => Some(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => None,
    }
}
