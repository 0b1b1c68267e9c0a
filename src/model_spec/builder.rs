use std::collections::BTreeMap;

use strum::IntoEnumIterator;

use super::validate::{SpecError, validate_sections};
use super::{Entry, ModelSpec, Section, SectionKind, ValueObject};

/// Default allowed deviation from one in probability row sums
pub const DEFAULT_PROB_TOLERANCE: f64 = 1e-6;

/// Accumulates specification entries, then validates them into a `ModelSpec`
///
/// Entries are routed to the section for their kind and keep their append order within that
/// section.
///
pub struct ModelSpecBuilder {
    sections: Vec<Section>,
    cardinalities: BTreeMap<String, usize>,
    tolerance: f64,
}

impl ModelSpecBuilder {
    pub fn new() -> Self {
        Self {
            sections: SectionKind::iter()
                .map(|kind| Section {
                    kind,
                    entries: Vec::new(),
                })
                .collect(),
            cardinalities: BTreeMap::new(),
            tolerance: DEFAULT_PROB_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the value of a cardinality symbol so that table shapes and tree values can be checked
    /// against it
    pub fn define_cardinality(&mut self, symbol: &str, value: usize) -> &mut Self {
        self.cardinalities.insert(symbol.to_string(), value);
        self
    }

    pub fn append(&mut self, name: &str, value: impl Into<ValueObject>) -> &mut Self {
        let value = value.into();
        let section = &mut self.sections[value.kind() as usize];
        section.entries.push(Entry {
            name: name.to_string(),
            value,
        });
        self
    }

    /// Validate all entries and return the finished specification
    pub fn build(self) -> Result<ModelSpec, SpecError> {
        validate_sections(&self.sections, &self.cardinalities, self.tolerance)?;
        let sections = self
            .sections
            .into_iter()
            .filter(|x| !x.entries.is_empty())
            .collect();
        Ok(ModelSpec { sections })
    }
}

impl Default for ModelSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}
