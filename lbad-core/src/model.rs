//! Reference models and classification results

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::characteristics::CharacteristicsVector;

/// A known, non-anomalous object shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub label: String,
    pub reference: CharacteristicsVector,
    /// Largest distance still accepted as a match
    pub threshold: f32,
}

impl Model {
    pub fn new(label: impl Into<String>, reference: CharacteristicsVector, threshold: f32) -> Self {
        Self {
            label: label.into(),
            reference,
            threshold,
        }
    }
}

/// An immutable set of models, unique by label.
///
/// Mutating operations return a new set; detectors publish sets as shared
/// snapshots so readers never observe a partial update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSet {
    models: Vec<Model>,
}

impl ModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set; a later model replaces an earlier one with the same label
    pub fn from_models<I: IntoIterator<Item = Model>>(models: I) -> Self {
        let mut set = Self::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for model in models {
            match positions.get(&model.label) {
                Some(&index) => set.models[index] = model,
                None => {
                    positions.insert(model.label.clone(), set.models.len());
                    set.models.push(model);
                }
            }
        }
        set
    }

    /// Copy of this set with `model` added, or replacing the model with the same label
    pub fn with_model(&self, model: Model) -> Self {
        let mut models = self.models.clone();
        match models.iter_mut().find(|m| m.label == model.label) {
            Some(existing) => *existing = model,
            None => models.push(model),
        }
        Self { models }
    }

    pub fn get(&self, label: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.label == label)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Model> {
        self.models.iter()
    }

    pub fn as_slice(&self) -> &[Model] {
        &self.models
    }
}

impl<'a> IntoIterator for &'a ModelSet {
    type Item = &'a Model;
    type IntoIter = std::slice::Iter<'a, Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.iter()
    }
}

/// Outcome of comparing one object against the model set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Label of the closest model, `None` when there was nothing to compare against
    pub matched: Option<String>,
    /// Distance to the closest model; `+inf` when unmatched
    pub score: f32,
    pub is_anomaly: bool,
}

impl AnomalyResult {
    /// Result for an object that could not be matched against any model
    pub fn unmatched() -> Self {
        Self {
            matched: None,
            score: f32::INFINITY,
            is_anomaly: true,
        }
    }

    /// Matched label, or `"none"`
    pub fn label(&self) -> &str {
        self.matched.as_deref().unwrap_or("none")
    }
}

/// An [`AnomalyResult`] tied to the frame it was computed from
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub sequence: u64,
    pub frame_start: Duration,
    pub result: AnomalyResult,
}
