use serde::{Deserialize, Serialize};

/// Face descriptor vector (128-dimensional for the usual face-api models).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
    /// Embedding model that produced this descriptor, if the client reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Dimensionality of the descriptor.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Euclidean distance to `other`. Callers must check dimensions first.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// One gallery entry: an identity and its enrolled descriptor.
///
/// The descriptor is optional because an account may exist without a face
/// (e.g. after the face was forgotten); such records never match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub identity: String,
    pub descriptor: Option<Descriptor>,
}

impl EnrollmentRecord {
    pub fn new(identity: impl Into<String>, descriptor: impl Into<Option<Descriptor>>) -> Self {
        Self {
            identity: identity.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// Result of matching a probe descriptor against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDecision {
    /// Identity of the accepted candidate (if any).
    pub identity: Option<String>,
    /// Similarity of the accepted candidate, or the best similarity observed
    /// when nothing cleared the threshold.
    pub similarity: f32,
}

impl MatchDecision {
    pub fn matched(&self) -> bool {
        self.identity.is_some()
    }
}
