use core::fmt;

/// Identifier of one stochastic trace of an ensemble.
///
/// Ensembles published as HDF5 use integer realization numbers, others use
/// free-form labels; both are kept in their textual form so that ids survive
/// every stage without renumbering.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RealizationId(String);

impl RealizationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the id, if it is an integer realization number.
    pub fn number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Debug for RealizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RealizationId({})", self.0)
    }
}

impl fmt::Display for RealizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RealizationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RealizationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<usize> for RealizationId {
    fn from(value: usize) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for RealizationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build `count` integer realization ids starting at zero.
pub fn numbered_realizations(count: usize) -> Vec<RealizationId> {
    (0..count).map(RealizationId::from).collect()
}
