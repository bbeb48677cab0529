use jobs::{AnalysisKind, LayerChoice};

use crate::kind::ParamField;

/// Errors that leave a panel unusable for the rest of its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelError {
    /// Task metadata could not be loaded. Carries the transport detail.
    MetadataLoad(String),
    NoLayersAvailable { kind: AnalysisKind },
}

impl std::fmt::Display for PanelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanelError::MetadataLoad(_) => f.write_str(
                "Cannot retrieve information for task. Are you connected to the internet?",
            ),
            PanelError::NoLayersAvailable { kind } => write!(
                f,
                "No DSM or DTM is available. To compute a {kind}, make sure to process a task \
                 with either the --dsm or --dtm option checked."
            ),
        }
    }
}

impl std::error::Error for PanelError {}

/// A panel operation refused because of the panel's current state or inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum InputError {
    /// Metadata not loaded yet, or the panel is in a permanent error.
    NotReady,
    /// A computation is already in flight.
    Busy,
    UnknownLayer(LayerChoice),
    UnsupportedField(ParamField),
    InvalidValue { field: &'static str, value: f64 },
    /// The analysis needs a picked point first.
    MissingPoint,
    PickingUnsupported,
    Disposed,
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputError::NotReady => f.write_str("panel is not ready"),
            InputError::Busy => f.write_str("a computation is already running"),
            InputError::UnknownLayer(layer) => write!(f, "{layer} is not available for this task"),
            InputError::UnsupportedField(field) => {
                write!(f, "{} does not apply to this analysis", field.key())
            }
            InputError::InvalidValue { field, value } => write!(f, "invalid {field}: {value}"),
            InputError::MissingPoint => f.write_str("pick a point on the map first"),
            InputError::PickingUnsupported => f.write_str("this analysis does not use a point"),
            InputError::Disposed => f.write_str("panel has been disposed"),
        }
    }
}

impl std::error::Error for InputError {}
