//! Errors reported while building forms and binding them to cell accessors.
use crate::shape::Shape;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Failures detected while constructing or initializing a weak form.
///
/// None of these are transient: each indicates a malformed weak-form definition or an operation
/// that is not available for the given configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// Two quantities with incompatible shapes were combined, or a derivative operator was
    /// applied to a quantity of the wrong rank.
    ShapeMismatch {
        left: Shape,
        right: Option<Shape>,
        operation: &'static str,
    },
    /// A functional's valuedness disagrees with the basis the accessor provides for its slot.
    BasisMismatch {
        slot: usize,
        functional: String,
        basis_rank: usize,
    },
    /// The requested operation is not implemented for this configuration.
    UnsupportedConfiguration(String),
    /// A programming-contract violation between the engine and its collaborators.
    InternalConsistency(String),
}

impl FormError {
    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedConfiguration(message.into())
    }
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch {
                left,
                right: Some(right),
                operation,
            } => {
                write!(f, "Shape mismatch in {}: {} is incompatible with {}", operation, left, right)
            }
            Self::ShapeMismatch {
                left,
                right: None,
                operation,
            } => {
                write!(f, "Shape mismatch in {}: not applicable to {}", operation, left)
            }
            Self::BasisMismatch {
                slot,
                functional,
                basis_rank,
            } => {
                let basis = if *basis_rank > 0 { "vector valued" } else { "scalar valued" };
                write!(
                    f,
                    "Basis mismatch in slot {}: {} is incompatible with the {} finite element",
                    slot, functional, basis
                )
            }
            Self::UnsupportedConfiguration(message) => write!(f, "Not implemented for this configuration: {}", message),
            Self::InternalConsistency(message) => write!(f, "Internal error: {}", message),
        }
    }
}

impl Error for FormError {}
