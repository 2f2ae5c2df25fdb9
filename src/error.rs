//! Error types for miniflow

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid tensor data: expected {expected} elements, got {got}")]
    InvalidData { expected: usize, got: usize },

    #[error("{op} does not implement {pass}")]
    Unimplemented { op: &'static str, pass: &'static str },

    #[error("Shape mismatch in {op}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("{op} expects {expected} inputs, got {got}")]
    InputCount {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{op} returned {got} gradients for {expected} inputs")]
    GradientCount {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{op} has no saved value of the requested kind at index {index}")]
    MissingSaved { op: &'static str, index: usize },

    #[error("backward requires a scalar output, got shape {shape:?}")]
    NonScalarOutput { shape: Vec<usize> },

    #[error("expected a single-element tensor, got shape {shape:?}")]
    NotScalar { shape: Vec<usize> },

    #[error("tensor does not require grad and has no gradient graph")]
    NoGradient,

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, Error>;
