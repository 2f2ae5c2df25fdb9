//! Operator contract and graph recording.
//!
//! An operator implements [`Function`]. Running it through [`apply`] gives
//! it a fresh [`Context`] describing the inputs, evaluates `forward` on
//! their arrays and, when any input requires grad, records a
//! [`FunctionNode`] as the producer of the output tensor.

use crate::error::{Error, Result};
use crate::tensor::Tensor;
use ndarray::ArrayD;
use std::fmt;
use std::rc::Rc;

/// A value captured during `forward` for use in `backward`.
#[derive(Debug, Clone)]
pub enum SavedValue {
    Array(ArrayD<f32>),
    Scalar(f32),
    Shape(Vec<usize>),
}

impl From<ArrayD<f32>> for SavedValue {
    fn from(value: ArrayD<f32>) -> Self {
        SavedValue::Array(value)
    }
}

impl From<f32> for SavedValue {
    fn from(value: f32) -> Self {
        SavedValue::Scalar(value)
    }
}

impl From<Vec<usize>> for SavedValue {
    fn from(value: Vec<usize>) -> Self {
        SavedValue::Shape(value)
    }
}

/// Per-invocation state of an operator.
pub struct Context {
    op: &'static str,
    inputs: Vec<Tensor>,
    needs_input_grad: Vec<bool>,
    needs_output_grad: bool,
    saved: Vec<SavedValue>,
}

impl Context {
    /// Gradient requirements are fixed here from the inputs' flags.
    pub fn new(op: &'static str, inputs: &[&Tensor]) -> Self {
        let needs_input_grad: Vec<bool> = inputs.iter().map(|t| t.requires_grad()).collect();
        let needs_output_grad = needs_input_grad.iter().any(|&n| n);
        Self {
            op,
            inputs: inputs.iter().map(|&t| t.clone()).collect(),
            needs_input_grad,
            needs_output_grad,
            saved: Vec::new(),
        }
    }

    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn inputs(&self) -> &[Tensor] {
        &self.inputs
    }

    pub fn needs_input_grad(&self, index: usize) -> bool {
        self.needs_input_grad.get(index).copied().unwrap_or(false)
    }

    pub fn needs_output_grad(&self) -> bool {
        self.needs_output_grad
    }

    pub fn save_for_backward<I>(&mut self, values: I)
    where
        I: IntoIterator,
        I::Item: Into<SavedValue>,
    {
        self.saved.extend(values.into_iter().map(Into::into));
    }

    pub fn saved(&self) -> &[SavedValue] {
        &self.saved
    }

    pub fn saved_array(&self, index: usize) -> Result<&ArrayD<f32>> {
        match self.saved.get(index) {
            Some(SavedValue::Array(array)) => Ok(array),
            _ => Err(self.missing(index)),
        }
    }

    pub fn saved_scalar(&self, index: usize) -> Result<f32> {
        match self.saved.get(index) {
            Some(SavedValue::Scalar(value)) => Ok(*value),
            _ => Err(self.missing(index)),
        }
    }

    pub fn saved_shape(&self, index: usize) -> Result<&[usize]> {
        match self.saved.get(index) {
            Some(SavedValue::Shape(shape)) => Ok(shape),
            _ => Err(self.missing(index)),
        }
    }

    fn missing(&self, index: usize) -> Error {
        Error::MissingSaved { op: self.op, index }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("op", &self.op)
            .field("inputs", &self.inputs.len())
            .field("needs_input_grad", &self.needs_input_grad)
            .field("saved", &self.saved.len())
            .finish()
    }
}

/// A differentiable operation.
///
/// `backward` returns one entry per input, in input order. `None` means the
/// input gets no gradient from this operator, either because it does not
/// need one or because the operation is not differentiable in it.
pub trait Function {
    fn name(&self) -> &'static str;

    fn forward(&self, _ctx: &mut Context, _inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        Err(Error::Unimplemented {
            op: self.name(),
            pass: "forward",
        })
    }

    fn backward(
        &self,
        _ctx: &Context,
        _grad_output: &ArrayD<f32>,
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        Err(Error::Unimplemented {
            op: self.name(),
            pass: "backward",
        })
    }
}

/// Graph edge from an output tensor back to the operation that made it.
pub struct FunctionNode {
    function: Box<dyn Function>,
    ctx: Context,
}

impl FunctionNode {
    pub fn name(&self) -> &'static str {
        self.function.name()
    }

    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    pub fn inputs(&self) -> &[Tensor] {
        self.ctx.inputs()
    }

    /// Gives up the input handles, dropping everything else.
    pub(crate) fn into_inputs(self) -> Vec<Tensor> {
        self.ctx.inputs
    }

    pub(crate) fn backward(&self, grad_output: &ArrayD<f32>) -> Result<Vec<Option<ArrayD<f32>>>> {
        self.function.backward(&self.ctx, grad_output)
    }
}

impl fmt::Debug for FunctionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionNode")
            .field("function", &self.name())
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// Runs `function` on `inputs` and wraps the result.
///
/// The output requires grad iff any input does. Only then is the function
/// kept as the output's producer; otherwise it is dropped here and the
/// subtree never shows up in a backward pass.
pub fn apply<F>(function: F, inputs: &[&Tensor]) -> Result<Tensor>
where
    F: Function + 'static,
{
    let mut ctx = Context::new(function.name(), inputs);
    let arrays: Vec<&ArrayD<f32>> = inputs.iter().map(|t| t.data()).collect();
    let output = function.forward(&mut ctx, &arrays)?;

    let tensor = Tensor::new(output, ctx.needs_output_grad());
    if ctx.needs_output_grad() {
        tensor.set_producer(Rc::new(FunctionNode {
            function: Box::new(function),
            ctx,
        }));
    }
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Opaque;

    impl Function for Opaque {
        fn name(&self) -> &'static str {
            "Opaque"
        }
    }

    #[test]
    fn test_unimplemented_forward() {
        let x = Tensor::ones(&[1], true);
        let err = apply(Opaque, &[&x]).unwrap_err();
        assert!(matches!(
            err,
            Error::Unimplemented {
                op: "Opaque",
                pass: "forward"
            }
        ));
    }

    #[test]
    fn test_context_flags() {
        let a = Tensor::ones(&[1], true);
        let b = Tensor::ones(&[1], false);
        let ctx = Context::new("test", &[&a, &b]);
        assert!(ctx.needs_input_grad(0));
        assert!(!ctx.needs_input_grad(1));
        assert!(!ctx.needs_input_grad(2));
        assert!(ctx.needs_output_grad());

        let ctx = Context::new("test", &[&b]);
        assert!(!ctx.needs_output_grad());
    }

    #[test]
    fn test_saved_values_in_order() {
        let a = Tensor::ones(&[2], false);
        let mut ctx = Context::new("test", &[&a]);
        ctx.save_for_backward([SavedValue::Scalar(3.0), SavedValue::Shape(vec![2])]);
        ctx.save_for_backward([a.data().clone()]);

        assert_eq!(ctx.saved_scalar(0).unwrap(), 3.0);
        assert_eq!(ctx.saved_shape(1).unwrap(), &[2]);
        assert_eq!(ctx.saved_array(2).unwrap(), a.data());
        assert!(matches!(
            ctx.saved_array(0),
            Err(Error::MissingSaved { index: 0, .. })
        ));
        assert!(ctx.saved_scalar(5).is_err());
    }
}
