//! Built-in differentiable operators

use crate::autograd::{Context, Function, SavedValue};
use crate::error::{Error, Result};
use ndarray::{ArrayD, ArrayView2, Ix2, IxDyn, Zip};

type Grads = Result<Vec<Option<ArrayD<f32>>>>;

fn same_shape(op: &'static str, a: &ArrayD<f32>, b: &ArrayD<f32>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch {
            op,
            expected: a.shape().to_vec(),
            got: b.shape().to_vec(),
        });
    }
    Ok(())
}

fn binary<'a>(
    op: &'static str,
    inputs: &[&'a ArrayD<f32>],
) -> Result<(&'a ArrayD<f32>, &'a ArrayD<f32>)> {
    match *inputs {
        [a, b] => Ok((a, b)),
        _ => Err(Error::InputCount {
            op,
            expected: 2,
            got: inputs.len(),
        }),
    }
}

fn unary<'a>(op: &'static str, inputs: &[&'a ArrayD<f32>]) -> Result<&'a ArrayD<f32>> {
    match *inputs {
        [a] => Ok(a),
        _ => Err(Error::InputCount {
            op,
            expected: 1,
            got: inputs.len(),
        }),
    }
}

fn matrix<'a>(a: &'a ArrayD<f32>) -> Result<ArrayView2<'a, f32>> {
    Ok(a.view().into_dimensionality::<Ix2>()?)
}

/// Elementwise `a + b`.
#[derive(Debug, Clone, Copy)]
pub struct Add;

impl Function for Add {
    fn name(&self) -> &'static str {
        "Add"
    }

    fn forward(&self, _ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let (a, b) = binary(self.name(), inputs)?;
        same_shape(self.name(), a, b)?;
        Ok(a + b)
    }

    fn backward(&self, ctx: &Context, grad: &ArrayD<f32>) -> Grads {
        Ok(vec![
            ctx.needs_input_grad(0).then(|| grad.clone()),
            ctx.needs_input_grad(1).then(|| grad.clone()),
        ])
    }
}

/// Elementwise `a - b`.
#[derive(Debug, Clone, Copy)]
pub struct Sub;

impl Function for Sub {
    fn name(&self) -> &'static str {
        "Sub"
    }

    fn forward(&self, _ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let (a, b) = binary(self.name(), inputs)?;
        same_shape(self.name(), a, b)?;
        Ok(a - b)
    }

    fn backward(&self, ctx: &Context, grad: &ArrayD<f32>) -> Grads {
        Ok(vec![
            ctx.needs_input_grad(0).then(|| grad.clone()),
            ctx.needs_input_grad(1).then(|| -grad),
        ])
    }
}

/// Elementwise `a * b`. Saves both operands.
#[derive(Debug, Clone, Copy)]
pub struct Mul;

impl Function for Mul {
    fn name(&self) -> &'static str {
        "Mul"
    }

    fn forward(&self, ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let (a, b) = binary(self.name(), inputs)?;
        same_shape(self.name(), a, b)?;
        ctx.save_for_backward([a.clone(), b.clone()]);
        Ok(a * b)
    }

    fn backward(&self, ctx: &Context, grad: &ArrayD<f32>) -> Grads {
        let a = ctx.saved_array(0)?;
        let b = ctx.saved_array(1)?;
        Ok(vec![
            ctx.needs_input_grad(0).then(|| grad * b),
            ctx.needs_input_grad(1).then(|| grad * a),
        ])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Neg;

impl Function for Neg {
    fn name(&self) -> &'static str {
        "Neg"
    }

    fn forward(&self, _ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let a = unary(self.name(), inputs)?;
        Ok(-a)
    }

    fn backward(&self, ctx: &Context, grad: &ArrayD<f32>) -> Grads {
        Ok(vec![ctx.needs_input_grad(0).then(|| -grad)])
    }
}

/// Multiplication by a constant factor.
#[derive(Debug, Clone, Copy)]
pub struct Scale(pub f32);

impl Function for Scale {
    fn name(&self) -> &'static str {
        "Scale"
    }

    fn forward(&self, ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let a = unary(self.name(), inputs)?;
        ctx.save_for_backward([SavedValue::Scalar(self.0)]);
        Ok(a * self.0)
    }

    fn backward(&self, ctx: &Context, grad: &ArrayD<f32>) -> Grads {
        let factor = ctx.saved_scalar(0)?;
        Ok(vec![ctx.needs_input_grad(0).then(|| grad * factor)])
    }
}

/// Matrix product of two 2-D tensors.
#[derive(Debug, Clone, Copy)]
pub struct MatMul;

impl Function for MatMul {
    fn name(&self) -> &'static str {
        "MatMul"
    }

    fn forward(&self, ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let (a, b) = binary(self.name(), inputs)?;
        let (lhs, rhs) = (matrix(a)?, matrix(b)?);
        if lhs.ncols() != rhs.nrows() {
            return Err(Error::ShapeMismatch {
                op: self.name(),
                expected: vec![lhs.ncols(), rhs.ncols()],
                got: b.shape().to_vec(),
            });
        }
        let output = lhs.dot(&rhs).into_dyn();
        ctx.save_for_backward([a.clone(), b.clone()]);
        Ok(output)
    }

    fn backward(&self, ctx: &Context, grad: &ArrayD<f32>) -> Grads {
        let a = matrix(ctx.saved_array(0)?)?;
        let b = matrix(ctx.saved_array(1)?)?;
        let grad = matrix(grad)?;
        Ok(vec![
            ctx.needs_input_grad(0).then(|| grad.dot(&b.t()).into_dyn()),
            ctx.needs_input_grad(1).then(|| a.t().dot(&grad).into_dyn()),
        ])
    }
}

/// Sum of all elements, as a 0-d tensor.
#[derive(Debug, Clone, Copy)]
pub struct Sum;

impl Function for Sum {
    fn name(&self) -> &'static str {
        "Sum"
    }

    fn forward(&self, ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let a = unary(self.name(), inputs)?;
        ctx.save_for_backward([a.shape().to_vec()]);
        Ok(ArrayD::from_elem(IxDyn(&[]), a.sum()))
    }

    fn backward(&self, ctx: &Context, grad: &ArrayD<f32>) -> Grads {
        let shape = ctx.saved_shape(0)?;
        Ok(vec![ctx
            .needs_input_grad(0)
            .then(|| ArrayD::from_elem(IxDyn(shape), grad.sum()))])
    }
}

/// Mean of all elements, as a 0-d tensor.
#[derive(Debug, Clone, Copy)]
pub struct Mean;

impl Function for Mean {
    fn name(&self) -> &'static str {
        "Mean"
    }

    fn forward(&self, ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let a = unary(self.name(), inputs)?;
        ctx.save_for_backward([a.shape().to_vec()]);
        Ok(ArrayD::from_elem(IxDyn(&[]), a.sum() / a.len() as f32))
    }

    fn backward(&self, ctx: &Context, grad: &ArrayD<f32>) -> Grads {
        let shape = ctx.saved_shape(0)?;
        let count: usize = shape.iter().product();
        Ok(vec![ctx
            .needs_input_grad(0)
            .then(|| ArrayD::from_elem(IxDyn(shape), grad.sum() / count as f32))])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Relu;

impl Function for Relu {
    fn name(&self) -> &'static str {
        "Relu"
    }

    fn forward(&self, ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let a = unary(self.name(), inputs)?;
        ctx.save_for_backward([a.clone()]);
        Ok(a.mapv(|x| x.max(0.0)))
    }

    fn backward(&self, ctx: &Context, grad: &ArrayD<f32>) -> Grads {
        let input = ctx.saved_array(0)?;
        Ok(vec![ctx.needs_input_grad(0).then(|| {
            Zip::from(grad)
                .and(input)
                .map_collect(|&g, &x| if x > 0.0 { g } else { 0.0 })
        })])
    }
}
