use crate::autograd::apply;
use crate::error::Result;
use crate::ops::{Add, MatMul, Mean, Mul, Neg, Relu, Scale, Sub, Sum};
use crate::tensor::Tensor;

impl Tensor {
    /// Element-wise addition. Shapes must match.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        apply(Add, &[self, other])
    }

    pub fn sub(&self, other: &Tensor) -> Result<Tensor> {
        apply(Sub, &[self, other])
    }

    /// Element-wise multiplication. Shapes must match.
    pub fn mul(&self, other: &Tensor) -> Result<Tensor> {
        apply(Mul, &[self, other])
    }

    pub fn neg(&self) -> Result<Tensor> {
        apply(Neg, &[self])
    }

    pub fn scale(&self, factor: f32) -> Result<Tensor> {
        apply(Scale(factor), &[self])
    }

    /// Matrix product; both operands must be 2-D.
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        apply(MatMul, &[self, other])
    }

    pub fn sum(&self) -> Result<Tensor> {
        apply(Sum, &[self])
    }

    pub fn mean(&self) -> Result<Tensor> {
        apply(Mean, &[self])
    }

    pub fn relu(&self) -> Result<Tensor> {
        apply(Relu, &[self])
    }
}
