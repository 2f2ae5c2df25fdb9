//! Tensor type with gradient tracking

use crate::autograd::FunctionNode;
use crate::error::{Error, Result};
use ndarray::{Array, Array2, ArrayD, Dimension, IxDyn};
use rand::Rng;
use rand_distr::StandardNormal;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Element type of tensor storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F32,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => f.write_str("f32"),
        }
    }
}

struct TensorNode {
    data: ArrayD<f32>,
    requires_grad: bool,
    grad: RefCell<Option<Tensor>>,
    producer: RefCell<Option<Rc<FunctionNode>>>,
}

impl Drop for TensorNode {
    /// Releases the producer chain with an explicit stack. Letting the
    /// fields drop in place would recurse once per recorded operation.
    fn drop(&mut self) {
        let Some(producer) = self.producer.get_mut().take() else {
            return;
        };
        let mut pending = vec![producer];
        while let Some(function) = pending.pop() {
            let Ok(function) = Rc::try_unwrap(function) else {
                continue;
            };
            for input in function.into_inputs() {
                if Rc::strong_count(&input.0) == 1 {
                    if let Some(next) = input.0.producer.borrow_mut().take() {
                        pending.push(next);
                    }
                }
            }
        }
    }
}

/// An n-dimensional array that can take part in a gradient graph.
///
/// `Tensor` is a shared handle: cloning it yields another reference to the
/// same graph node, and node identity (not value) is what the backward pass
/// keys on. The payload is never mutated after construction.
///
/// Handles are `!Send` and `!Sync`. Gradient slots are plain interior
/// mutability and must not be touched from two backward passes at once.
#[derive(Clone)]
pub struct Tensor(Rc<TensorNode>);

impl Tensor {
    pub fn new(data: ArrayD<f32>, requires_grad: bool) -> Self {
        Tensor(Rc::new(TensorNode {
            data,
            requires_grad,
            grad: RefCell::new(None),
            producer: RefCell::new(None),
        }))
    }

    /// Wrap an array of any fixed rank.
    pub fn from_array<D: Dimension>(data: Array<f32, D>, requires_grad: bool) -> Self {
        Self::new(data.into_dyn(), requires_grad)
    }

    /// Build a tensor from a flat row-major buffer.
    ///
    /// Fails without producing a tensor when `values` cannot fill `shape`.
    pub fn from_vec(shape: &[usize], values: Vec<f32>, requires_grad: bool) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(Error::InvalidData {
                expected,
                got: values.len(),
            });
        }
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)?;
        Ok(Self::new(data, requires_grad))
    }

    /// Zero-dimensional tensor holding one value.
    pub fn scalar(value: f32, requires_grad: bool) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(&[]), value), requires_grad)
    }

    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)), requires_grad)
    }

    pub fn ones(shape: &[usize], requires_grad: bool) -> Self {
        Self::new(ArrayD::ones(IxDyn(shape)), requires_grad)
    }

    /// `n x n` identity matrix.
    pub fn identity(n: usize, requires_grad: bool) -> Self {
        Self::from_array(Array2::<f32>::eye(n), requires_grad)
    }

    /// Samples from the standard normal distribution.
    pub fn randn<R: Rng + ?Sized>(shape: &[usize], rng: &mut R, requires_grad: bool) -> Self {
        let data =
            ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.sample::<f32, _>(StandardNormal));
        Self::new(data, requires_grad)
    }

    /// Samples uniformly from `[-1, 1)`.
    pub fn uniform<R: Rng + ?Sized>(shape: &[usize], rng: &mut R, requires_grad: bool) -> Self {
        let data = ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.gen::<f32>() * 2.0 - 1.0);
        Self::new(data, requires_grad)
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.0.data
    }

    pub fn shape(&self) -> &[usize] {
        self.0.data.shape()
    }

    pub fn dtype(&self) -> DType {
        DType::F32
    }

    pub fn ndim(&self) -> usize {
        self.0.data.ndim()
    }

    pub fn len(&self) -> usize {
        self.0.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.data.is_empty()
    }

    pub fn requires_grad(&self) -> bool {
        self.0.requires_grad
    }

    /// Value of a single-element tensor.
    pub fn item(&self) -> Result<f32> {
        match self.0.data.iter().next() {
            Some(&value) if self.len() == 1 => Ok(value),
            _ => Err(Error::NotScalar {
                shape: self.shape().to_vec(),
            }),
        }
    }

    /// Accumulated gradient, if a backward pass reached this tensor.
    pub fn grad(&self) -> Option<Tensor> {
        self.0.grad.borrow().clone()
    }

    pub fn zero_grad(&self) {
        *self.0.grad.borrow_mut() = None;
    }

    /// Adds `incoming` into the gradient slot.
    ///
    /// Sets the slot when empty, otherwise replaces it with the elementwise
    /// sum, so gradient handles returned earlier by [`Tensor::grad`] keep
    /// their old value. Returns `false` and leaves the slot untouched when
    /// this tensor does not require grad. Not reentrant.
    pub fn accumulate_grad(&self, incoming: ArrayD<f32>) -> Result<bool> {
        if !self.requires_grad() {
            return Ok(false);
        }
        if incoming.shape() != self.shape() {
            return Err(Error::ShapeMismatch {
                op: "accumulate_grad",
                expected: self.shape().to_vec(),
                got: incoming.shape().to_vec(),
            });
        }
        let mut slot = self.0.grad.borrow_mut();
        let summed = match slot.take() {
            Some(existing) => existing.data() + &incoming,
            None => incoming,
        };
        *slot = Some(Tensor::new(summed, false));
        Ok(true)
    }

    /// Overwrites the gradient slot, used to seed the terminal of a pass.
    pub(crate) fn seed_grad(&self, grad: ArrayD<f32>) {
        *self.0.grad.borrow_mut() = Some(Tensor::new(grad, false));
    }

    /// True when no operation produced this tensor, or it has been detached.
    pub fn is_leaf(&self) -> bool {
        self.0.producer.borrow().is_none()
    }

    /// Drops the producer reference, turning this tensor into a leaf.
    pub fn detach(&self) {
        self.0.producer.borrow_mut().take();
    }

    pub(crate) fn producer(&self) -> Option<Rc<FunctionNode>> {
        self.0.producer.borrow().clone()
    }

    pub(crate) fn set_producer(&self, node: Rc<FunctionNode>) {
        *self.0.producer.borrow_mut() = Some(node);
    }

    /// Whether both handles point at the same graph node.
    pub fn ptr_eq(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn node_id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("data", &self.0.data)
            .field("requires_grad", &self.0.requires_grad)
            .field("has_grad", &self.0.grad.borrow().is_some())
            .field("is_leaf", &self.is_leaf())
            .finish()
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Tensor: {}, requires_grad={}>",
            self.0.data, self.0.requires_grad
        )
    }
}
