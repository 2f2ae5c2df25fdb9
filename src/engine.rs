use crate::autograd::FunctionNode;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::graph_task::GraphTask;
use crate::tensor::Tensor;
use log::{debug, trace, warn};
use ndarray::ArrayD;

/// Drives the reverse pass over the graph behind a root tensor.
///
/// Each pass seeds the root's gradient, walks the discovered nodes from the
/// root towards the leaves, and accumulates every function's input gradients.
/// Consumed nodes are detached unless the config retains the graph, so a
/// second pass over the same root reaches nothing but the root itself.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Seeds `root` with ones of its own shape and runs the pass.
    ///
    /// Roots with more than one element are accepted unless
    /// `require_scalar_output` is set; the result is then the gradient of the
    /// sum of the root's elements.
    pub fn backward(&self, root: &Tensor) -> Result<()> {
        if !root.requires_grad() {
            return Err(Error::NoGradient);
        }
        if root.len() != 1 {
            if self.config.require_scalar_output {
                return Err(Error::NonScalarOutput {
                    shape: root.shape().to_vec(),
                });
            }
            warn!(
                "seeding non-scalar backward root of shape {:?} with ones",
                root.shape()
            );
        }
        root.seed_grad(ArrayD::ones(root.data().raw_dim()));
        self.execute(root)
    }

    /// Runs the pass with an explicit gradient for `root`.
    pub fn backward_with(&self, root: &Tensor, grad: ArrayD<f32>) -> Result<()> {
        if !root.requires_grad() {
            return Err(Error::NoGradient);
        }
        if grad.shape() != root.shape() {
            return Err(Error::ShapeMismatch {
                op: "backward",
                expected: root.shape().to_vec(),
                got: grad.shape().to_vec(),
            });
        }
        root.seed_grad(grad);
        self.execute(root)
    }

    fn execute(&self, root: &Tensor) -> Result<()> {
        let task = GraphTask::discover(root);
        debug!("backward pass over {} nodes", task.len());

        // Gradients of intermediate nodes only hold contributions of the
        // current pass.
        for node in task.nodes() {
            if !node.ptr_eq(root) {
                node.zero_grad();
            }
        }

        let mut evaluated = 0;
        for node in task.nodes().iter().rev() {
            let Some(function) = node.producer() else {
                continue;
            };
            if !function.ctx().needs_output_grad() {
                continue;
            }
            match node.grad() {
                Some(grad) => {
                    Self::evaluate_function(&function, grad.data())?;
                    evaluated += 1;
                }
                None => trace!("{}: no gradient reached output", function.name()),
            }
            if self.config.detach_graph {
                node.detach();
            }
        }

        debug!("backward pass done, {} functions evaluated", evaluated);
        Ok(())
    }

    fn evaluate_function(function: &FunctionNode, grad_output: &ArrayD<f32>) -> Result<()> {
        trace!("{}: backward", function.name());
        let grads = function.backward(grad_output)?;
        let inputs = function.inputs();
        if grads.len() != inputs.len() {
            return Err(Error::GradientCount {
                op: function.name(),
                expected: inputs.len(),
                got: grads.len(),
            });
        }

        // Check every gradient before touching any slot so a bad one leaves
        // the inputs unchanged.
        let mut accepted = Vec::with_capacity(inputs.len());
        for (input, grad) in inputs.iter().zip(grads) {
            let Some(grad) = grad else {
                continue;
            };
            if !input.requires_grad() {
                continue;
            }
            if grad.shape() != input.shape() {
                return Err(Error::ShapeMismatch {
                    op: function.name(),
                    expected: input.shape().to_vec(),
                    got: grad.shape().to_vec(),
                });
            }
            accepted.push((input, grad));
        }
        for (input, grad) in accepted {
            input.accumulate_grad(grad)?;
        }
        Ok(())
    }
}

impl Tensor {
    /// Backpropagates from this tensor with the default engine.
    pub fn backward(&self) -> Result<()> {
        Engine::default().backward(self)
    }

    /// Backpropagates `grad` from this tensor with the default engine.
    pub fn backward_with(&self, grad: ArrayD<f32>) -> Result<()> {
        Engine::default().backward_with(self, grad)
    }
}
