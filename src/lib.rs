//! Minimal reverse-mode automatic differentiation over `ndarray`.
//!
//! Operations on [`Tensor`]s record a graph as they run. Calling
//! [`Tensor::backward`] on a result walks that graph in reverse topological
//! order, accumulates gradients into every tensor that requires them, and
//! detaches the consumed nodes.
//!
//! ```
//! use miniflow::Tensor;
//!
//! let x = Tensor::ones(&[2, 2], true);
//! let y = x.add(&x).unwrap();
//! y.backward().unwrap();
//! assert!(x.grad().unwrap().data().iter().all(|&g| g == 2.0));
//! ```

pub mod autograd;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph_task;
pub mod ops;
mod operation;
pub mod tensor;

pub use autograd::{apply, Context, Function, FunctionNode, SavedValue};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use graph_task::GraphTask;
pub use tensor::{DType, Tensor};
