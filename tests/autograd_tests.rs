use miniflow::{apply, Context, Error, Function, Result, SavedValue, Tensor};
use ndarray::{ArrayD, IxDyn};

/// Picks `x[i]` out of a 1-D tensor; the index operand is not differentiable.
struct Select;

impl Function for Select {
    fn name(&self) -> &'static str {
        "Select"
    }

    fn forward(&self, ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let (x, index) = (inputs[0], inputs[1]);
        let i = index.iter().next().copied().unwrap_or(0.0) as usize;
        ctx.save_for_backward([
            SavedValue::Shape(x.shape().to_vec()),
            SavedValue::Scalar(i as f32),
        ]);
        Ok(ArrayD::from_elem(IxDyn(&[]), x[IxDyn(&[i])]))
    }

    fn backward(&self, ctx: &Context, grad: &ArrayD<f32>) -> Result<Vec<Option<ArrayD<f32>>>> {
        let shape = ctx.saved_shape(0)?;
        let i = ctx.saved_scalar(1)? as usize;
        let mut dx = ArrayD::zeros(IxDyn(shape));
        dx[IxDyn(&[i])] = grad.sum();
        Ok(vec![Some(dx), None])
    }
}

/// Forward only.
struct Frozen;

impl Function for Frozen {
    fn name(&self) -> &'static str {
        "Frozen"
    }

    fn forward(&self, _ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        Ok(inputs[0].clone())
    }
}

/// Returns one gradient too many.
struct Greedy;

impl Function for Greedy {
    fn name(&self) -> &'static str {
        "Greedy"
    }

    fn forward(&self, _ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        Ok(inputs[0].clone())
    }

    fn backward(&self, _ctx: &Context, grad: &ArrayD<f32>) -> Result<Vec<Option<ArrayD<f32>>>> {
        Ok(vec![Some(grad.clone()), Some(grad.clone())])
    }
}

/// Returns a gradient of the wrong shape.
struct Squash;

impl Function for Squash {
    fn name(&self) -> &'static str {
        "Squash"
    }

    fn forward(&self, _ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        Ok(ArrayD::from_elem(IxDyn(&[]), inputs[0].sum()))
    }

    fn backward(&self, _ctx: &Context, grad: &ArrayD<f32>) -> Result<Vec<Option<ArrayD<f32>>>> {
        Ok(vec![Some(grad.clone())])
    }
}

/// Adds two tensors; the second gradient comes back flattened.
struct Lopsided;

impl Function for Lopsided {
    fn name(&self) -> &'static str {
        "Lopsided"
    }

    fn forward(&self, _ctx: &mut Context, inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
        Ok(inputs[0] + inputs[1])
    }

    fn backward(&self, _ctx: &Context, grad: &ArrayD<f32>) -> Result<Vec<Option<ArrayD<f32>>>> {
        let flat = ArrayD::from_shape_vec(IxDyn(&[grad.len()]), grad.iter().copied().collect())?;
        Ok(vec![Some(grad.clone()), Some(flat)])
    }
}

#[test]
fn test_recorded_producer() {
    let x = Tensor::ones(&[2], true);
    let y = x.neg().unwrap();
    assert!(!y.is_leaf());
    assert!(y.requires_grad());
    assert_eq!(y.deepwalk().len(), 1);
}

#[test]
fn test_pruned_subtree_has_no_producer() {
    let a = Tensor::ones(&[2], false);
    let b = Tensor::ones(&[2], false);
    let c = a.mul(&b).unwrap();
    assert!(!c.requires_grad());
    assert!(c.is_leaf());

    let x = Tensor::ones(&[2], true);
    let y = x.add(&c).unwrap().sum().unwrap();
    let order = y.deepwalk();
    assert!(order.iter().all(|n| !n.ptr_eq(&c)));
    y.backward().unwrap();
    assert!(c.grad().is_none());
    assert!(x.grad().is_some());
}

#[test]
fn test_non_differentiable_input_gets_nothing() {
    let x = Tensor::from_vec(&[3], vec![1.0, 2.0, 3.0], true).unwrap();
    // Requires grad, but Select never differentiates its index.
    let index = Tensor::scalar(1.0, true);
    let y = apply(Select, &[&x, &index]).unwrap();
    assert_eq!(y.item().unwrap(), 2.0);

    y.backward().unwrap();
    assert_eq!(x.grad().unwrap().data().as_slice().unwrap(), &[0.0, 1.0, 0.0]);
    assert!(index.grad().is_none());
}

#[test]
fn test_missing_backward_is_reported_on_use() {
    let x = Tensor::ones(&[2], true);
    let y = apply(Frozen, &[&x]).unwrap();
    assert_eq!(y.data(), x.data());

    let err = y.backward().unwrap_err();
    assert!(matches!(
        err,
        Error::Unimplemented {
            op: "Frozen",
            pass: "backward"
        }
    ));
}

#[test]
fn test_gradient_count_checked() {
    let x = Tensor::ones(&[2], true);
    let y = apply(Greedy, &[&x]).unwrap();
    assert!(matches!(
        y.backward(),
        Err(Error::GradientCount {
            op: "Greedy",
            expected: 1,
            got: 2
        })
    ));
}

#[test]
fn test_gradient_shape_checked() {
    let x = Tensor::ones(&[2, 2], true);
    let y = apply(Squash, &[&x]).unwrap();
    let err = y.backward().unwrap_err();
    match err {
        Error::ShapeMismatch { op, expected, got } => {
            assert_eq!(op, "Squash");
            assert_eq!(expected, vec![2, 2]);
            assert!(got.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(x.grad().is_none());
}

#[test]
fn test_gradient_shape_checked_before_any_accumulation() {
    let a = Tensor::ones(&[2, 2], true);
    let b = Tensor::ones(&[2, 2], true);
    let y = apply(Lopsided, &[&a, &b]).unwrap();
    let err = y.backward().unwrap_err();
    assert!(matches!(
        err,
        Error::ShapeMismatch { op: "Lopsided", ref got, .. } if got == &[4]
    ));
    // The first gradient was well formed but must not have landed.
    assert!(a.grad().is_none());
    assert!(b.grad().is_none());
}

#[test]
fn test_failed_pass_leaves_fresh_graphs_usable() {
    let x = Tensor::ones(&[2], true);
    let broken = apply(Frozen, &[&x]).unwrap();
    assert!(broken.backward().is_err());

    let fresh = Tensor::ones(&[2], true);
    let y = fresh.scale(3.0).unwrap().sum().unwrap();
    y.backward().unwrap();
    assert!(fresh.grad().unwrap().data().iter().all(|&g| g == 3.0));
}
