// Integration tests for the Split layer
//
// These drive SplitLayer the way a graph executor does: reshape, forward,
// then backward, on blobs the test owns. Values are checked exactly; the
// layer does no arithmetic beyond copy/add/axpy, so results are
// bit-identical to hand-computed sums in output order.

use rstest::rstest;
use wren_core::{Blob, CpuBackend, Error, Result, Shape};
use wren_nn::{build_layer, Layer, LayerConfig, LayerType, SplitLayer};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn outputs<T: wren_core::WithDType>(n: usize) -> Vec<Blob<T>> {
    (0..n).map(|_| Blob::new(())).collect()
}

fn input_123() -> Result<Blob<f32>> {
    Blob::from_data(vec![1.0, 2.0, 3.0], Shape::nchw(1, 3, 1, 1))
}

// Reshape

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(7)]
fn test_reshape_copies_input_shape(#[case] n: usize) -> Result<()> {
    init_logs();
    let x = Blob::<f32>::new(Shape::nchw(2, 3, 4, 5));
    let outs = outputs::<f32>(n);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    for out in &outs {
        assert_eq!(out.shape(), Shape::nchw(2, 3, 4, 5));
        assert_eq!(out.count(), split.count());
    }
    assert_eq!(split.count(), 120);
    Ok(())
}

#[test]
fn test_reshape_rejects_in_place() {
    let x = Blob::<f32>::new(Shape::nchw(1, 2, 2, 2));
    let other = Blob::<f32>::new(());
    let mut split = SplitLayer::<f32>::new("fan");

    let err = split
        .reshape(&[x.clone()], &[other.clone(), x.clone()])
        .unwrap_err();
    assert!(matches!(err, Error::InPlaceNotAllowed { index: 1, .. }));
    assert!(err.is_fatal());
    assert!(err.to_string().contains("Split layer does not allow in-place computation"));
    // Nothing was reshaped.
    assert_eq!(other.shape(), Shape::from(()));
}

#[test]
fn test_zero_outputs_is_fatal() {
    let x = Blob::<f32>::new(Shape::from(3));
    let mut split = SplitLayer::<f32>::new("fan");

    let err = split.reshape(&[x.clone()], &[]).unwrap_err();
    assert!(matches!(err, Error::TooFewOutputs { min: 1, got: 0, .. }));
    assert!(err.is_fatal());

    assert!(split.forward(&[x.clone()], &[]).is_err());
    assert!(split.backward(&[], &[true], &[x]).is_err());
}

#[test]
fn test_wrong_input_count_is_fatal() {
    let a = Blob::<f32>::new(Shape::from(3));
    let b = Blob::<f32>::new(Shape::from(3));
    let mut split = SplitLayer::<f32>::new("fan");
    let err = split.setup(&[a, b], &outputs::<f32>(2)).unwrap_err();
    assert!(matches!(err, Error::InputCountMismatch { expected: 1, got: 2, .. }));
}

// Forward

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
fn test_forward_aliases_input_values(#[case] n: usize) -> Result<()> {
    let x = input_123()?;
    let outs = outputs::<f32>(n);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;
    split.forward(&[x.clone()], &outs)?;

    for out in &outs {
        assert!(out.shares_data_with(&x));
        assert_eq!(out.data_vec(), vec![1.0, 2.0, 3.0]);
    }

    // No copy: later writes to the input show through every output.
    x.set_data(&[4.0, 5.0, 6.0])?;
    for out in &outs {
        assert_eq!(out.data_vec(), vec![4.0, 5.0, 6.0]);
    }
    Ok(())
}

#[test]
fn test_forward_keeps_gradients_separate() -> Result<()> {
    let x = input_123()?;
    let outs = outputs::<f32>(2);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;
    split.forward(&[x.clone()], &outs)?;

    outs[0].set_diff(&[1.0, 1.0, 1.0])?;
    assert_eq!(outs[1].diff_vec(), vec![0.0, 0.0, 0.0]);
    assert_eq!(x.diff_vec(), vec![0.0, 0.0, 0.0]);
    Ok(())
}

#[test]
fn test_forward_without_reshape_fails() {
    let x = Blob::<f32>::new(Shape::from(3));
    let outs = outputs::<f32>(1);
    let split = SplitLayer::<f32>::new("fan");
    let err = split.forward(&[x], &outs).unwrap_err();
    assert!(matches!(err, Error::ShareCountMismatch { expected: 1, got: 3 }));
}

// Backward

#[test]
fn test_backward_single_output_copies() -> Result<()> {
    let x = input_123()?;
    let outs = outputs::<f32>(1);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    let grad = [0.1f32, -2.5e-7, 3.0e38];
    outs[0].set_diff(&grad)?;
    split.backward(&outs, &[true], &[x.clone()])?;

    let got = x.diff_vec();
    for (g, e) in got.iter().zip(grad.iter()) {
        assert_eq!(g.to_bits(), e.to_bits());
    }
    Ok(())
}

#[test]
fn test_backward_two_outputs_add() -> Result<()> {
    let x = input_123()?;
    let outs = outputs::<f32>(2);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    outs[0].set_diff(&[1.0, 2.0, 3.0])?;
    outs[1].set_diff(&[4.0, 5.0, 6.0])?;
    split.backward(&outs, &[true], &[x.clone()])?;
    assert_eq!(x.diff_vec(), vec![5.0, 7.0, 9.0]);
    Ok(())
}

#[test]
fn test_backward_three_outputs_sum() -> Result<()> {
    let x = input_123()?;
    let outs = outputs::<f32>(3);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    for out in &outs {
        out.set_diff(&[1.0, 1.0, 1.0])?;
    }
    split.backward(&outs, &[true], &[x.clone()])?;
    assert_eq!(x.diff_vec(), vec![3.0, 3.0, 3.0]);
    Ok(())
}

#[test]
fn test_backward_sums_in_output_order() -> Result<()> {
    // ((1e8 + -1e8) + 1) = 1, while any other grouping loses the 1 in f32.
    let x = Blob::<f32>::new(Shape::from(1));
    let outs = outputs::<f32>(3);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    outs[0].set_diff(&[1.0e8])?;
    outs[1].set_diff(&[-1.0e8])?;
    outs[2].set_diff(&[1.0])?;
    split.backward(&outs, &[true], &[x.clone()])?;
    assert_eq!(x.diff_vec(), vec![1.0]);

    // Same gradients, different order: (1e8 + 1) + -1e8 = 0 in f32.
    outs[0].set_diff(&[1.0e8])?;
    outs[1].set_diff(&[1.0])?;
    outs[2].set_diff(&[-1.0e8])?;
    split.backward(&outs, &[true], &[x.clone()])?;
    assert_eq!(x.diff_vec(), vec![0.0]);
    Ok(())
}

#[rstest]
#[case(2)]
#[case(5)]
#[case(9)]
fn test_backward_matches_reference_sum(#[case] n: usize) -> Result<()> {
    let count = 17;
    let x = Blob::<f64>::new(Shape::nchw(1, count, 1, 1));
    let outs = outputs::<f64>(n);
    let mut split = SplitLayer::<f64>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    let mut expected = vec![0.0f64; count];
    for (k, out) in outs.iter().enumerate() {
        let grad: Vec<f64> = (0..count).map(|i| (i * (k + 1)) as f64 * 0.25).collect();
        for (e, g) in expected.iter_mut().zip(&grad) {
            *e += g;
        }
        out.set_diff(&grad)?;
    }
    split.backward(&outs, &[true], &[x.clone()])?;
    assert_eq!(x.diff_vec(), expected);
    Ok(())
}

#[test]
fn test_backward_overwrites_previous_gradient() -> Result<()> {
    let x = input_123()?;
    let outs = outputs::<f32>(2);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    x.fill_diff(100.0);
    outs[0].set_diff(&[1.0, 1.0, 1.0])?;
    outs[1].set_diff(&[2.0, 2.0, 2.0])?;
    split.backward(&outs, &[true], &[x.clone()])?;
    assert_eq!(x.diff_vec(), vec![3.0, 3.0, 3.0]);
    Ok(())
}

#[test]
fn test_backward_skipped_without_propagate_down() -> Result<()> {
    let x = input_123()?;
    let outs = outputs::<f32>(3);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    x.fill_diff(-42.0);
    for out in &outs {
        out.set_diff(&[1.0, 2.0, 3.0])?;
    }
    split.backward(&outs, &[false], &[x.clone()])?;
    assert_eq!(x.diff_vec(), vec![-42.0, -42.0, -42.0]);
    Ok(())
}

#[test]
fn test_backward_propagate_down_length_checked() -> Result<()> {
    let x = input_123()?;
    let outs = outputs::<f32>(2);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    let err = split.backward(&outs, &[], &[x]).unwrap_err();
    assert!(matches!(err, Error::PropagateDownMismatch { expected: 1, got: 0, .. }));
    Ok(())
}

#[test]
fn test_backward_half_precision() -> Result<()> {
    use half::f16;

    let x = Blob::<f16>::new(Shape::from(2));
    let outs = outputs::<f16>(3);
    let mut split = SplitLayer::<f16>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    let one = f16::from_f32(1.0);
    let half_ = f16::from_f32(0.5);
    outs[0].set_diff(&[one, half_])?;
    outs[1].set_diff(&[one, half_])?;
    outs[2].set_diff(&[one, one])?;
    split.backward(&outs, &[true], &[x.clone()])?;
    assert_eq!(
        x.diff_vec(),
        vec![f16::from_f32(3.0), f16::from_f32(2.0)]
    );
    Ok(())
}

// Degenerate shapes

#[test]
fn test_empty_blob_passes() -> Result<()> {
    let x = Blob::<f32>::new(Shape::nchw(0, 3, 4, 4));
    let outs = outputs::<f32>(3);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;
    assert_eq!(split.count(), 0);

    split.forward(&[x.clone()], &outs)?;
    split.backward(&outs, &[true], &[x.clone()])?;
    assert!(x.diff_vec().is_empty());
    for out in &outs {
        assert!(out.data_vec().is_empty());
    }
    Ok(())
}

// Reduce

#[test]
fn test_reduce_copies_selection_and_narrows_channels() -> Result<()> {
    init_logs();
    let x = Blob::<f32>::new(Shape::nchw(2, 6, 3, 3));
    let outs = outputs::<f32>(2);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    // Downstream pruning keeps 4 of 6 channels.
    outs[0].reshape(Shape::nchw(2, 4, 3, 3));
    outs[0].set_select(&[1.0, 0.0, 1.0, 1.0])?;
    x.set_select(&[9.0; 6])?;

    split.reduce(&[x.clone()], &outs)?;

    assert_eq!(x.select_vec(), Some(vec![1.0, 0.0, 1.0, 1.0]));
    assert_eq!(x.shape(), Shape::nchw(2, 4, 3, 3));
    assert_eq!(split.count(), 72);

    // A fresh reshape brings every output back in line with the input.
    split.reshape(&[x.clone()], &outs)?;
    assert_eq!(outs[1].shape(), Shape::nchw(2, 4, 3, 3));
    Ok(())
}

#[test]
fn test_reduce_requires_selection() {
    let x = Blob::<f32>::new(Shape::nchw(1, 4, 1, 1));
    let outs = outputs::<f32>(1);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs).unwrap();

    let err = split.reduce(&[x], &outs).unwrap_err();
    assert!(matches!(err, Error::MissingSelection { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_reduce_rejects_wider_selection() -> Result<()> {
    let x = Blob::<f32>::new(Shape::nchw(1, 2, 1, 1));
    let outs = outputs::<f32>(1);
    let mut split = SplitLayer::<f32>::new("fan");
    split.setup(&[x.clone()], &outs)?;

    outs[0].reshape(Shape::nchw(1, 3, 1, 1));
    outs[0].reset_select();
    let err = split.reduce(&[x], &outs).unwrap_err();
    assert!(matches!(err, Error::SelectionTooShort { needed: 3, got: 2 }));
    Ok(())
}

// Dynamic dispatch

/// Minimal second layer so the trait defaults get exercised.
struct Identity;

impl Layer<f32> for Identity {
    fn type_name(&self) -> &'static str {
        "Identity"
    }

    fn name(&self) -> &str {
        "id"
    }

    fn reshape(&mut self, inputs: &[Blob<f32>], outputs: &[Blob<f32>]) -> Result<()> {
        for (i, o) in inputs.iter().zip(outputs) {
            o.reshape(i.shape());
        }
        Ok(())
    }

    fn forward(&self, inputs: &[Blob<f32>], outputs: &[Blob<f32>]) -> Result<()> {
        for (i, o) in inputs.iter().zip(outputs) {
            o.set_data(&i.data_vec())?;
        }
        Ok(())
    }

    fn backward(&self, outputs: &[Blob<f32>], _: &[bool], inputs: &[Blob<f32>]) -> Result<()> {
        for (o, i) in outputs.iter().zip(inputs) {
            i.set_diff(&o.diff_vec())?;
        }
        Ok(())
    }
}

#[test]
fn test_layers_driven_through_trait_objects() -> Result<()> {
    let cfg = LayerConfig::new(LayerType::Split)
        .with_name("fan")
        .with_num_outputs(2);
    let identity: Box<dyn Layer<f32>> = Box::new(Identity);
    let mut layers = vec![identity, build_layer::<f32, CpuBackend>(&cfg)?];

    let x = input_123()?;
    let mid = Blob::<f32>::new(());
    let outs = outputs::<f32>(cfg.num_outputs);

    layers[0].setup(&[x.clone()], &[mid.clone()])?;
    layers[1].setup(&[mid.clone()], &outs)?;
    layers[0].forward(&[x.clone()], &[mid.clone()])?;
    layers[1].forward(&[mid.clone()], &outs)?;
    assert_eq!(outs[1].data_vec(), vec![1.0, 2.0, 3.0]);

    outs[0].set_diff(&[1.0, 0.0, 0.0])?;
    outs[1].set_diff(&[0.0, 0.0, 2.0])?;
    layers[1].backward(&outs, &[true], &[mid.clone()])?;
    layers[0].backward(&[mid.clone()], &[true], &[x.clone()])?;
    assert_eq!(x.diff_vec(), vec![1.0, 0.0, 2.0]);
    Ok(())
}

#[test]
fn test_reduce_unsupported_by_default() {
    let mut id = Identity;
    let err = id.reduce(&[], &[]).unwrap_err();
    assert!(matches!(
        err,
        Error::Unsupported {
            layer: "Identity",
            op: "reduce"
        }
    ));
    assert!(!err.is_fatal());
}
