// Layer trait — The contract every graph node implements
//
// A graph executor owns all blobs and drives each layer through three
// passes per iteration:
//
//   reshape()   once per shape change: derive output shapes from inputs
//   forward()   push values from inputs to outputs
//   backward()  push gradients from outputs back to inputs
//
// Layers never allocate blobs. They receive handles to the executor's blobs
// and mutate them in place. The number of inputs and outputs is fixed by the
// graph topology; a layer only declares what counts it accepts.
//
// MUTABILITY:
//
// reshape() (and reduce()) take &mut self because they refresh per-instance
// cached sizes. forward() and backward() take &self. The borrow checker
// therefore guarantees no forward/backward on an instance can observe a
// half-updated cache.
//
// ERRORS:
//
// Every failure a layer reports is an invariant violation of the graph it
// was handed (see wren_core::Error::is_fatal). Executors should abort the
// pass, not retry.

use wren_core::error::{Error, Result};
use wren_core::{Blob, WithDType};

/// The interface every computational node implements.
///
/// Layers are chosen per node when the graph is built and are then driven
/// uniformly, typically as `Box<dyn Layer<T>>`.
///
/// # Example
/// ```ignore
/// let mut layer: Box<dyn Layer<f32>> = Box::new(SplitLayer::<f32>::new("fan"));
/// layer.setup(&inputs, &outputs)?;
/// layer.forward(&inputs, &outputs)?;
/// layer.backward(&outputs, &[true], &inputs)?;
/// ```
pub trait Layer<T: WithDType>: Send {
    /// Short type name used in diagnostics (e.g. "Split").
    fn type_name(&self) -> &'static str;

    /// Instance name from the graph definition.
    fn name(&self) -> &str;

    /// Exact number of input blobs, if the layer fixes it.
    fn exact_num_inputs(&self) -> Option<usize> {
        None
    }

    /// Minimum number of output blobs, if the layer requires one.
    fn min_outputs(&self) -> Option<usize> {
        None
    }

    /// Validate blob counts against [`exact_num_inputs`](Self::exact_num_inputs)
    /// and [`min_outputs`](Self::min_outputs).
    fn check_blob_counts(&self, inputs: &[Blob<T>], outputs: &[Blob<T>]) -> Result<()> {
        if let Some(expected) = self.exact_num_inputs() {
            if inputs.len() != expected {
                return Err(Error::InputCountMismatch {
                    layer: self.type_name(),
                    expected,
                    got: inputs.len(),
                });
            }
        }
        if let Some(min) = self.min_outputs() {
            if outputs.len() < min {
                return Err(Error::TooFewOutputs {
                    layer: self.type_name(),
                    min,
                    got: outputs.len(),
                });
            }
        }
        Ok(())
    }

    /// Validate that there is one propagate-down flag per input.
    fn check_propagate_down(&self, propagate_down: &[bool], inputs: &[Blob<T>]) -> Result<()> {
        if propagate_down.len() != inputs.len() {
            return Err(Error::PropagateDownMismatch {
                layer: self.type_name(),
                expected: inputs.len(),
                got: propagate_down.len(),
            });
        }
        Ok(())
    }

    /// One-time setup: check blob counts, then shape the outputs.
    fn setup(&mut self, inputs: &[Blob<T>], outputs: &[Blob<T>]) -> Result<()> {
        self.check_blob_counts(inputs, outputs)?;
        self.reshape(inputs, outputs)
    }

    /// Derive output shapes from input shapes and refresh cached sizes.
    fn reshape(&mut self, inputs: &[Blob<T>], outputs: &[Blob<T>]) -> Result<()>;

    /// Forward pass: compute output values from input values.
    fn forward(&self, inputs: &[Blob<T>], outputs: &[Blob<T>]) -> Result<()>;

    /// Backward pass: compute input gradients from output gradients.
    ///
    /// `propagate_down[i]` says whether input `i` needs a gradient at all.
    fn backward(
        &self,
        outputs: &[Blob<T>],
        propagate_down: &[bool],
        inputs: &[Blob<T>],
    ) -> Result<()>;

    /// Narrow the inputs to match a channel selection made downstream.
    ///
    /// Only layers that support dynamic channel pruning implement this.
    fn reduce(&mut self, _inputs: &[Blob<T>], _outputs: &[Blob<T>]) -> Result<()> {
        Err(Error::Unsupported {
            layer: self.type_name(),
            op: "reduce",
        })
    }
}
