// Split — Fan one blob out to many consumers, fan their gradients back in
//
// When a blob feeds several layers, the graph routes it through a Split:
//
//              ┌─> out[0] ─> consumer A
//   input ─────┼─> out[1] ─> consumer B
//              └─> out[2] ─> consumer C
//
// FORWARD: every output aliases the input's value buffer. No element is
// copied; a fan-out only hands the same activations to each consumer.
//
// BACKWARD: each consumer leaves a gradient in its own output blob. The
// input gradient is their sum, accumulated strictly in output order:
//
//   N = 1:  in.diff  = out[0].diff                        (copy)
//   N ≥ 2:  in.diff  = out[0].diff + out[1].diff          (fused add)
//           in.diff += out[i].diff   for i = 2..N          (axpy, alpha = 1)
//
// For floating point the order matters; ((a + b) + c) is what callers get.
//
// IN-PLACE IS FORBIDDEN: values are shared by reference while gradients
// must stay separate per output. An output that *is* the input would make
// the input gradient an alias of one of the summands.

use std::marker::PhantomData;

use log::{debug, trace};

use wren_core::error::{Error, Result};
use wren_core::{Backend, Blob, CpuBackend, WithDType};

use crate::layer::Layer;

const TYPE_NAME: &str = "Split";

/// Fan-out / fan-in layer: one input, one or more outputs.
///
/// # Examples
/// ```ignore
/// let x = Blob::<f32>::from_data(vec![1.0, 2.0, 3.0], (1, 3, 1, 1))?;
/// let outs = vec![Blob::new(()), Blob::new(())];
/// let mut split = SplitLayer::<f32>::new("fan");
/// split.setup(&[x.clone()], &outs)?;
/// split.forward(&[x.clone()], &outs)?;   // outs alias x's values
/// ```
pub struct SplitLayer<T: WithDType, B: Backend = CpuBackend> {
    name: String,
    /// Input element count as of the last reshape/reduce.
    count: usize,
    _marker: PhantomData<(T, B)>,
}

impl<T: WithDType, B: Backend> SplitLayer<T, B> {
    pub fn new(name: impl Into<String>) -> Self {
        SplitLayer {
            name: name.into(),
            count: 0,
            _marker: PhantomData,
        }
    }

    /// Element count cached by the last reshape or reduce.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Reject outputs that are the input, or that repeat another output.
    fn check_wiring(&self, input: &Blob<T>, outputs: &[Blob<T>]) -> Result<()> {
        for (index, out) in outputs.iter().enumerate() {
            if out.same_blob(input) {
                return Err(Error::InPlaceNotAllowed {
                    layer: TYPE_NAME,
                    index,
                });
            }
            if let Some(first) = outputs[..index].iter().position(|o| o.same_blob(out)) {
                return Err(Error::DuplicateOutput {
                    layer: TYPE_NAME,
                    index,
                    first,
                });
            }
        }
        Ok(())
    }
}

impl<T: WithDType, B: Backend> Layer<T> for SplitLayer<T, B> {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn exact_num_inputs(&self) -> Option<usize> {
        Some(1)
    }

    fn min_outputs(&self) -> Option<usize> {
        Some(1)
    }

    fn reshape(&mut self, inputs: &[Blob<T>], outputs: &[Blob<T>]) -> Result<()> {
        self.check_blob_counts(inputs, outputs)?;
        let input = &inputs[0];
        self.check_wiring(input, outputs)?;

        let shape = input.shape();
        self.count = shape.elem_count();
        for (index, out) in outputs.iter().enumerate() {
            out.reshape(shape.clone());
            let got = out.count();
            if got != self.count {
                return Err(Error::CountMismatch {
                    layer: TYPE_NAME,
                    index,
                    expected: self.count,
                    got,
                });
            }
        }
        debug!(
            "{} '{}': {} output(s) shaped {} ({} elements)",
            TYPE_NAME,
            self.name,
            outputs.len(),
            shape,
            self.count
        );
        Ok(())
    }

    fn forward(&self, inputs: &[Blob<T>], outputs: &[Blob<T>]) -> Result<()> {
        self.check_blob_counts(inputs, outputs)?;
        let input = &inputs[0];
        self.check_wiring(input, outputs)?;

        for out in outputs {
            out.share_data(input)?;
        }
        trace!(
            "{} '{}': forward shared {:?} with {} output(s)",
            TYPE_NAME,
            self.name,
            input.id(),
            outputs.len()
        );
        Ok(())
    }

    fn backward(
        &self,
        outputs: &[Blob<T>],
        propagate_down: &[bool],
        inputs: &[Blob<T>],
    ) -> Result<()> {
        self.check_blob_counts(inputs, outputs)?;
        self.check_propagate_down(propagate_down, inputs)?;
        if !propagate_down[0] {
            return Ok(());
        }
        let input = &inputs[0];
        self.check_wiring(input, outputs)?;

        let count = self.count;
        let mut state = input.write();
        let diff = state.diff_mut();
        match outputs {
            [only] => {
                let top = only.read();
                B::copy(count, top.diff(), diff)?;
            }
            [first, second, rest @ ..] => {
                {
                    let a = first.read();
                    let b = second.read();
                    B::add(count, a.diff(), b.diff(), diff)?;
                }
                for top in rest {
                    let top = top.read();
                    B::axpy(count, T::one(), top.diff(), diff)?;
                }
            }
            [] => {
                return Err(Error::TooFewOutputs {
                    layer: TYPE_NAME,
                    min: 1,
                    got: 0,
                })
            }
        }
        trace!(
            "{} '{}': backward summed {} gradient(s) over {} elements",
            TYPE_NAME,
            self.name,
            outputs.len(),
            count
        );
        Ok(())
    }

    /// Copy output 0's channel selection onto the input and narrow the
    /// input's channel axis to match.
    ///
    /// The selection is copied before the input is reshaped; the reshape
    /// keeps the leading selection elements. Outputs are left untouched,
    /// so the executor must call [`reshape`](Layer::reshape) again before
    /// the next forward pass.
    fn reduce(&mut self, inputs: &[Blob<T>], outputs: &[Blob<T>]) -> Result<()> {
        self.check_blob_counts(inputs, outputs)?;
        let input = &inputs[0];
        self.check_wiring(input, outputs)?;

        let top = outputs[0].read();
        let channels = top.channels();
        let select = top
            .select()
            .ok_or(Error::MissingSelection { layer: TYPE_NAME })?;

        let mut state = input.write();
        state.reset_select();
        let dst = state
            .select_mut()
            .ok_or(Error::MissingSelection { layer: TYPE_NAME })?;
        if dst.len() < channels {
            return Err(Error::SelectionTooShort {
                needed: channels,
                got: dst.len(),
            });
        }
        B::copy(channels, select, dst)?;

        let shape = state.shape().with_channels(channels);
        state.reshape(shape);
        self.count = state.count();
        debug!(
            "{} '{}': input narrowed to {} ({} elements)",
            TYPE_NAME,
            self.name,
            state.shape(),
            self.count
        );
        Ok(())
    }
}
