use std::fmt;

use rayon::prelude::*;

use crate::dtype::WithDType;
use crate::error::{Error, Result};

// Backend — The numeric kernel library layers delegate to
//
// Layers never loop over elements themselves. Every element-wise step goes
// through one of four kernels over contiguous buffers:
//
//   copy(n, src, dst)         dst[i] = src[i]
//   add(n, a, b, dst)         dst[i] = a[i] + b[i]
//   axpy(n, alpha, x, y)      y[i]   = alpha * x[i] + y[i]
//   set(n, value, dst)        dst[i] = value
//
// Only the first n elements are touched; buffers may be longer (a blob keeps
// its capacity across shrinking reshapes). A buffer shorter than n is an
// error, never a partial write. n == 0 is always a no-op.
//
// WHY A TRAIT?
//
// The kernels are associated functions, so a layer generic over
// B: Backend is monomorphized per backend with no dynamic dispatch on the
// hot path. An accelerator backend is a new impl of this trait; layers do
// not change.

/// Element-wise kernels over contiguous buffers.
pub trait Backend: Clone + Send + Sync + fmt::Debug + 'static {
    /// A human-readable name for this backend (e.g., "cpu").
    fn name() -> &'static str;

    /// `dst[..n] = src[..n]`
    fn copy<T: WithDType>(n: usize, src: &[T], dst: &mut [T]) -> Result<()>;

    /// `dst[..n] = a[..n] + b[..n]`
    fn add<T: WithDType>(n: usize, a: &[T], b: &[T], dst: &mut [T]) -> Result<()>;

    /// `y[..n] += alpha * x[..n]`
    fn axpy<T: WithDType>(n: usize, alpha: T, x: &[T], y: &mut [T]) -> Result<()>;

    /// `dst[..n] = value`
    fn set<T: WithDType>(n: usize, value: T, dst: &mut [T]) -> Result<()>;
}

/// Reject a buffer that cannot hold `n` elements.
pub fn check_len(op: &'static str, n: usize, len: usize) -> Result<()> {
    if n > len {
        return Err(Error::KernelLength { op, n, len });
    }
    Ok(())
}

// CpuBackend
//
// Plain loops below PARALLEL_THRESHOLD elements; above it the buffers are
// cut into fixed-size chunks and processed on the rayon pool. Each output
// element still depends on exactly the same inputs in the same order, so
// the parallel path is bit-identical to the serial one.

const PARALLEL_THRESHOLD: usize = 1 << 16;
const CHUNK: usize = 1 << 13;

/// The host CPU backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuBackend;

fn add_serial<T: WithDType>(a: &[T], b: &[T], dst: &mut [T]) {
    for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
        *d = x + y;
    }
}

fn axpy_serial<T: WithDType>(alpha: T, x: &[T], y: &mut [T]) {
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = alpha * xi + *yi;
    }
}

impl Backend for CpuBackend {
    fn name() -> &'static str {
        "cpu"
    }

    fn copy<T: WithDType>(n: usize, src: &[T], dst: &mut [T]) -> Result<()> {
        check_len("copy", n, src.len())?;
        check_len("copy", n, dst.len())?;
        dst[..n].copy_from_slice(&src[..n]);
        Ok(())
    }

    fn add<T: WithDType>(n: usize, a: &[T], b: &[T], dst: &mut [T]) -> Result<()> {
        check_len("add", n, a.len())?;
        check_len("add", n, b.len())?;
        check_len("add", n, dst.len())?;
        let (a, b, dst) = (&a[..n], &b[..n], &mut dst[..n]);
        if n >= PARALLEL_THRESHOLD {
            dst.par_chunks_mut(CHUNK)
                .zip(a.par_chunks(CHUNK))
                .zip(b.par_chunks(CHUNK))
                .for_each(|((d, a), b)| add_serial(a, b, d));
        } else {
            add_serial(a, b, dst);
        }
        Ok(())
    }

    fn axpy<T: WithDType>(n: usize, alpha: T, x: &[T], y: &mut [T]) -> Result<()> {
        check_len("axpy", n, x.len())?;
        check_len("axpy", n, y.len())?;
        let (x, y) = (&x[..n], &mut y[..n]);
        if n >= PARALLEL_THRESHOLD {
            y.par_chunks_mut(CHUNK)
                .zip(x.par_chunks(CHUNK))
                .for_each(|(y, x)| axpy_serial(alpha, x, y));
        } else {
            axpy_serial(alpha, x, y);
        }
        Ok(())
    }

    fn set<T: WithDType>(n: usize, value: T, dst: &mut [T]) -> Result<()> {
        check_len("set", n, dst.len())?;
        dst[..n].fill(value);
        Ok(())
    }
}
