use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::dtype::WithDType;
use crate::error::{Error, Result};
use crate::shape::Shape;

// Blob — The tensor layers read and write
//
// A Blob carries three regions of the same element type:
//
//   1. value     — the forward activations
//   2. gradient  — the backward "diff" for those activations
//   3. selection — optional per-channel mask used to narrow the channel axis
//
// MEMORY MODEL:
//
//   The value buffer lives behind Arc<RwLock<Vec<T>>>, so several blobs can
//   alias one buffer (share_data). A fan-out layer uses this to hand the
//   same activations to every consumer without copying. The buffer lives as
//   long as its longest holder.
//
//   The gradient buffer is a plain Vec<T> owned by exactly one blob. It is
//   never shared: every consumer of a fan-out writes its own gradient, and
//   the layer sums them.
//
// HANDLES AND IDENTITY:
//
//   Blob<T> is a cheap-clone handle around Arc<RwLock<BlobState<T>>>.
//   Cloning a Blob gives a second handle to the *same* blob, exactly like a
//   pointer in a graph executor's blob table. Blob::same_blob compares
//   handles by identity; layers use it to detect in-place wiring.
//
// CAPACITY:
//
//   reshape() only reallocates when the new element count exceeds the
//   capacity. Shrinking keeps the buffers and views only the first count
//   elements. Reallocation gives the blob a fresh value buffer, which also
//   ends any aliasing with another blob.

/// Unique identifier for a blob, used in logs and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(u64);

impl BlobId {
    fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        BlobId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The mutable contents of a blob, reached through [`Blob::read`] and
/// [`Blob::write`].
pub struct BlobState<T: WithDType> {
    shape: Shape,
    count: usize,
    capacity: usize,
    /// Shared, possibly aliased by other blobs.
    data: Arc<RwLock<Vec<T>>>,
    /// Owned, never aliased.
    diff: Vec<T>,
    /// One element per channel when present.
    select: Option<Vec<T>>,
}

impl<T: WithDType> BlobState<T> {
    fn new(shape: Shape) -> Self {
        let count = shape.elem_count();
        BlobState {
            shape,
            count,
            capacity: count,
            data: Arc::new(RwLock::new(vec![T::zero(); count])),
            diff: vec![T::zero(); count],
            select: None,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Number of elements in the current shape.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn num(&self) -> usize {
        self.shape.num()
    }

    pub fn channels(&self) -> usize {
        self.shape.channels()
    }

    pub fn height(&self) -> usize {
        self.shape.height()
    }

    pub fn width(&self) -> usize {
        self.shape.width()
    }

    /// Change the shape. Returns true when the buffers had to be reallocated.
    ///
    /// An existing selection buffer is resized to the new channel count,
    /// keeping its leading elements.
    pub fn reshape(&mut self, shape: Shape) -> bool {
        let count = shape.elem_count();
        let grew = count > self.capacity;
        if grew {
            self.capacity = count;
            self.data = Arc::new(RwLock::new(vec![T::zero(); count]));
            self.diff = vec![T::zero(); count];
        }
        if let Some(select) = self.select.as_mut() {
            select.resize(shape.channels(), T::zero());
        }
        self.shape = shape;
        self.count = count;
        grew
    }

    /// Alias `source`'s value buffer. Element counts must match.
    pub fn share_data(&mut self, source: &BlobState<T>) -> Result<()> {
        if self.count != source.count {
            return Err(Error::ShareCountMismatch {
                expected: self.count,
                got: source.count,
            });
        }
        let shared_len = source.data.read().unwrap_or_else(PoisonError::into_inner).len();
        self.data = Arc::clone(&source.data);
        // Growing past the shared buffer must reallocate rather than index
        // beyond it.
        self.capacity = self.capacity.min(shared_len);
        Ok(())
    }

    /// Whether both states hold the same value buffer.
    pub fn shares_data_with(&self, other: &BlobState<T>) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Run `f` over the first `count` values.
    pub fn with_data<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        f(&data[..self.count])
    }

    /// Run `f` over the first `count` values, mutably. Writes are visible
    /// through every blob aliasing this buffer.
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> R {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut data[..self.count])
    }

    /// The gradient for the current shape.
    pub fn diff(&self) -> &[T] {
        &self.diff[..self.count]
    }

    pub fn diff_mut(&mut self) -> &mut [T] {
        &mut self.diff[..self.count]
    }

    /// The selection buffer, if one has been allocated.
    pub fn select(&self) -> Option<&[T]> {
        self.select.as_deref()
    }

    pub fn select_mut(&mut self) -> Option<&mut [T]> {
        self.select.as_deref_mut()
    }

    /// Allocate (or clear) a zeroed selection buffer of `channels` elements.
    pub fn reset_select(&mut self) {
        let channels = self.channels();
        match self.select.as_mut() {
            Some(select) => {
                select.clear();
                select.resize(channels, T::zero());
            }
            None => self.select = Some(vec![T::zero(); channels]),
        }
    }
}

/// A shared handle to a shaped buffer of values, gradients and an optional
/// channel selection.
///
/// # Example
/// ```ignore
/// use wren_core::{Blob, Shape};
///
/// let x = Blob::<f32>::from_data(vec![1.0, 2.0, 3.0], Shape::from(3))?;
/// let y = Blob::<f32>::new(Shape::from(3));
/// y.share_data(&x)?;
/// assert_eq!(y.data_vec(), vec![1.0, 2.0, 3.0]);
/// ```
pub struct Blob<T: WithDType> {
    id: BlobId,
    state: Arc<RwLock<BlobState<T>>>,
}

// Manual Clone: a second handle to the same blob.
impl<T: WithDType> Clone for Blob<T> {
    fn clone(&self) -> Self {
        Blob {
            id: self.id,
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: WithDType> std::fmt::Debug for Blob<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Blob(id={:?}, shape={}, dtype={})",
            self.id,
            self.read().shape(),
            T::DTYPE,
        )
    }
}

impl<T: WithDType> Blob<T> {
    /// A zero-filled blob of the given shape.
    pub fn new(shape: impl Into<Shape>) -> Self {
        Blob {
            id: BlobId::new(),
            state: Arc::new(RwLock::new(BlobState::new(shape.into()))),
        }
    }

    /// A blob holding `values`, which must match the shape's element count.
    pub fn from_data(values: Vec<T>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.elem_count();
        if values.len() != expected {
            return Err(Error::ElementCountMismatch {
                shape,
                expected,
                got: values.len(),
            });
        }
        let blob = Blob::new(shape);
        blob.write().data = Arc::new(RwLock::new(values));
        Ok(blob)
    }

    pub fn id(&self) -> BlobId {
        self.id
    }

    /// Whether two handles refer to the same blob.
    pub fn same_blob(&self, other: &Blob<T>) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Lock the blob for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, BlobState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the blob for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, BlobState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shape(&self) -> Shape {
        self.read().shape().clone()
    }

    pub fn count(&self) -> usize {
        self.read().count()
    }

    pub fn num(&self) -> usize {
        self.read().num()
    }

    pub fn channels(&self) -> usize {
        self.read().channels()
    }

    pub fn height(&self) -> usize {
        self.read().height()
    }

    pub fn width(&self) -> usize {
        self.read().width()
    }

    /// Change the blob's shape, reallocating only when it grows past capacity.
    pub fn reshape(&self, shape: impl Into<Shape>) {
        let shape = shape.into();
        if self.write().reshape(shape) {
            log::trace!("{:?}: reallocated for {} elements", self.id, self.count());
        }
    }

    /// Make this blob's values an alias of `other`'s values.
    pub fn share_data(&self, other: &Blob<T>) -> Result<()> {
        if self.same_blob(other) {
            return Ok(());
        }
        let source = other.read();
        self.write().share_data(&source)
    }

    /// Whether this blob's values alias `other`'s values.
    pub fn shares_data_with(&self, other: &Blob<T>) -> bool {
        if self.same_blob(other) {
            return true;
        }
        let a = self.read();
        let b = other.read();
        a.shares_data_with(&b)
    }

    /// Copy of the current values.
    pub fn data_vec(&self) -> Vec<T> {
        self.read().with_data(|d| d.to_vec())
    }

    /// Overwrite the current values (visible through aliases).
    pub fn set_data(&self, values: &[T]) -> Result<()> {
        let state = self.read();
        check_len(state.shape(), state.count(), values.len())?;
        state.with_data_mut(|d| d.copy_from_slice(values));
        Ok(())
    }

    /// Copy of the current gradient.
    pub fn diff_vec(&self) -> Vec<T> {
        self.read().diff().to_vec()
    }

    /// Overwrite the gradient.
    pub fn set_diff(&self, values: &[T]) -> Result<()> {
        let mut state = self.write();
        check_len(state.shape(), state.count(), values.len())?;
        state.diff_mut().copy_from_slice(values);
        Ok(())
    }

    /// Fill the gradient with a single value.
    pub fn fill_diff(&self, value: T) {
        self.write().diff_mut().fill(value);
    }

    /// Copy of the selection buffer, if allocated.
    pub fn select_vec(&self) -> Option<Vec<T>> {
        self.read().select().map(|s| s.to_vec())
    }

    /// Allocate (or clear) a zeroed selection buffer, one element per channel.
    pub fn reset_select(&self) {
        self.write().reset_select();
    }

    /// Replace the selection buffer; `values` must hold one element per channel.
    pub fn set_select(&self, values: &[T]) -> Result<()> {
        let mut state = self.write();
        let channels = state.channels();
        if values.len() != channels {
            return Err(Error::ElementCountMismatch {
                shape: Shape::from(channels),
                expected: channels,
                got: values.len(),
            });
        }
        state.select = Some(values.to_vec());
        Ok(())
    }
}

fn check_len(shape: &Shape, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::ElementCountMismatch {
            shape: shape.clone(),
            expected,
            got,
        });
    }
    Ok(())
}
