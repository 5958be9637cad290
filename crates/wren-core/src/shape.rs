use std::fmt;

// Shape — N-dimensional shape of a blob
//
// Layers in this engine think in the classic image-batch layout
// [num, channels, height, width], but a Shape is just a list of dims:
//   - Scalar: Shape([])            — 0 dimensions, 1 element
//   - Vector: Shape([5])           — 1 dimension, 5 elements
//   - Batch:  Shape([2, 3, 4, 4])  — num=2, channels=3, 4x4 spatial
//
// The element count is the product of all dims. A zero-sized dimension is
// legal and gives an empty blob; every kernel treats that as a no-op.
//
// The num()/channels()/height()/width() accessors read the first four axes
// and report 1 for any axis the shape does not have, so a [N, C] blob reads
// as [N, C, 1, 1].

/// N-dimensional shape of a blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// Four-axis image-batch shape.
    pub fn nchw(num: usize, channels: usize, height: usize, width: usize) -> Self {
        Shape(vec![num, channels, height, width])
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element; any zero dimension gives 0.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> crate::Result<usize> {
        self.0.get(d).copied().ok_or(crate::Error::DimOutOfRange {
            dim: d,
            rank: self.rank(),
        })
    }

    fn legacy_dim(&self, d: usize) -> usize {
        self.0.get(d).copied().unwrap_or(1)
    }

    /// Batch size (axis 0).
    pub fn num(&self) -> usize {
        self.legacy_dim(0)
    }

    /// Channel count (axis 1).
    pub fn channels(&self) -> usize {
        self.legacy_dim(1)
    }

    /// Height (axis 2).
    pub fn height(&self) -> usize {
        self.legacy_dim(2)
    }

    /// Width (axis 3).
    pub fn width(&self) -> usize {
        self.legacy_dim(3)
    }

    /// Same shape with the channel axis replaced, as a four-axis shape.
    pub fn with_channels(&self, channels: usize) -> Shape {
        Shape::nchw(self.num(), channels, self.height(), self.width())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// Convenient From implementations
// These let you write: Shape::from((2, 3, 4, 4)) instead of Shape::nchw(2, 3, 4, 4)

impl From<()> for Shape {
    /// Scalar shape (0 dimensions).
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}
