//! Dense channels-last tensors and the layout descriptor the kernels index with.

/// A dense row-major tensor (last axis fastest) with an explicit shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T> Tensor<T> {
    pub fn new(shape: Vec<usize>, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "data length must equal the product of the shape"
        );
        Self { shape, data }
    }

    /// Rank-1 tensor holding `values`.
    pub fn vector(values: Vec<T>) -> Self {
        Self {
            shape: vec![values.len()],
            data: values,
        }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn dims(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn dim(&self, axis: usize) -> usize {
        self.shape[axis]
    }

    #[inline]
    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Shape formatted as `[a,b,c]` for error messages.
    pub fn shape_string(&self) -> String {
        let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
        format!("[{}]", dims.join(","))
    }
}

impl<T: Clone> Tensor<T> {
    pub fn filled(shape: Vec<usize>, value: T) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![value; len],
        }
    }
}

impl<T: Default + Clone> Tensor<T> {
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::filled(shape, T::default())
    }
}

/// Layout of a batch of channels-last images or volumes.
///
/// 2-D images use `depth == 1`, so one offset formula serves both ranks:
/// `(((b * height + y) * width + x) * depth + z) * channels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Volume {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub depth: usize,
    pub channels: usize,
}

impl Volume {
    pub fn image(batch: usize, height: usize, width: usize, channels: usize) -> Self {
        Self {
            batch,
            height,
            width,
            depth: 1,
            channels,
        }
    }

    pub fn volume(
        batch: usize,
        height: usize,
        width: usize,
        depth: usize,
        channels: usize,
    ) -> Self {
        Self {
            batch,
            height,
            width,
            depth,
            channels,
        }
    }

    /// Number of spatial cells of one batch item.
    #[inline]
    pub fn cells(&self) -> usize {
        self.height * self.width * self.depth
    }

    /// Number of samples of one batch item.
    #[inline]
    pub fn item_len(&self) -> usize {
        self.cells() * self.channels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.batch * self.item_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offset of the first channel of cell `(y, x, z)` inside one batch item.
    #[inline]
    pub fn cell_offset(&self, y: usize, x: usize, z: usize) -> usize {
        debug_assert!(y < self.height && x < self.width && z < self.depth);
        ((y * self.width + x) * self.depth + z) * self.channels
    }

    /// Offset of the first channel of cell `(y, x, z)` in batch item `b`.
    #[inline]
    pub fn offset(&self, b: usize, y: usize, x: usize, z: usize) -> usize {
        debug_assert!(b < self.batch);
        b * self.item_len() + self.cell_offset(y, x, z)
    }

    /// Tensor shape: rank 4 when `is_3d` is false, rank 5 otherwise.
    pub fn shape(&self, is_3d: bool) -> Vec<usize> {
        if is_3d {
            vec![self.batch, self.height, self.width, self.depth, self.channels]
        } else {
            vec![self.batch, self.height, self.width, self.channels]
        }
    }
}
