use alloc::{format, rc::Rc, vec::Vec};
use core::cell::{Cell, RefCell};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};

use tessel_common::Numeric;

use crate::cube::CubeState;

/// How a store combines with the value already at the destination.
#[derive(
    Default, Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum WriteMode {
    /// Overwrite the destination.
    #[default]
    Set,
    /// Add to the destination atomically.
    AtomicAdd,
}

/// Memory that can be read one line (contiguous vector of elements) at a time.
pub trait ReadBuffer<E: Numeric> {
    /// Number of elements in the buffer.
    fn len(&self) -> usize;

    /// Whether the buffer has no element.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads `line.len()` consecutive elements starting at `offset`.
    ///
    /// Invalid lines are not read, they are filled with zeros.
    fn read_line(&self, offset: usize, valid: bool, line: &mut [E]);
}

/// Memory that can be written one line at a time.
pub trait WriteBuffer<E: Numeric> {
    /// Writes `line` at `offset` according to `mode`. Invalid lines are skipped.
    fn write_line(&self, offset: usize, valid: bool, line: &[E], mode: WriteMode);
}

impl<E: Numeric> ReadBuffer<E> for [E] {
    fn len(&self) -> usize {
        <[E]>::len(self)
    }

    fn read_line(&self, offset: usize, valid: bool, line: &mut [E]) {
        if valid {
            line.copy_from_slice(&self[offset..offset + line.len()]);
        } else {
            line.fill(E::zero());
        }
    }
}

/// Memory shared by every unit of a cube.
///
/// Accesses are tracked per phase: reading data written during the same phase, or writing data
/// read during the same phase, means a barrier is missing and is reported as a hazard on the cube.
pub struct SharedMemory<E: Numeric> {
    data: RefCell<Vec<E>>,
    state: Rc<CubeState>,
    last_write: Cell<Option<u32>>,
    last_read: Cell<Option<u32>>,
}

impl<E: Numeric> SharedMemory<E> {
    pub(crate) fn new(len: usize, state: Rc<CubeState>) -> Self {
        Self {
            data: RefCell::new(vec![E::zero(); len]),
            state,
            last_write: Cell::new(None),
            last_read: Cell::new(None),
        }
    }

    fn track_read(&self) {
        let phase = self.state.phase.get();
        if self.state.check_hazards && self.last_write.get() == Some(phase) {
            self.state.report_hazard(|| {
                format!("Shared memory read in phase {phase} of data written in the same phase")
            });
        }
        self.last_read.set(Some(phase));
    }

    fn track_write(&self) {
        let phase = self.state.phase.get();
        if self.state.check_hazards && self.last_read.get() == Some(phase) {
            self.state.report_hazard(|| {
                format!("Shared memory written in phase {phase} while being read in the same phase")
            });
        }
        self.last_write.set(Some(phase));
    }

    /// Copy of the whole content, without hazard tracking.
    pub fn snapshot(&self) -> Vec<E> {
        self.data.borrow().clone()
    }
}

impl<E: Numeric> ReadBuffer<E> for SharedMemory<E> {
    fn len(&self) -> usize {
        self.data.borrow().len()
    }

    fn read_line(&self, offset: usize, valid: bool, line: &mut [E]) {
        self.track_read();
        self.data.borrow().as_slice().read_line(offset, valid, line);
    }
}

impl<E: Numeric> WriteBuffer<E> for SharedMemory<E> {
    fn write_line(&self, offset: usize, valid: bool, line: &[E], mode: WriteMode) {
        self.track_write();
        if !valid {
            return;
        }
        let mut data = self.data.borrow_mut();
        let dst = &mut data[offset..offset + line.len()];
        match mode {
            WriteMode::Set => dst.copy_from_slice(line),
            WriteMode::AtomicAdd => {
                for (d, v) in dst.iter_mut().zip(line.iter()) {
                    *d += *v;
                }
            }
        }
    }
}

/// Global memory written by many cubes concurrently.
///
/// Each element lives in its own atomic word so that [WriteMode::AtomicAdd] is a real atomic
/// read-modify-write at element granularity.
pub struct GlobalOutput<E: Numeric> {
    words: Vec<AtomicU64>,
    _element: PhantomData<E>,
}

impl<E: Numeric> GlobalOutput<E> {
    /// Zero-initialized buffer of `len` elements.
    pub fn zeros(len: usize) -> Self {
        Self::from_values(core::iter::repeat_n(E::zero(), len))
    }

    /// Buffer initialized with `values`.
    pub fn from_slice(values: &[E]) -> Self {
        Self::from_values(values.iter().copied())
    }

    fn from_values(values: impl Iterator<Item = E>) -> Self {
        Self {
            words: values.map(|v| AtomicU64::new(v.to_word())).collect(),
            _element: PhantomData,
        }
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> E {
        E::from_word(self.words[index].load(Ordering::Acquire))
    }

    /// Copies the content of the buffer.
    pub fn to_vec(&self) -> Vec<E> {
        (0..self.words.len()).map(|i| self.get(i)).collect()
    }

    /// Copies the content of the buffer into `out`, which must have the same length.
    pub fn copy_to(&self, out: &mut [E]) {
        for (i, value) in out.iter_mut().enumerate() {
            *value = self.get(i);
        }
    }

    /// Stores a single element.
    pub fn store(&self, index: usize, value: E, mode: WriteMode) {
        let word = &self.words[index];
        match mode {
            WriteMode::Set => word.store(value.to_word(), Ordering::Release),
            WriteMode::AtomicAdd => {
                // The closure never declines the update, so the result is always `Ok`.
                let _ = word.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some((E::from_word(current) + value).to_word())
                });
            }
        }
    }
}

impl<E: Numeric> ReadBuffer<E> for GlobalOutput<E> {
    fn len(&self) -> usize {
        self.words.len()
    }

    fn read_line(&self, offset: usize, valid: bool, line: &mut [E]) {
        for (i, value) in line.iter_mut().enumerate() {
            *value = if valid { self.get(offset + i) } else { E::zero() };
        }
    }
}

impl<E: Numeric> WriteBuffer<E> for GlobalOutput<E> {
    fn write_line(&self, offset: usize, valid: bool, line: &[E], mode: WriteMode) {
        if !valid {
            return;
        }
        for (i, value) in line.iter().enumerate() {
            self.store(offset + i, *value, mode);
        }
    }
}
