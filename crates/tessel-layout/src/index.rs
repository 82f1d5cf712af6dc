use core::fmt::Display;
use core::ops::{Add, Deref, DerefMut, Mul, Neg, Sub};

/// Single signed index along one dimension.
///
/// Signed so that steps and reset deltas can be expressed with the same type.
pub type Index = i64;

/// Ordered tuple of indices, one per dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MultiIndex(Vec<Index>);

impl MultiIndex {
    /// Index with `rank` zero entries.
    pub fn zeros(rank: usize) -> Self {
        Self(vec![0; rank])
    }

    /// Index with `rank` entries all set to `value`.
    pub fn splat(rank: usize, value: Index) -> Self {
        Self(vec![value; rank])
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Product of every entry.
    pub fn product(&self) -> Index {
        self.0.iter().product()
    }

    /// `new[i] = self[new2old[i]]`.
    pub fn reorder_new2old(&self, new2old: &[usize]) -> Self {
        Self(new2old.iter().map(|&old| self.0[old]).collect())
    }

    /// `new[old2new[i]] = self[i]`.
    pub fn reorder_old2new(&self, old2new: &[usize]) -> Self {
        let mut out = vec![0; self.0.len()];
        for (old, &new) in old2new.iter().enumerate() {
            out[new] = self.0[old];
        }
        Self(out)
    }

    /// Unit vector of `rank` along `dim`, scaled by `value`.
    pub fn unit(rank: usize, dim: usize, value: Index) -> Self {
        let mut out = Self::zeros(rank);
        out.0[dim] = value;
        out
    }

    /// Whether every entry is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }

    /// Consumes the index, returning the raw entries.
    pub fn into_inner(self) -> Vec<Index> {
        self.0
    }
}

impl Deref for MultiIndex {
    type Target = [Index];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MultiIndex {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Index>> for MultiIndex {
    fn from(value: Vec<Index>) -> Self {
        Self(value)
    }
}

impl<const N: usize> From<[Index; N]> for MultiIndex {
    fn from(value: [Index; N]) -> Self {
        Self(value.to_vec())
    }
}

impl From<&[Index]> for MultiIndex {
    fn from(value: &[Index]) -> Self {
        Self(value.to_vec())
    }
}

impl FromIterator<Index> for MultiIndex {
    fn from_iter<T: IntoIterator<Item = Index>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for MultiIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str(")")
    }
}

macro_rules! elementwise {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<&MultiIndex> for &MultiIndex {
            type Output = MultiIndex;

            fn $method(self, rhs: &MultiIndex) -> MultiIndex {
                debug_assert_eq!(self.rank(), rhs.rank(), "Rank mismatch");
                self.0.iter().zip(rhs.0.iter()).map(|(a, b)| a $op b).collect()
            }
        }

        impl $trait<MultiIndex> for MultiIndex {
            type Output = MultiIndex;

            fn $method(self, rhs: MultiIndex) -> MultiIndex {
                &self $op &rhs
            }
        }

        impl $trait<&MultiIndex> for MultiIndex {
            type Output = MultiIndex;

            fn $method(self, rhs: &MultiIndex) -> MultiIndex {
                &self $op rhs
            }
        }
    };
}

elementwise!(Add, add, +);
elementwise!(Sub, sub, -);
elementwise!(Mul, mul, *);

impl Neg for &MultiIndex {
    type Output = MultiIndex;

    fn neg(self) -> MultiIndex {
        self.0.iter().map(|v| -v).collect()
    }
}

impl Neg for MultiIndex {
    type Output = MultiIndex;

    fn neg(self) -> MultiIndex {
        -&self
    }
}

/// Whether `order` is a permutation of `0..rank`.
pub fn is_permutation(order: &[usize], rank: usize) -> bool {
    if order.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &dim in order {
        if dim >= rank || seen[dim] {
            return false;
        }
        seen[dim] = true;
    }
    true
}
