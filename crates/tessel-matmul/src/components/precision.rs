use half::{bf16, f16};
use tessel_common::Numeric;

/// Matrix multiplication precisions.
pub trait MatmulPrecision: Send + Sync + 'static {
    /// Element type of the lhs tensor, also used to stage it in shared memory.
    type Lhs: Numeric;
    /// Element type of the rhs tensor, also used to stage it in shared memory.
    type Rhs: Numeric;
    /// Element type of the accumulators held in lane registers.
    type Acc: Numeric;
    /// Element type of the output tensor.
    type Out: Numeric;

    /// Element names as `lhs,rhs -> acc -> out`, used in launch logs.
    fn name() -> String {
        format!(
            "{},{} -> {} -> {}",
            <Self::Lhs as Numeric>::NAME,
            <Self::Rhs as Numeric>::NAME,
            <Self::Acc as Numeric>::NAME,
            <Self::Out as Numeric>::NAME,
        )
    }
}

impl<L: Numeric, R: Numeric, A: Numeric, O: Numeric> MatmulPrecision for (L, R, A, O) {
    type Lhs = L;
    type Rhs = R;
    type Acc = A;
    type Out = O;
}

impl MatmulPrecision for f16 {
    type Lhs = f16;
    type Rhs = f16;
    type Acc = f32;
    type Out = f16;
}

impl MatmulPrecision for bf16 {
    type Lhs = bf16;
    type Rhs = bf16;
    type Acc = f32;
    type Out = bf16;
}

impl MatmulPrecision for f32 {
    type Lhs = f32;
    type Rhs = f32;
    type Acc = f32;
    type Out = f32;
}

impl MatmulPrecision for f64 {
    type Lhs = f64;
    type Rhs = f64;
    type Acc = f64;
    type Out = f64;
}

impl MatmulPrecision for i8 {
    type Lhs = i8;
    type Rhs = i8;
    type Acc = i32;
    type Out = i32;
}

/// Lhs element type of a [MatmulPrecision].
pub type Lhs<MP> = <MP as MatmulPrecision>::Lhs;
/// Rhs element type of a [MatmulPrecision].
pub type Rhs<MP> = <MP as MatmulPrecision>::Rhs;
/// Accumulator element type of a [MatmulPrecision].
pub type Acc<MP> = <MP as MatmulPrecision>::Acc;
/// Output element type of a [MatmulPrecision].
pub type Out<MP> = <MP as MatmulPrecision>::Out;
