#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
/// Identifier for all three tensors in a matmul
///
/// Useful to specialize some functions depending on the tensor
pub enum MatmulIdent {
    Lhs,
    Rhs,
    Out,
}

impl MatmulIdent {
    /// Name used in logs and buffer validation.
    pub fn name(&self) -> &'static str {
        match self {
            MatmulIdent::Lhs => "lhs",
            MatmulIdent::Rhs => "rhs",
            MatmulIdent::Out => "out",
        }
    }
}
