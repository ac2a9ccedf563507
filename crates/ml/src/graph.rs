//! Operation records for the autodiff tape.

/// An operation recorded on a [`crate::tape::Tape`].
///
/// Scalar hyper-parameters of an op travel inside the variant; tensor
/// operands are referenced by node index.
#[derive(Clone, Debug, PartialEq)]
pub enum EOp {
    /// Input value, either a parameter or a constant
    Leaf,
    Add,
    Sub,
    Mul,
    /// `x [n, in] · wᵀ` for `w [out, in]`
    MatMul,
    /// Adds a `[c]` bias to every row of `[n, c]`
    AddBroadcast,
    /// Multiplies every element by a single-element operand
    Scale,
    MulScalar(f32),
    AddScalar(f32),
    Pow(f32),
    Exp,
    Log,
    Tanh,
    Relu,
    LeakyRelu(f32),
    /// Leaky ReLU with a learnable single-element slope as second operand
    PRelu,
    Clamp { min: f32, max: f32 },
    Min,
    /// Sums each row into a `[n, 1]` column
    RowSum,
    ReduceSum,
    ReduceMean,
    /// Joins `[n, p]` and `[n, q]` into `[n, p + q]`
    Concat,
    /// Columns `start..start + len`
    Slice { start: usize, len: usize },
    /// Picks one column per row
    Gather(Vec<usize>),
}

/// One recorded operation and the nodes it reads.
///
/// Unary ops repeat their operand in `b`; leaves point at themselves.
#[derive(Clone, Debug)]
pub struct Node {
    pub op: EOp,
    pub a: usize,
    pub b: usize,
    /// Whether any gradient can flow into this node
    pub requires_grad: bool,
}
