use crate::graph::{EOp, Node};
use crate::Tensor;
use anyhow::{ensure, Result};

/// Handle to a value recorded on a [`Tape`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Var(usize);

impl Var {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A tape that records operations for automatic differentiation.
///
/// Every op evaluates eagerly and stores its output. Gradients only flow
/// through nodes that descend from a leaf created with `requires_grad`, so
/// values bound as constants (target networks, frozen critics, detached
/// estimates) never receive any.
#[derive(Default)]
pub struct Tape {
    nodes: Vec<Node>,
    values: Vec<Tensor>,
    grads: Vec<Option<Vec<f32>>>,
}

impl Tape {
    /// Creates a new, empty tape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaf(&mut self, value: Tensor, requires_grad: bool) -> Var {
        let idx = self.nodes.len();
        self.nodes.push(Node { op: EOp::Leaf, a: idx, b: idx, requires_grad });
        self.values.push(value);
        Var(idx)
    }

    pub fn constant(&mut self, value: Tensor) -> Var {
        self.leaf(value, false)
    }

    pub fn param(&mut self, value: &Tensor) -> Var {
        self.leaf(value.clone(), true)
    }

    /// Copies the current value of `v` into a fresh constant.
    pub fn detach(&mut self, v: Var) -> Var {
        let value = self.values[v.0].clone();
        self.constant(value)
    }

    #[must_use]
    pub fn value(&self, v: Var) -> &Tensor {
        &self.values[v.0]
    }

    /// Gradient of the last [`Tape::backward`] loss with respect to leaf `v`.
    #[must_use]
    pub fn grad(&self, v: Var) -> Option<&[f32]> {
        self.grads.get(v.0).and_then(|g| g.as_deref())
    }

    fn push(&mut self, op: EOp, a: Var, b: Var, out: Tensor) -> Var {
        let requires_grad = self.nodes[a.0].requires_grad || self.nodes[b.0].requires_grad;
        let idx = self.nodes.len();
        self.nodes.push(Node { op, a: a.0, b: b.0, requires_grad });
        self.values.push(out);
        Var(idx)
    }

    fn unary(&mut self, op: EOp, a: Var, f: impl Fn(f32) -> f32) -> Var {
        let x = &self.values[a.0];
        let out = Tensor { data: x.data.iter().map(|&v| f(v)).collect(), shape: x.shape.clone() };
        self.push(op, a, a, out)
    }

    fn binary(&mut self, op: EOp, a: Var, b: Var, f: impl Fn(f32, f32) -> f32) -> Var {
        let (x, y) = (&self.values[a.0], &self.values[b.0]);
        assert_eq!(x.len(), y.len(), "{op:?}: {:?} vs {:?}", x.shape, y.shape);
        let data = x.data.iter().zip(&y.data).map(|(&p, &q)| f(p, q)).collect();
        let out = Tensor { data, shape: x.shape.clone() };
        self.push(op, a, b, out)
    }

    pub fn add(&mut self, a: Var, b: Var) -> Var {
        self.binary(EOp::Add, a, b, |p, q| p + q)
    }

    pub fn sub(&mut self, a: Var, b: Var) -> Var {
        self.binary(EOp::Sub, a, b, |p, q| p - q)
    }

    pub fn mul(&mut self, a: Var, b: Var) -> Var {
        self.binary(EOp::Mul, a, b, |p, q| p * q)
    }

    pub fn min(&mut self, a: Var, b: Var) -> Var {
        self.binary(EOp::Min, a, b, f32::min)
    }

    /// `x [n, in] · wᵀ` for a weight matrix `w [out, in]`.
    pub fn matmul(&mut self, x: Var, w: Var) -> Var {
        let (n, in_dim) = self.values[x.0].dims();
        let (out_dim, w_in) = self.values[w.0].dims();
        assert_eq!(in_dim, w_in, "matmul: input width {in_dim} vs weight width {w_in}");
        let (xs, ws) = (&self.values[x.0].data, &self.values[w.0].data);
        let mut y = vec![0.0; n * out_dim];
        for k in 0..n {
            let row = &xs[k * in_dim..(k + 1) * in_dim];
            for o in 0..out_dim {
                let wrow = &ws[o * in_dim..(o + 1) * in_dim];
                y[k * out_dim + o] = row.iter().zip(wrow).map(|(p, q)| p * q).sum();
            }
        }
        self.push(EOp::MatMul, x, w, Tensor::from_vec(vec![n, out_dim], y))
    }

    pub fn add_broadcast(&mut self, x: Var, bias: Var) -> Var {
        let (n, c) = self.values[x.0].dims();
        let b = &self.values[bias.0].data;
        assert_eq!(b.len(), c, "bias width");
        let data = self.values[x.0]
            .data
            .iter()
            .enumerate()
            .map(|(i, v)| v + b[i % c])
            .collect();
        self.push(EOp::AddBroadcast, x, bias, Tensor::from_vec(vec![n, c], data))
    }

    /// Multiplies `x` by the single value held in `s`.
    pub fn scale(&mut self, x: Var, s: Var) -> Var {
        assert_eq!(self.values[s.0].len(), 1, "scale operand must hold one value");
        let k = self.values[s.0].data[0];
        let x_val = &self.values[x.0];
        let out =
            Tensor { data: x_val.data.iter().map(|v| v * k).collect(), shape: x_val.shape.clone() };
        self.push(EOp::Scale, x, s, out)
    }

    pub fn mul_scalar(&mut self, x: Var, k: f32) -> Var {
        self.unary(EOp::MulScalar(k), x, |v| v * k)
    }

    pub fn add_scalar(&mut self, x: Var, k: f32) -> Var {
        self.unary(EOp::AddScalar(k), x, |v| v + k)
    }

    pub fn neg(&mut self, x: Var) -> Var {
        self.mul_scalar(x, -1.0)
    }

    pub fn pow(&mut self, x: Var, p: f32) -> Var {
        self.unary(EOp::Pow(p), x, |v| v.powf(p))
    }

    pub fn square(&mut self, x: Var) -> Var {
        self.pow(x, 2.0)
    }

    pub fn exp(&mut self, x: Var) -> Var {
        self.unary(EOp::Exp, x, f32::exp)
    }

    pub fn log(&mut self, x: Var) -> Var {
        self.unary(EOp::Log, x, f32::ln)
    }

    pub fn tanh(&mut self, x: Var) -> Var {
        self.unary(EOp::Tanh, x, f32::tanh)
    }

    pub fn relu(&mut self, x: Var) -> Var {
        self.unary(EOp::Relu, x, |v| v.max(0.0))
    }

    pub fn leaky_relu(&mut self, x: Var, slope: f32) -> Var {
        self.unary(EOp::LeakyRelu(slope), x, |v| if v > 0.0 { v } else { slope * v })
    }

    /// Leaky ReLU whose negative slope is the single learnable value `alpha`.
    pub fn prelu(&mut self, x: Var, alpha: Var) -> Var {
        assert_eq!(self.values[alpha.0].len(), 1, "prelu slope must hold one value");
        let slope = self.values[alpha.0].data[0];
        let x_val = &self.values[x.0];
        let data = x_val.data.iter().map(|&v| if v > 0.0 { v } else { slope * v }).collect();
        let out = Tensor { data, shape: x_val.shape.clone() };
        self.push(EOp::PRelu, x, alpha, out)
    }

    pub fn clamp(&mut self, x: Var, min: f32, max: f32) -> Var {
        self.unary(EOp::Clamp { min, max }, x, |v| v.clamp(min, max))
    }

    /// Sums every row of `[n, c]` into a `[n, 1]` column.
    pub fn row_sum(&mut self, x: Var) -> Var {
        let (n, c) = self.values[x.0].dims();
        let data = self.values[x.0].data.chunks(c.max(1)).map(|r| r.iter().sum()).collect();
        self.push(EOp::RowSum, x, x, Tensor::from_vec(vec![n, 1], data))
    }

    pub fn reduce_sum(&mut self, x: Var) -> Var {
        let sum = self.values[x.0].data.iter().sum();
        self.push(EOp::ReduceSum, x, x, Tensor::scalar(sum))
    }

    pub fn reduce_mean(&mut self, x: Var) -> Var {
        let v = &self.values[x.0];
        let mean = v.data.iter().sum::<f32>() / v.len() as f32;
        self.push(EOp::ReduceMean, x, x, Tensor::scalar(mean))
    }

    /// Mean squared error between two equally shaped values.
    pub fn mse(&mut self, pred: Var, target: Var) -> Var {
        let diff = self.sub(pred, target);
        let sq = self.square(diff);
        self.reduce_mean(sq)
    }

    /// Joins `[n, p]` and `[n, q]` column-wise.
    pub fn concat(&mut self, a: Var, b: Var) -> Var {
        let (n, p) = self.values[a.0].dims();
        let (m, q) = self.values[b.0].dims();
        assert_eq!(n, m, "concat: row counts differ");
        let mut data = Vec::with_capacity(n * (p + q));
        for k in 0..n {
            data.extend_from_slice(self.values[a.0].row_slice(k));
            data.extend_from_slice(self.values[b.0].row_slice(k));
        }
        self.push(EOp::Concat, a, b, Tensor::from_vec(vec![n, p + q], data))
    }

    /// Columns `start..start + len` of `[n, c]`.
    pub fn slice(&mut self, x: Var, start: usize, len: usize) -> Var {
        let (n, c) = self.values[x.0].dims();
        assert!(start + len <= c, "slice {start}+{len} out of {c} columns");
        let data = (0..n)
            .flat_map(|k| self.values[x.0].row_slice(k)[start..start + len].to_vec())
            .collect();
        self.push(EOp::Slice { start, len }, x, x, Tensor::from_vec(vec![n, len], data))
    }

    /// Picks column `indices[k]` from row `k`, giving `[n, 1]`.
    pub fn gather(&mut self, x: Var, indices: &[usize]) -> Var {
        let (n, c) = self.values[x.0].dims();
        assert_eq!(indices.len(), n, "gather: one index per row");
        let data = indices
            .iter()
            .enumerate()
            .map(|(k, &j)| {
                assert!(j < c, "gather index {j} out of {c} columns");
                self.values[x.0].data[k * c + j]
            })
            .collect();
        self.push(EOp::Gather(indices.to_vec()), x, x, Tensor::from_vec(vec![n, 1], data))
    }

    /// Computes the gradients of every leaf that requires them with respect
    /// to the single-element `loss`.
    ///
    /// The gradients are computed by traversing the recorded operations in
    /// reverse order. Results from an earlier call are discarded.
    ///
    /// # Errors
    ///
    /// Fails if `loss` holds more than one element.
    pub fn backward(&mut self, loss: Var) -> Result<()> {
        ensure!(
            self.values[loss.0].len() == 1,
            "loss must hold a single element, got shape {:?}",
            self.values[loss.0].shape
        );
        let mut grads: Vec<Option<Vec<f32>>> = vec![None; self.nodes.len()];
        grads[loss.0] = Some(vec![1.0]);

        for i in (0..=loss.0).rev() {
            let node = &self.nodes[i];
            if !node.requires_grad || node.op == EOp::Leaf {
                continue;
            }
            let Some(out_grad) = grads[i].take() else { continue };
            self.propagate(node, i, &out_grad, &mut grads);
        }

        self.grads = grads;
        Ok(())
    }

    /// Accumulator for operand `idx`, or `None` if it takes no gradient.
    fn slot<'g>(&self, grads: &'g mut [Option<Vec<f32>>], idx: usize) -> Option<&'g mut Vec<f32>> {
        if !self.nodes[idx].requires_grad {
            return None;
        }
        let len = self.values[idx].len();
        Some(grads[idx].get_or_insert_with(|| vec![0.0; len]))
    }

    #[allow(clippy::too_many_lines)]
    fn propagate(&self, node: &Node, out: usize, g: &[f32], grads: &mut [Option<Vec<f32>>]) {
        let (a, b) = (node.a, node.b);
        let xa = &self.values[a].data;
        let xb = &self.values[b].data;
        let y = &self.values[out].data;

        match &node.op {
            EOp::Leaf => {}
            EOp::Add | EOp::Sub => {
                let sign = if node.op == EOp::Sub { -1.0 } else { 1.0 };
                if let Some(ga) = self.slot(grads, a) {
                    ga.iter_mut().zip(g).for_each(|(d, og)| *d += og);
                }
                if let Some(gb) = self.slot(grads, b) {
                    gb.iter_mut().zip(g).for_each(|(d, og)| *d += sign * og);
                }
            }
            EOp::Mul => {
                if let Some(ga) = self.slot(grads, a) {
                    for (d, (v, og)) in ga.iter_mut().zip(xb.iter().zip(g)) {
                        *d += v * og;
                    }
                }
                if let Some(gb) = self.slot(grads, b) {
                    for (d, (v, og)) in gb.iter_mut().zip(xa.iter().zip(g)) {
                        *d += v * og;
                    }
                }
            }
            EOp::Min => {
                if let Some(ga) = self.slot(grads, a) {
                    for i in 0..g.len() {
                        if xa[i] < xb[i] {
                            ga[i] += g[i];
                        }
                    }
                }
                if let Some(gb) = self.slot(grads, b) {
                    for i in 0..g.len() {
                        if xb[i] <= xa[i] {
                            gb[i] += g[i];
                        }
                    }
                }
            }
            EOp::MatMul => {
                let (n, in_dim) = self.values[a].dims();
                let (out_dim, _) = self.values[b].dims();
                if let Some(gx) = self.slot(grads, a) {
                    for k in 0..n {
                        for o in 0..out_dim {
                            let go = g[k * out_dim + o];
                            for j in 0..in_dim {
                                gx[k * in_dim + j] += go * xb[o * in_dim + j];
                            }
                        }
                    }
                }
                if let Some(gw) = self.slot(grads, b) {
                    for k in 0..n {
                        for o in 0..out_dim {
                            let go = g[k * out_dim + o];
                            for j in 0..in_dim {
                                gw[o * in_dim + j] += go * xa[k * in_dim + j];
                            }
                        }
                    }
                }
            }
            EOp::AddBroadcast => {
                let c = xb.len();
                if let Some(ga) = self.slot(grads, a) {
                    ga.iter_mut().zip(g).for_each(|(d, og)| *d += og);
                }
                if let Some(gb) = self.slot(grads, b) {
                    for (i, og) in g.iter().enumerate() {
                        gb[i % c] += og;
                    }
                }
            }
            EOp::Scale => {
                let k = xb[0];
                if let Some(ga) = self.slot(grads, a) {
                    ga.iter_mut().zip(g).for_each(|(d, og)| *d += k * og);
                }
                if let Some(gb) = self.slot(grads, b) {
                    gb[0] += xa.iter().zip(g).map(|(v, og)| v * og).sum::<f32>();
                }
            }
            EOp::PRelu => {
                let slope = xb[0];
                if let Some(ga) = self.slot(grads, a) {
                    for (d, (v, og)) in ga.iter_mut().zip(xa.iter().zip(g)) {
                        *d += if *v > 0.0 { *og } else { slope * og };
                    }
                }
                if let Some(gb) = self.slot(grads, b) {
                    gb[0] += xa
                        .iter()
                        .zip(g)
                        .filter(|(v, _)| **v <= 0.0)
                        .map(|(v, og)| v * og)
                        .sum::<f32>();
                }
            }
            EOp::Concat => {
                let (n, p) = self.values[a].dims();
                let (_, q) = self.values[b].dims();
                if let Some(ga) = self.slot(grads, a) {
                    for k in 0..n {
                        for j in 0..p {
                            ga[k * p + j] += g[k * (p + q) + j];
                        }
                    }
                }
                if let Some(gb) = self.slot(grads, b) {
                    for k in 0..n {
                        for j in 0..q {
                            gb[k * q + j] += g[k * (p + q) + p + j];
                        }
                    }
                }
            }
            op => {
                let (n, c) = self.values[a].dims();
                let Some(ga) = self.slot(grads, a) else { return };
                match op {
                    EOp::MulScalar(k) => ga.iter_mut().zip(g).for_each(|(d, og)| *d += k * og),
                    EOp::AddScalar(_) => ga.iter_mut().zip(g).for_each(|(d, og)| *d += og),
                    EOp::Pow(p) => {
                        for (d, (v, og)) in ga.iter_mut().zip(xa.iter().zip(g)) {
                            *d += p * v.powf(p - 1.0) * og;
                        }
                    }
                    EOp::Exp => {
                        for (d, (v, og)) in ga.iter_mut().zip(y.iter().zip(g)) {
                            *d += v * og;
                        }
                    }
                    EOp::Log => {
                        for (d, (v, og)) in ga.iter_mut().zip(xa.iter().zip(g)) {
                            *d += og / v;
                        }
                    }
                    EOp::Tanh => {
                        for (d, (t, og)) in ga.iter_mut().zip(y.iter().zip(g)) {
                            *d += (1.0 - t * t) * og;
                        }
                    }
                    EOp::Relu => {
                        for (d, (v, og)) in ga.iter_mut().zip(xa.iter().zip(g)) {
                            if *v > 0.0 {
                                *d += og;
                            }
                        }
                    }
                    EOp::LeakyRelu(slope) => {
                        for (d, (v, og)) in ga.iter_mut().zip(xa.iter().zip(g)) {
                            *d += if *v > 0.0 { *og } else { slope * og };
                        }
                    }
                    EOp::Clamp { min, max } => {
                        for (d, (v, og)) in ga.iter_mut().zip(xa.iter().zip(g)) {
                            if v > min && v < max {
                                *d += og;
                            }
                        }
                    }
                    EOp::RowSum => {
                        for (i, d) in ga.iter_mut().enumerate() {
                            *d += g[i / c.max(1)];
                        }
                    }
                    EOp::ReduceSum => ga.iter_mut().for_each(|d| *d += g[0]),
                    EOp::ReduceMean => {
                        let len = ga.len() as f32;
                        ga.iter_mut().for_each(|d| *d += g[0] / len);
                    }
                    EOp::Slice { start, len } => {
                        for k in 0..n {
                            for j in 0..*len {
                                ga[k * c + start + j] += g[k * len + j];
                            }
                        }
                    }
                    EOp::Gather(indices) => {
                        for (k, &j) in indices.iter().enumerate() {
                            ga[k * c + j] += g[k];
                        }
                    }
                    _ => unreachable!("binary op {op:?} handled above"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn constants_receive_no_gradient() {
        let mut tape = Tape::new();
        let w = tape.param(&Tensor::from_vec(vec![1, 2], vec![2.0, -1.0]));
        let c = tape.constant(Tensor::from_vec(vec![1, 2], vec![3.0, 4.0]));
        let y = tape.mul(w, c);
        let loss = tape.reduce_sum(y);
        tape.backward(loss).unwrap();
        assert_eq!(tape.grad(w), Some(&[3.0, 4.0][..]));
        assert!(tape.grad(c).is_none());
    }

    #[test]
    fn shared_operand_accumulates() {
        let mut tape = Tape::new();
        let x = tape.param(&Tensor::scalar(3.0));
        let y = tape.mul(x, x);
        tape.backward(y).unwrap();
        assert_relative_eq!(tape.grad(x).unwrap()[0], 6.0);
    }

    #[test]
    fn detach_blocks_gradient() {
        let mut tape = Tape::new();
        let x = tape.param(&Tensor::scalar(2.0));
        let sq = tape.square(x);
        let frozen = tape.detach(sq);
        let y = tape.mul(frozen, x);
        tape.backward(y).unwrap();
        // d/dx (c · x) with c = 4 held fixed
        assert_relative_eq!(tape.grad(x).unwrap()[0], 4.0);
    }

    #[test]
    fn backward_rejects_non_scalar_loss() {
        let mut tape = Tape::new();
        let x = tape.param(&Tensor::from_vec(vec![2, 1], vec![1.0, 2.0]));
        assert!(tape.backward(x).is_err());
    }
}
