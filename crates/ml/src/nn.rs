use crate::tape::{Tape, Var};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// A fully connected neural network layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Dense {
    /// The weight matrix for the layer, `[out_dim, in_dim]`.
    pub w: Tensor,
    /// The bias vector for the layer.
    pub b: Tensor,
    /// The number of input dimensions.
    pub in_dim: usize,
    /// The number of output dimensions.
    pub out_dim: usize,
}

impl Dense {
    /// Creates a new `Dense` layer with the given weights and biases.
    ///
    /// # Panics
    ///
    /// Panics if the buffers do not match the requested dimensions.
    #[must_use]
    pub fn new(weights: Vec<f32>, bias: Vec<f32>, in_d: usize, out_d: usize) -> Self {
        assert_eq!(weights.len(), in_d * out_d);
        assert_eq!(bias.len(), out_d);
        Self {
            w: Tensor::from_vec(vec![out_d, in_d], weights),
            b: Tensor::from_vec(vec![out_d], bias),
            in_dim: in_d,
            out_dim: out_d,
        }
    }

    /// Glorot-uniform weights and zero bias.
    pub fn random(in_d: usize, out_d: usize, rng: &mut fastrand::Rng) -> Self {
        // Glorot initialization
        let limit = (6.0 / (in_d + out_d) as f32).sqrt();
        let weights = (0..in_d * out_d).map(|_| rng.f32() * 2.0 * limit - limit).collect();
        Self::new(weights, vec![0.0; out_d], in_d, out_d)
    }

    /// Weights and bias both drawn from `U[-limit, limit]`.
    pub fn uniform(in_d: usize, out_d: usize, limit: f32, rng: &mut fastrand::Rng) -> Self {
        let mut draw = |n: usize| -> Vec<f32> {
            (0..n).map(|_| rng.f32() * 2.0 * limit - limit).collect()
        };
        let weights = draw(in_d * out_d);
        let bias = draw(out_d);
        Self::new(weights, bias, in_d, out_d)
    }

    /// Performs the forward pass through the layer.
    pub fn forward(&self, tape: &mut Tape, w: Var, b: Var, x: Var) -> Var {
        let wx = tape.matmul(x, w);
        tape.add_broadcast(wx, b)
    }
}

/// Nonlinearity applied after every hidden layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Relu,
    LeakyRelu(f32),
    /// Leaky ReLU with one learnable slope per hidden layer
    PRelu,
    Tanh,
}

/// Initial negative slope of a [`Activation::PRelu`] layer.
pub const PRELU_INIT: f32 = 0.25;

/// Leaf variables of an [`Mlp`] bound to one tape.
///
/// Ordered like [`Mlp::params`].
#[derive(Clone, Debug)]
pub struct Bound {
    vars: Vec<Var>,
}

impl Bound {
    #[must_use]
    pub fn vars(&self) -> &[Var] {
        &self.vars
    }
}

/// A feed-forward stack of dense layers.
///
/// Hidden layers apply the configured [`Activation`]; the last layer is
/// linear, so bounded heads add their own squashing.
#[derive(Clone, Debug, PartialEq)]
pub struct Mlp {
    pub layers: Vec<Dense>,
    pub activation: Activation,
    /// PReLU slopes, one `[1]` tensor per hidden layer
    pub slopes: Vec<Tensor>,
}

impl Mlp {
    /// Builds a network with layer widths `sizes`, e.g. `[4, 64, 64, 1]`.
    ///
    /// # Panics
    ///
    /// Panics if fewer than two sizes are given.
    pub fn new(sizes: &[usize], activation: Activation, rng: &mut fastrand::Rng) -> Self {
        assert!(sizes.len() >= 2, "an MLP needs an input and an output width");
        let layers: Vec<Dense> =
            sizes.windows(2).map(|w| Dense::random(w[0], w[1], rng)).collect();
        let slopes = match activation {
            Activation::PRelu => {
                vec![Tensor::from_vec(vec![1], vec![PRELU_INIT]); layers.len() - 1]
            }
            _ => Vec::new(),
        };
        Self { layers, activation, slopes }
    }

    /// Re-draws the output layer from `U[-limit, limit]` so initial outputs
    /// sit close to zero.
    #[must_use]
    pub fn with_output_init(mut self, limit: f32, rng: &mut fastrand::Rng) -> Self {
        if let Some(last) = self.layers.last_mut() {
            *last = Dense::uniform(last.in_dim, last.out_dim, limit, rng);
        }
        self
    }

    pub fn in_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.in_dim)
    }

    pub fn out_dim(&self) -> usize {
        self.layers.last().map_or(0, |l| l.out_dim)
    }

    /// Parameters in traversal order: `w, b` per layer, then PReLU slopes.
    pub fn params(&self) -> Vec<&Tensor> {
        let mut out: Vec<&Tensor> = self.layers.iter().flat_map(|l| [&l.w, &l.b]).collect();
        out.extend(self.slopes.iter());
        out
    }

    pub fn params_mut(&mut self) -> Vec<&mut Tensor> {
        let mut out: Vec<&mut Tensor> =
            self.layers.iter_mut().flat_map(|l| [&mut l.w, &mut l.b]).collect();
        out.extend(self.slopes.iter_mut());
        out
    }

    /// Records every parameter on `tape`, as gradient-carrying leaves when
    /// `trainable`, otherwise as constants.
    pub fn bind(&self, tape: &mut Tape, trainable: bool) -> Bound {
        let vars = self.params().into_iter().map(|p| tape.leaf(p.clone(), trainable)).collect();
        Bound { vars }
    }

    pub fn forward(&self, tape: &mut Tape, bound: &Bound, x: Var) -> Var {
        let n_layers = self.layers.len();
        let mut h = x;
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(tape, bound.vars[2 * i], bound.vars[2 * i + 1], h);
            if i + 1 < n_layers {
                h = match self.activation {
                    Activation::Relu => tape.relu(h),
                    Activation::LeakyRelu(slope) => tape.leaky_relu(h, slope),
                    Activation::PRelu => tape.prelu(h, bound.vars[2 * n_layers + i]),
                    Activation::Tanh => tape.tanh(h),
                };
            }
        }
        h
    }

    /// Runs the network on `x` without recording gradients.
    pub fn predict(&self, x: &Tensor) -> Tensor {
        let mut tape = Tape::new();
        let bound = self.bind(&mut tape, false);
        let input = tape.constant(x.clone());
        let out = self.forward(&mut tape, &bound, input);
        tape.value(out).clone()
    }

    /// Gradients for every parameter after `tape.backward`; parameters that
    /// received none get zeros.
    pub fn gradients(&self, tape: &Tape, bound: &Bound) -> Vec<Vec<f32>> {
        self.params()
            .iter()
            .zip(&bound.vars)
            .map(|(p, &v)| tape.grad(v).map_or_else(|| vec![0.0; p.len()], <[f32]>::to_vec))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_init_keeps_outputs_small() {
        let mut rng = fastrand::Rng::with_seed(3);
        let net = Mlp::new(&[4, 32, 32, 1], Activation::Relu, &mut rng)
            .with_output_init(3e-3, &mut rng);
        let out = net.predict(&Tensor::row(&[0.1, -0.2, 0.3, 0.0]));
        assert!(out.data[0].abs() < 0.05, "{:?}", out.data);
    }

    #[test]
    fn prelu_adds_one_slope_per_hidden_layer() {
        let mut rng = fastrand::Rng::with_seed(0);
        let net = Mlp::new(&[3, 8, 8, 2], Activation::PRelu, &mut rng);
        assert_eq!(net.params().len(), 3 * 2 + 2);
        assert_eq!(net.predict(&Tensor::row(&[1.0, 2.0, 3.0])).shape, vec![1, 2]);
    }
}
