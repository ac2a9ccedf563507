//! Small CPU tensor library with reverse-mode autodiff.
//!
//! Values are recorded eagerly on a [`Tape`]; [`Tape::backward`] walks it in
//! reverse. Networks ([`Mlp`]) bind their parameters to a tape as leaves,
//! either trainable or constant, which decides where gradients can flow.

pub mod checkpoint;
pub mod distributions;
pub mod graph;
pub mod nn;
pub mod optim;
pub mod tape;
pub mod tensor;

pub use checkpoint::NetworkSnapshot;
pub use nn::{Activation, Bound, Dense, Mlp};
pub use optim::Adam;
pub use tape::{Tape, Var};
pub use tensor::Tensor;
