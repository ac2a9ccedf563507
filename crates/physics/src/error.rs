use thiserror::Error;

/// Errors raised by the cart-pole environment.
///
/// Out-of-range actions are a contract violation on the caller's side; the
/// environment never clamps them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvError {
    #[error("action {action} outside declared bound [-{bound}, {bound}]")]
    InvalidAction { action: f32, bound: f32 },
    #[error("discrete action {index} out of range for {n} actions")]
    InvalidDiscreteAction { index: usize, n: usize },
    #[error("action kind does not match the action space: expected {expected}")]
    ActionKindMismatch { expected: &'static str },
}
