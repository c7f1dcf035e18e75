/// A state that advances by consuming one input at a time.
///
/// Implementors are expected to be cheap, `Copy`-like values; the previous
/// state is consumed and the next one returned.
pub trait FiniteStateMachine {
    type Input;
    type Context;

    #[must_use]
    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self;

    /// Whether no further input can change this state.
    fn is_terminal(&self) -> bool;
}
