pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, SupportFlow};
pub use states::{
    FlowAction, FlowContext, RouteEvent, RouteState, TransitionOutcome, DEFAULT_ROUND_LIMIT,
};
