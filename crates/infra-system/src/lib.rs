// Semantica Infrastructure - System Adapters
// Implements: IsolationContext, IsolationContextFactory

pub mod subprocess_context;

pub use subprocess_context::{encode_outcome, SubprocessContext, SubprocessContextFactory};
