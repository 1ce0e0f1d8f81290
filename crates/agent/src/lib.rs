//! The toolrelay agent: a streamed tool-calling loop.
//!
//! 1. **Init**: start every tool provider and flatten their catalogs
//! 2. **Ask**: stream a model turn, reassembling text and tool-call fragments
//! 3. **Act**: run the requested tools in order, append their results
//! 4. **Repeat** until the model answers without tool calls, or the
//!    iteration limit is hit

pub mod assembler;
pub mod loop_runner;
pub mod session;
pub mod stream_event;

pub use assembler::{AssembledTurn, StreamAssembler, ToolCallAccumulator, assemble};
pub use loop_runner::{Agent, MAX_ITERATIONS_NOTICE};
pub use session::ChatSession;
pub use stream_event::AgentStreamEvent;
