pub mod attempt_flow;

pub use attempt_flow::AttemptFlow;
