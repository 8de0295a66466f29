pub mod intent;
pub mod numbers;
pub mod targets;

pub use intent::{classify, interpret, ChatCommand, EditIntent, EditRequest, ListStyle};
pub use numbers::{NumericTarget, TargetUnit};
