// Rule system
// Builtin vulnerability rule table consumed by the pattern scanner.

mod builtin;
mod model;

pub use builtin::builtin_rules;
pub use model::{BugRule, Severity};
