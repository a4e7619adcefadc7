pub use dummy::DummyAgent;
pub use ewma::BasicEwmaAgent;

mod dummy;
mod ewma;

use crate::types::{Agent, BuildError};

/// Registry keys of the available strategies.
pub const STRATEGY_NAMES: &[&str] = &["dummy", "basic-ewma"];

/// Constructs the agent registered under `name`, routing the free-form
/// `key=value` options into its typed configuration. Unknown or uncoercible
/// options are ignored.
pub fn build_agent(name: &str, options: &[String]) -> Result<Box<dyn Agent>, BuildError> {
    match name.to_lowercase().as_str() {
        "dummy" => Ok(Box::new(DummyAgent)),
        "basic-ewma" => Ok(Box::new(BasicEwmaAgent::from_options(options))),
        _ => Err(BuildError::StrategyNotFound(name.to_string())),
    }
}
