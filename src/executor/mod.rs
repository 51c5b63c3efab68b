pub mod dispatcher;
pub mod resolve;
pub mod safety;
pub mod strategy;

pub use dispatcher::ActionExecutor;
