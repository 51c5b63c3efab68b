pub mod chrome;
pub mod driver;
pub mod frames;
pub mod lane;

pub use driver::BrowserDriver;
