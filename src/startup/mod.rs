pub mod protocol;
pub mod startup;

pub use startup::Application;
