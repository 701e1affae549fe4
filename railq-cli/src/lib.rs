pub mod app;
pub mod args;

pub use app::App;
pub use args::{CliArgs, Command};
