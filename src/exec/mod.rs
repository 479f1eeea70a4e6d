#[cfg(test)]
mod fake;
mod runner;

#[cfg(test)]
pub use fake::FakeRunner;
pub use runner::{CommandRunner, CommandSpec, ProcessRunner, RunOutput};
