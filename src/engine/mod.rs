mod runner;
mod worker;

pub use runner::Runner;
