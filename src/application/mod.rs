pub mod harness;
pub mod report;
pub mod runtime;
pub mod strategies;
pub mod validation;
