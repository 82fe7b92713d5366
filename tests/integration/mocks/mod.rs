#![allow(dead_code)]

pub mod sinks;

pub use sinks::{FlakySink, MockSink};
