pub mod bluetooth;
pub mod logging;
pub mod sample_source;
