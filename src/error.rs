//! Error kinds
//!
//! Only [`RegistrationError`] and [`ResourceError`] at startup are fatal.
//! Everything else is absorbed by the relay loop and retried on the next tick.
//!
//! A variant either prints its cause or exposes it as `source()`, never both,
//! so `{:#}` chains read each cause once.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The Bluetooth stack refused (or could not be asked) to register the profile.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Could not open a session with the Bluetooth daemon")]
    Session(#[source] bluer::Error),

    #[error("Profile registration rejected")]
    Rejected(#[source] bluer::Error),

    #[error("Could not read SDP record from {path}")]
    ServiceRecord {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A write to the active HID channel failed.
#[derive(Debug, Error)]
#[error("HID channel write failed: {0}")]
pub struct TransportError(pub io::Error);

/// A line from the sample channel could not be turned into a sample.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedSampleError {
    #[error("Expected at least {expected} fields, got {actual}")]
    TooFewFields { expected: usize, actual: usize },

    #[error("Field {index} is not a number: {token:?}")]
    NotANumber { index: usize, token: String },

    #[error("Field {index} is out of byte range: {value}")]
    OutOfRange { index: usize, value: i64 },
}

/// The named sample channel could not be created, opened or read.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Could not create sample channel at {path}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} exists and is not a named pipe")]
    NotAFifo { path: PathBuf },

    #[error("Could not open sample channel at {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not read sample channel: {0}")]
    Read(io::Error),
}
