//! HID Report Format
//!
//! Input samples arrive as text lines from the producer and leave as fixed
//! 8-byte HID input reports.
//!
//! # Sample line
//!
//! ```text
//! x,y,z,rz,hat,btn_lo,btn_hi[,ignored...]
//! ```
//!
//! # Report layout (8 bytes)
//!
//! ```text
//! [0]   : 0xA1 (DATA | Input, HIDP transaction header)
//! [1-4] : X, Y, Z, Rz axes
//! [5]   : Hat switch (low nibble)
//! [6-7] : Buttons 1-16
//! ```
//!
//! The payload is copied verbatim; the layout has to agree with the report
//! descriptor in the advertised SDP record, not with anything in this module.

use crate::error::MalformedSampleError;
use std::str::FromStr;

/// Number of payload bytes in one sample
pub const SAMPLE_LEN: usize = 7;

/// HIDP header byte for an input report on the interrupt channel
pub const INPUT_REPORT_HEADER: u8 = 0xA1;

/// Total size of an encoded report
pub const REPORT_LEN: usize = SAMPLE_LEN + 1;

/// One raw input sample from the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawInputSample(pub [u8; SAMPLE_LEN]);

impl RawInputSample {
    pub fn as_bytes(&self) -> &[u8; SAMPLE_LEN] {
        &self.0
    }
}

impl FromStr for RawInputSample {
    type Err = MalformedSampleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() < SAMPLE_LEN {
            return Err(MalformedSampleError::TooFewFields {
                expected: SAMPLE_LEN,
                actual: fields.len(),
            });
        }

        let mut bytes = [0u8; SAMPLE_LEN];
        for (index, token) in fields.iter().take(SAMPLE_LEN).enumerate() {
            let token = token.trim();
            let value: i64 = token.parse().map_err(|_| MalformedSampleError::NotANumber {
                index,
                token: token.to_string(),
            })?;
            bytes[index] = u8::try_from(value)
                .map_err(|_| MalformedSampleError::OutOfRange { index, value })?;
        }

        Ok(Self(bytes))
    }
}

/// An encoded HID input report, ready for the interrupt channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidReport([u8; REPORT_LEN]);

impl HidReport {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encode a sample into an input report: the header byte followed by the
/// sample bytes in their original order.
pub fn encode(sample: &RawInputSample) -> HidReport {
    let mut report = [0u8; REPORT_LEN];
    report[0] = INPUT_REPORT_HEADER;
    report[1..].copy_from_slice(sample.as_bytes());
    HidReport(report)
}
