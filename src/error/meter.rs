// Meter error types and constants

use crate::error::ErrorCode;
use std::fmt;

/// Meter error code constants
///
/// Error code range: 2001-2002
pub struct MeterErrorCodes {}

impl MeterErrorCodes {
    /// Time signature is not one of the supported meters
    pub const UNKNOWN_SIGNATURE: i32 = 2001;

    /// Note value name not recognized
    pub const UNKNOWN_NOTE_VALUE: i32 = 2002;
}

/// Errors raised when parsing or building a meter setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeterError {
    UnknownSignature { input: String },
    UnknownNoteValue { input: String },
}

impl ErrorCode for MeterError {
    fn code(&self) -> i32 {
        match self {
            MeterError::UnknownSignature { .. } => MeterErrorCodes::UNKNOWN_SIGNATURE,
            MeterError::UnknownNoteValue { .. } => MeterErrorCodes::UNKNOWN_NOTE_VALUE,
        }
    }

    fn message(&self) -> String {
        match self {
            MeterError::UnknownSignature { input } => format!(
                "Unsupported time signature '{}' (expected one of 2/4, 3/4, 4/4, 5/4, 6/4, 7/4, 3/8, 6/8, 9/8, 12/8)",
                input
            ),
            MeterError::UnknownNoteValue { input } => format!(
                "Unknown note value '{}' (expected quarter, eighth, sixteenth or dotted-quarter)",
                input
            ),
        }
    }
}

impl fmt::Display for MeterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for MeterError {}
