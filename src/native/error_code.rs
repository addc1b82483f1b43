//! Native status codes and their translation.
//!
//! Every native call site routes its status through [`ErrorTranslator::classify`];
//! that is the only place deciding whether a status means "absent" or "failure".

use std::fmt;

/// Status reported by a credential API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `ERROR_SUCCESS`
    Success,
    /// `ERROR_NOT_FOUND`
    NotFound,
    /// `ERROR_INVALID_PARAMETER`
    InvalidArgument,
    /// `ERROR_INVALID_FLAGS`
    InvalidFlags,
    /// `ERROR_NO_SUCH_LOGON_SESSION`
    NoSuchLogonSession,
    /// Anything else.
    Other(u32),
}

impl ErrorCode {
    pub const SUCCESS: u32 = 0;
    pub const NOT_FOUND: u32 = 0x0000_0490;
    pub const INVALID_ARGUMENT: u32 = 87;
    pub const INVALID_FLAGS: u32 = 0x0000_03EC;
    pub const NO_SUCH_LOGON_SESSION: u32 = 0x0000_0520;

    /// Returns the raw numeric code.
    pub fn code(self) -> u32 {
        match self {
            Self::Success => Self::SUCCESS,
            Self::NotFound => Self::NOT_FOUND,
            Self::InvalidArgument => Self::INVALID_ARGUMENT,
            Self::InvalidFlags => Self::INVALID_FLAGS,
            Self::NoSuchLogonSession => Self::NO_SUCH_LOGON_SESSION,
            Self::Other(code) => code,
        }
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        match code {
            Self::SUCCESS => Self::Success,
            Self::NOT_FOUND => Self::NotFound,
            Self::INVALID_ARGUMENT => Self::InvalidArgument,
            Self::INVALID_FLAGS => Self::InvalidFlags,
            Self::NO_SUCH_LOGON_SESSION => Self::NoSuchLogonSession,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.code())
    }
}

/// Three-way bucket every native status is sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The call succeeded.
    Success,
    /// The target does not exist; callers see "absent", never an error.
    Ignorable,
    /// Anything else; surfaced as a native failure.
    Fatal,
}

/// Maps status codes to messages and classifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorTranslator;

impl ErrorTranslator {
    /// Creates a translator.
    pub fn new() -> Self {
        Self
    }

    /// Returns the canonical message for `code`.
    ///
    /// Codes outside the known table produce `unknown error <code>` and are
    /// logged, since they mean the table is incomplete.
    pub fn message_for(&self, code: ErrorCode) -> String {
        match code {
            ErrorCode::Success => "The operation completed successfully.".to_string(),
            ErrorCode::NotFound => format!("Element not found. {:x}", ErrorCode::NOT_FOUND),
            ErrorCode::NoSuchLogonSession => format!(
                "A specified logon session does not exist. It might already have been terminated. {:x}",
                ErrorCode::NO_SUCH_LOGON_SESSION
            ),
            ErrorCode::InvalidFlags => format!("Invalid flags {:x}", ErrorCode::INVALID_FLAGS),
            ErrorCode::InvalidArgument => {
                format!("Invalid argument {:x}", ErrorCode::INVALID_ARGUMENT)
            }
            ErrorCode::Other(raw) => {
                tracing::error!(code = raw, "unrecognized native error {:#x}", raw);
                format!("unknown error {}", raw)
            }
        }
    }

    /// Sorts `code` into success, ignorable (not found) or fatal.
    pub fn classify(&self, code: ErrorCode) -> Classification {
        match code {
            ErrorCode::Success => Classification::Success,
            ErrorCode::NotFound => Classification::Ignorable,
            _ => Classification::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_round_trip_through_u32() {
        for code in [0, 0x490, 87, 0x3EC, 0x520] {
            assert_eq!(ErrorCode::from(code).code(), code);
            assert!(!matches!(ErrorCode::from(code), ErrorCode::Other(_)));
        }
        assert_eq!(ErrorCode::from(5), ErrorCode::Other(5));
    }

    #[test]
    fn test_classify() {
        let translator = ErrorTranslator::new();
        assert_eq!(translator.classify(ErrorCode::Success), Classification::Success);
        assert_eq!(translator.classify(ErrorCode::NotFound), Classification::Ignorable);
        assert_eq!(translator.classify(ErrorCode::InvalidFlags), Classification::Fatal);
        assert_eq!(translator.classify(ErrorCode::InvalidArgument), Classification::Fatal);
        assert_eq!(
            translator.classify(ErrorCode::NoSuchLogonSession),
            Classification::Fatal
        );
        assert_eq!(translator.classify(ErrorCode::Other(5)), Classification::Fatal);
    }

    #[test]
    fn test_messages() {
        let translator = ErrorTranslator::new();
        assert_eq!(translator.message_for(ErrorCode::NotFound), "Element not found. 490");
        assert_eq!(translator.message_for(ErrorCode::InvalidFlags), "Invalid flags 3ec");
        assert_eq!(translator.message_for(ErrorCode::InvalidArgument), "Invalid argument 57");
        assert!(translator
            .message_for(ErrorCode::NoSuchLogonSession)
            .starts_with("A specified logon session does not exist"));
        assert_eq!(translator.message_for(ErrorCode::Other(1234)), "unknown error 1234");
    }

    #[test]
    fn test_display_is_hex() {
        assert_eq!(ErrorCode::NotFound.to_string(), "0x490");
    }
}
