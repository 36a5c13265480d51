//! Two-part status codes reported by a mechanism provider.
//!
//! A [`Status`] carries the GSS-API `(major, minor)` pair. The major code is
//! split into three fields:
//!
//! ```text
//!  31            24 23            16 15                             0
//! ┌────────────────┬────────────────┬────────────────────────────────┐
//! │ calling error  │ routine error  │ supplementary info             │
//! └────────────────┴────────────────┴────────────────────────────────┘
//! ```
//!
//! The minor code is mechanism specific. Raw codes never cross the public
//! error boundary: they are translated into the kinds in [`crate::error`] and
//! only reach users rendered through [`Status::render`] on the diagnostics
//! sink.

use std::fmt;

const CALLING_ERROR_OFFSET: u32 = 24;
const ROUTINE_ERROR_OFFSET: u32 = 16;
const CALLING_ERROR_MASK: u32 = 0xff;
const ROUTINE_ERROR_MASK: u32 = 0xff;
const SUPPLEMENTARY_MASK: u32 = 0xffff;

/// Routine errors defined by RFC 2744, section 3.9.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RoutineError {
    /// An unsupported mechanism was requested.
    BadMech = 1,
    /// An invalid name was supplied.
    BadName = 2,
    /// A supplied name was of an unsupported type.
    BadNameType = 3,
    /// Incorrect channel bindings were supplied.
    BadBindings = 4,
    /// An invalid status code was supplied.
    BadStatus = 5,
    /// A token had an invalid MIC.
    BadMic = 6,
    /// No credentials were supplied, or they were unavailable.
    NoCred = 7,
    /// No context has been established.
    NoContext = 8,
    /// A token was invalid.
    DefectiveToken = 9,
    /// A credential was invalid.
    DefectiveCredential = 10,
    /// The referenced credentials have expired.
    CredentialsExpired = 11,
    /// The context has expired.
    ContextExpired = 12,
    /// Miscellaneous failure; the minor code carries the detail.
    Failure = 13,
    /// The quality-of-protection requested could not be provided.
    BadQop = 14,
    /// The operation is forbidden by local security policy.
    Unauthorized = 15,
    /// The operation or option is unavailable.
    Unavailable = 16,
    /// The requested credential element already exists.
    DuplicateElement = 17,
    /// The provided name was not a mechanism name.
    NameNotMn = 18,
}

impl RoutineError {
    /// All routine errors, in code order.
    pub const ALL: [RoutineError; 18] = [
        Self::BadMech,
        Self::BadName,
        Self::BadNameType,
        Self::BadBindings,
        Self::BadStatus,
        Self::BadMic,
        Self::NoCred,
        Self::NoContext,
        Self::DefectiveToken,
        Self::DefectiveCredential,
        Self::CredentialsExpired,
        Self::ContextExpired,
        Self::Failure,
        Self::BadQop,
        Self::Unauthorized,
        Self::Unavailable,
        Self::DuplicateElement,
        Self::NameNotMn,
    ];

    /// Decode the routine-error field of a major status.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| *e as u32 == code)
    }

    /// The major status carrying only this routine error.
    pub const fn major(self) -> u32 {
        (self as u32) << ROUTINE_ERROR_OFFSET
    }

    /// Constant name as used by GSS-API implementations.
    pub fn name(self) -> &'static str {
        match self {
            Self::BadMech => "GSS_S_BAD_MECH",
            Self::BadName => "GSS_S_BAD_NAME",
            Self::BadNameType => "GSS_S_BAD_NAMETYPE",
            Self::BadBindings => "GSS_S_BAD_BINDINGS",
            Self::BadStatus => "GSS_S_BAD_STATUS",
            Self::BadMic => "GSS_S_BAD_MIC",
            Self::NoCred => "GSS_S_NO_CRED",
            Self::NoContext => "GSS_S_NO_CONTEXT",
            Self::DefectiveToken => "GSS_S_DEFECTIVE_TOKEN",
            Self::DefectiveCredential => "GSS_S_DEFECTIVE_CREDENTIAL",
            Self::CredentialsExpired => "GSS_S_CREDENTIALS_EXPIRED",
            Self::ContextExpired => "GSS_S_CONTEXT_EXPIRED",
            Self::Failure => "GSS_S_FAILURE",
            Self::BadQop => "GSS_S_BAD_QOP",
            Self::Unauthorized => "GSS_S_UNAUTHORIZED",
            Self::Unavailable => "GSS_S_UNAVAILABLE",
            Self::DuplicateElement => "GSS_S_DUPLICATE_ELEMENT",
            Self::NameNotMn => "GSS_S_NAME_NOT_MN",
        }
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::BadMech => "an unsupported mechanism was requested",
            Self::BadName => "an invalid name was supplied",
            Self::BadNameType => "a supplied name was of an unsupported type",
            Self::BadBindings => "incorrect channel bindings were supplied",
            Self::BadStatus => "an invalid status code was supplied",
            Self::BadMic => "a token had an invalid MIC",
            Self::NoCred => "no credentials were supplied, or the credentials were unavailable or inaccessible",
            Self::NoContext => "no context has been established",
            Self::DefectiveToken => "a token was invalid",
            Self::DefectiveCredential => "a credential was invalid",
            Self::CredentialsExpired => "the referenced credentials have expired",
            Self::ContextExpired => "the context has expired",
            Self::Failure => "unspecified GSS failure",
            Self::BadQop => "the quality-of-protection requested could not be provided",
            Self::Unauthorized => "the operation is forbidden by local security policy",
            Self::Unavailable => "the operation or option is unavailable",
            Self::DuplicateElement => "the requested credential element already exists",
            Self::NameNotMn => "the provided name was not a mechanism name",
        }
    }
}

/// Supplementary status bits (RFC 2744, section 3.9.1).
pub mod supplementary {
    /// The routine must be called again to complete its function.
    pub const CONTINUE_NEEDED: u32 = 1 << 0;
    /// The token was a duplicate of an earlier token.
    pub const DUPLICATE_TOKEN: u32 = 1 << 1;
    /// The token's validity period has expired.
    pub const OLD_TOKEN: u32 = 1 << 2;
    /// A later token has already been processed.
    pub const UNSEQ_TOKEN: u32 = 1 << 3;
    /// An expected per-message token was not received.
    pub const GAP_TOKEN: u32 = 1 << 4;

    pub(super) const NAMES: [(u32, &str); 5] = [
        (CONTINUE_NEEDED, "GSS_S_CONTINUE_NEEDED"),
        (DUPLICATE_TOKEN, "GSS_S_DUPLICATE_TOKEN"),
        (OLD_TOKEN, "GSS_S_OLD_TOKEN"),
        (UNSEQ_TOKEN, "GSS_S_UNSEQ_TOKEN"),
        (GAP_TOKEN, "GSS_S_GAP_TOKEN"),
    ];
}

/// A `(major, minor)` status pair from a mechanism provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Status {
    major: u32,
    minor: u32,
}

impl Status {
    /// Successful completion.
    pub const COMPLETE: Status = Status { major: 0, minor: 0 };

    /// Build a status from raw codes.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Build a status carrying a routine error.
    pub const fn routine(error: RoutineError, minor: u32) -> Self {
        Self::new(error.major(), minor)
    }

    /// Build a status carrying only supplementary bits.
    pub const fn supplementary(bits: u32, minor: u32) -> Self {
        Self::new(bits & SUPPLEMENTARY_MASK, minor)
    }

    /// Raw major code.
    pub fn major(&self) -> u32 {
        self.major
    }

    /// Raw, mechanism-specific minor code.
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Calling-error field of the major code.
    pub fn calling_error(&self) -> u32 {
        (self.major >> CALLING_ERROR_OFFSET) & CALLING_ERROR_MASK
    }

    /// Decoded routine-error field, if any.
    pub fn routine_error(&self) -> Option<RoutineError> {
        RoutineError::from_code((self.major >> ROUTINE_ERROR_OFFSET) & ROUTINE_ERROR_MASK)
    }

    /// Supplementary-information field of the major code.
    pub fn supplementary_bits(&self) -> u32 {
        self.major & SUPPLEMENTARY_MASK
    }

    /// Whether a calling or routine error is present.
    pub fn is_error(&self) -> bool {
        self.major & !SUPPLEMENTARY_MASK != 0
    }

    /// Whether any per-message sequencing problem (duplicate, old, unsequenced,
    /// gap) is flagged.
    pub fn is_sequence_problem(&self) -> bool {
        self.supplementary_bits() & !supplementary::CONTINUE_NEEDED != 0
    }

    /// Render the status as a single diagnostic line.
    ///
    /// `minor_text` is the mechanism's description of the minor code, when it
    /// has one.
    pub fn render(&self, minor_text: Option<&str>) -> String {
        let mut parts: Vec<String> = Vec::new();

        let calling = self.calling_error();
        if calling != 0 {
            parts.push(format!("calling error {calling}"));
        }
        match (self.routine_error(), (self.major >> ROUTINE_ERROR_OFFSET) & ROUTINE_ERROR_MASK) {
            (Some(err), _) => parts.push(format!("{} ({})", err.name(), err.description())),
            (None, 0) => {},
            (None, code) => parts.push(format!("unknown routine error {code}")),
        }
        for (bit, name) in supplementary::NAMES {
            if self.supplementary_bits() & bit != 0 {
                parts.push(name.to_string());
            }
        }
        if parts.is_empty() {
            parts.push("GSS_S_COMPLETE".to_string());
        }

        let minor = match minor_text {
            Some(text) => format!("minor {:#x}: {text}", self.minor),
            None => format!("minor {:#x}", self.minor),
        };
        format!("major {:#010x} [{}], {minor}", self.major, parts.join(", "))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routine_error_roundtrip() {
        for err in RoutineError::ALL {
            let status = Status::routine(err, 7);
            assert_eq!(status.routine_error(), Some(err));
            assert_eq!(status.minor(), 7);
            assert!(status.is_error());
        }
    }

    #[test]
    fn test_complete_is_not_error() {
        assert!(!Status::COMPLETE.is_error());
        assert!(Status::COMPLETE.routine_error().is_none());
        assert!(Status::COMPLETE.to_string().contains("GSS_S_COMPLETE"));
    }

    #[test]
    fn test_supplementary_bits() {
        let status = Status::supplementary(supplementary::DUPLICATE_TOKEN, 0);
        assert!(!status.is_error());
        assert!(status.is_sequence_problem());

        let cont = Status::supplementary(supplementary::CONTINUE_NEEDED, 0);
        assert!(!cont.is_sequence_problem());
    }

    #[test]
    fn test_render_includes_names_and_minor_text() {
        let status = Status::routine(RoutineError::DefectiveToken, 0x2a);
        let line = status.render(Some("bad magic"));
        assert!(line.contains("GSS_S_DEFECTIVE_TOKEN"));
        assert!(line.contains("0x00090000"));
        assert!(line.contains("minor 0x2a: bad magic"));
    }

    #[test]
    fn test_render_calling_error() {
        let status = Status::new(1 << 24, 0);
        assert_eq!(status.calling_error(), 1);
        assert!(status.is_error());
        assert!(status.render(None).contains("calling error 1"));
    }
}
