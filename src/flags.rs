//! Negotiated context capability flags.
//!
//! Bit assignments follow the GSS-API C bindings (RFC 2744) so that flag
//! words exchanged with other implementations keep their meaning.

use std::fmt;

/// Immutable set of negotiated capability flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlagSet(u32);

impl FlagSet {
    /// Credential delegation.
    pub const DELEG: u32 = 1 << 0;
    /// Mutual authentication.
    pub const MUTUAL: u32 = 1 << 1;
    /// Replay detection on per-message tokens.
    pub const REPLAY: u32 = 1 << 2;
    /// Out-of-sequence detection on per-message tokens.
    pub const SEQUENCE: u32 = 1 << 3;
    /// Confidentiality (wrap with encryption).
    pub const CONF: u32 = 1 << 4;
    /// Integrity (MIC and integrity-only wrap).
    pub const INTEG: u32 = 1 << 5;
    /// Anonymous initiator.
    pub const ANON: u32 = 1 << 6;
    /// Protection available before completion.
    pub const PROT_READY: u32 = 1 << 7;
    /// Context can be exported.
    pub const TRANS: u32 = 1 << 8;
    /// Delegation subject to local policy.
    pub const DELEG_POLICY: u32 = 1 << 15;

    /// Empty flag set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Get raw bits
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if every bit of `flag` is set
    pub const fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Check if no flag is set
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate the individual set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..u32::BITS).map(|shift| 1u32 << shift).filter(move |bit| self.0 & bit != 0)
    }

    /// Canonical names of the set bits, in ascending bit order.
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(flag_name).collect()
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(none)");
        }
        f.write_str(&self.names().join(" | "))
    }
}

/// Canonical diagnostic name of a single capability bit.
///
/// Used for logging only. Bits without a defined meaning, and values with
/// more than one bit set, map to `"GSS_C_UNKNOWN_FLAG"`.
pub fn flag_name(bit: u32) -> &'static str {
    match bit {
        FlagSet::DELEG => "GSS_C_DELEG_FLAG",
        FlagSet::MUTUAL => "GSS_C_MUTUAL_FLAG",
        FlagSet::REPLAY => "GSS_C_REPLAY_FLAG",
        FlagSet::SEQUENCE => "GSS_C_SEQUENCE_FLAG",
        FlagSet::CONF => "GSS_C_CONF_FLAG",
        FlagSet::INTEG => "GSS_C_INTEG_FLAG",
        FlagSet::ANON => "GSS_C_ANON_FLAG",
        FlagSet::PROT_READY => "GSS_C_PROT_READY_FLAG",
        FlagSet::TRANS => "GSS_C_TRANS_FLAG",
        FlagSet::DELEG_POLICY => "GSS_C_DELEG_POLICY_FLAG",
        _ => "GSS_C_UNKNOWN_FLAG",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iter_ascending() {
        let flags = FlagSet::from_bits(FlagSet::INTEG | FlagSet::MUTUAL | FlagSet::REPLAY);
        let bits: Vec<u32> = flags.iter().collect();
        assert_eq!(bits, vec![FlagSet::MUTUAL, FlagSet::REPLAY, FlagSet::INTEG]);
    }

    #[test]
    fn test_flag_names() {
        assert_eq!(flag_name(FlagSet::MUTUAL), "GSS_C_MUTUAL_FLAG");
        assert_eq!(flag_name(FlagSet::DELEG_POLICY), "GSS_C_DELEG_POLICY_FLAG");
        assert_eq!(flag_name(1 << 20), "GSS_C_UNKNOWN_FLAG");
        assert_eq!(flag_name(FlagSet::MUTUAL | FlagSet::CONF), "GSS_C_UNKNOWN_FLAG");
    }

    #[test]
    fn test_contains() {
        let a = FlagSet::from_bits(FlagSet::MUTUAL | FlagSet::REPLAY);
        assert!(a.contains(FlagSet::MUTUAL));
        assert!(!a.contains(FlagSet::MUTUAL | FlagSet::INTEG));
    }

    #[test]
    fn test_display() {
        assert_eq!(FlagSet::empty().to_string(), "(none)");
        let flags = FlagSet::from_bits(FlagSet::MUTUAL | FlagSet::INTEG);
        assert_eq!(flags.to_string(), "GSS_C_MUTUAL_FLAG | GSS_C_INTEG_FLAG");
    }
}
