//! Names, name types and object identifiers.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors from parsing names and OIDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Empty name or empty component.
    #[error("empty name component in {0:?}")]
    Empty(String),

    /// The name does not have the shape its type requires.
    #[error("malformed {kind} name: {name:?}")]
    Malformed {
        /// Name type being parsed.
        kind: NameType,
        /// Offending input.
        name: String,
    },

    /// The name type cannot be used for this operation.
    #[error("name type {0} not supported here")]
    Unsupported(NameType),

    /// Not a dotted-decimal object identifier.
    #[error("invalid object identifier: {0:?}")]
    InvalidOid(String),
}

/// Dotted-decimal ASN.1 object identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(Cow<'static, str>);

/// Identifier of a negotiated security mechanism.
pub type MechanismOid = Oid;

impl Oid {
    /// Wrap a static OID string. The string is not validated.
    pub const fn from_static(oid: &'static str) -> Self {
        Self(Cow::Borrowed(oid))
    }

    /// Dotted-decimal form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Oid {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arcs: Vec<&str> = s.split('.').collect();
        let valid = arcs.len() >= 2
            && arcs
                .iter()
                .all(|arc| !arc.is_empty() && arc.bytes().all(|b| b.is_ascii_digit()));
        if !valid {
            return Err(NameError::InvalidOid(s.to_string()));
        }
        Ok(Self(Cow::Owned(s.to_string())))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recognized name forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameType {
    /// `service[@host]` (GSS_C_NT_HOSTBASED_SERVICE)
    HostBasedService,
    /// `user[@REALM]` (GSS_C_NT_USER_NAME)
    UserName,
    /// `primary[/instance][@REALM]` (GSS_KRB5_NT_PRINCIPAL_NAME)
    KerberosPrincipal,
    /// Mechanism-exported binary name (GSS_C_NT_EXPORT_NAME)
    ExportName,
}

impl NameType {
    /// Every name type, in the order mechanisms report them.
    pub const ALL: [NameType; 4] = [
        Self::HostBasedService,
        Self::UserName,
        Self::KerberosPrincipal,
        Self::ExportName,
    ];

    /// Standard OID of this name form.
    pub fn oid(self) -> Oid {
        match self {
            Self::HostBasedService => Oid::from_static("1.2.840.113554.1.2.1.4"),
            Self::UserName => Oid::from_static("1.2.840.113554.1.2.1.1"),
            Self::KerberosPrincipal => Oid::from_static("1.2.840.113554.1.2.2.1"),
            Self::ExportName => Oid::from_static("1.3.6.1.5.6.4"),
        }
    }

    /// Short lowercase label.
    pub fn label(self) -> &'static str {
        match self {
            Self::HostBasedService => "host-based service",
            Self::UserName => "user",
            Self::KerberosPrincipal => "kerberos principal",
            Self::ExportName => "export",
        }
    }
}

impl fmt::Display for NameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A parsed name with its type.
///
/// For host-based services `primary` is the service and `qualifier` the host.
/// For user names and principals `primary` is everything before the last `@`
/// and `qualifier` the realm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    name_type: NameType,
    primary: String,
    qualifier: Option<String>,
}

impl Name {
    /// Parse `text` as a name of type `name_type`.
    pub fn parse(text: &str, name_type: NameType) -> Result<Self, NameError> {
        if text.is_empty() {
            return Err(NameError::Empty(text.to_string()));
        }
        if text.chars().any(char::is_control) {
            return Err(NameError::Malformed {
                kind: name_type,
                name: text.to_string(),
            });
        }

        let (primary, qualifier) = match name_type {
            NameType::HostBasedService => {
                let mut parts = text.split('@');
                let service = parts.next().unwrap_or_default();
                let host = parts.next();
                if parts.next().is_some() || service.contains('/') {
                    return Err(NameError::Malformed {
                        kind: name_type,
                        name: text.to_string(),
                    });
                }
                (service, host)
            },
            NameType::UserName | NameType::KerberosPrincipal => match text.rsplit_once('@') {
                Some((primary, realm)) => (primary, Some(realm)),
                None => (text, None),
            },
            NameType::ExportName => return Err(NameError::Unsupported(name_type)),
        };

        if primary.is_empty() || qualifier.is_some_and(str::is_empty) {
            return Err(NameError::Empty(text.to_string()));
        }

        Ok(Self {
            name_type,
            primary: primary.to_string(),
            qualifier: qualifier.map(str::to_string),
        })
    }

    /// Name type.
    pub fn name_type(&self) -> NameType {
        self.name_type
    }

    /// Service or principal part.
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Host (host-based services) or realm (principals).
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Whether `principal` (`primary@qualifier`) names this entity.
    ///
    /// An unqualified name matches any qualifier.
    pub fn matches(&self, principal: &str) -> bool {
        let (primary, qualifier) = match principal.rsplit_once('@') {
            Some((p, q)) => (p, Some(q)),
            None => (principal, None),
        };
        if primary != self.primary {
            return false;
        }
        match (&self.qualifier, qualifier) {
            (None, _) => true,
            (Some(ours), Some(theirs)) => ours.eq_ignore_ascii_case(theirs),
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}@{q}", self.primary),
            None => f.write_str(&self.primary),
        }
    }
}

/// Display name of an authenticated peer, as exported by the mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Wrap a mechanism-exported display string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The display string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
