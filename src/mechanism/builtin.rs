//! Keytab-backed pre-shared-key mechanism.
//!
//! The acceptor holds the service's long-term key in a keytab; the initiator
//! holds the same key. The INIT token is authenticated with a key derived
//! from it, both sides contribute an X25519 ephemeral, and the context keys
//! come from HKDF over the shared secret and the long-term key, salted with
//! the handshake transcript.
//!
//! This mechanism asserts the initiator's name on behalf of whoever holds the
//! service key. It stands in for a Kerberos-family mechanism where no system
//! GSS-API library is available.

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use bytes::Bytes;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::keytab::{KeyMaterial, Keytab, KeytabError};
use super::token::{self, AcceptToken, InitToken, MechToken, TokenError, WrapToken, TAG_LEN};
use super::{AcceptLeg, EstablishedInfo, MechanismProvider, MechanismSession};
use crate::flags::FlagSet;
use crate::name::{MechanismOid, Name, NameType, Oid, PeerIdentity};
use crate::status::{supplementary, RoutineError, Status};

type HmacSha256 = Hmac<Sha256>;

/// Object identifier of the keytab mechanism (UUID-derived arc under 2.25).
pub const KEYTAB_MECH_OID: Oid = Oid::from_static("2.25.216895617123540123456254417651938103529");

/// Default upper bound on context lifetime (8 hours)
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(8 * 60 * 60);

/// Flags this mechanism can grant besides integrity, which is always on.
const GRANTABLE: u32 = FlagSet::MUTUAL | FlagSet::REPLAY | FlagSet::SEQUENCE;

const INFO_INIT: &[u8] = b"gsslayer/v1/init";
const INFO_ACCEPT: &[u8] = b"gsslayer/v1/accept";
const INFO_CONFIRM: &[u8] = b"gsslayer/v1/confirm";
const INFO_MIC: &[u8] = b"gsslayer/v1/mic";
const INFO_WRAP: &[u8] = b"gsslayer/v1/wrap";

/// Minor status codes of the keytab mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum MinorCode {
    BadMagic = 1,
    UnknownKind = 2,
    Truncated = 3,
    Trailing = 4,
    BadUtf8 = 5,
    TooManyMechs = 6,
    UnexpectedToken = 7,
    NoCommonMech = 8,
    WrongTarget = 9,
    BadInitiatorName = 10,
    BadInitMac = 11,
    BadConfirm = 12,
    BadAcceptProof = 13,
    KeyAgreement = 14,
    KeytabMissing = 15,
    KeytabCorrupt = 16,
    InvalidKey = 17,
    NoKeytabEntry = 18,
    ContextExpired = 19,
    BadMic = 20,
    Replayed = 21,
    OutOfSequence = 22,
    Gap = 23,
    TooOld = 24,
    KeyDerivation = 25,
    InitiatorState = 26,
    FieldTooLong = 27,
}

impl MinorCode {
    const ALL: [MinorCode; 27] = [
        Self::BadMagic,
        Self::UnknownKind,
        Self::Truncated,
        Self::Trailing,
        Self::BadUtf8,
        Self::TooManyMechs,
        Self::UnexpectedToken,
        Self::NoCommonMech,
        Self::WrongTarget,
        Self::BadInitiatorName,
        Self::BadInitMac,
        Self::BadConfirm,
        Self::BadAcceptProof,
        Self::KeyAgreement,
        Self::KeytabMissing,
        Self::KeytabCorrupt,
        Self::InvalidKey,
        Self::NoKeytabEntry,
        Self::ContextExpired,
        Self::BadMic,
        Self::Replayed,
        Self::OutOfSequence,
        Self::Gap,
        Self::TooOld,
        Self::KeyDerivation,
        Self::InitiatorState,
        Self::FieldTooLong,
    ];

    /// Decode a raw minor code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| *m as u32 == code)
    }

    /// Human-readable description.
    pub fn message(self) -> &'static str {
        match self {
            Self::BadMagic => "token does not start with the mechanism magic",
            Self::UnknownKind => "unknown token kind",
            Self::Truncated => "token truncated",
            Self::Trailing => "trailing bytes after token",
            Self::BadUtf8 => "name is not valid UTF-8",
            Self::TooManyMechs => "too many mechanisms offered",
            Self::UnexpectedToken => "token kind not expected at this point",
            Self::NoCommonMech => "initiator does not offer the keytab mechanism",
            Self::WrongTarget => "token is addressed to a different service",
            Self::BadInitiatorName => "initiator name is malformed",
            Self::BadInitMac => "initiator token authentication failed",
            Self::BadConfirm => "initiator key confirmation failed",
            Self::BadAcceptProof => "acceptor proof verification failed",
            Self::KeyAgreement => "key agreement produced a non-contributory secret",
            Self::KeytabMissing => "keytab cannot be read",
            Self::KeytabCorrupt => "keytab cannot be parsed",
            Self::InvalidKey => "keytab key is invalid",
            Self::NoKeytabEntry => "no keytab entry for principal",
            Self::ContextExpired => "context lifetime elapsed",
            Self::BadMic => "integrity check failed",
            Self::Replayed => "message token replayed",
            Self::OutOfSequence => "message token out of sequence",
            Self::Gap => "message token sequence gap",
            Self::TooOld => "message token outside replay window",
            Self::KeyDerivation => "key derivation failed",
            Self::InitiatorState => "initiator used out of order",
            Self::FieldTooLong => "token field too long to encode",
        }
    }

    fn status(self, error: RoutineError) -> Status {
        Status::routine(error, self as u32)
    }
}

impl From<TokenError> for MinorCode {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::BadMagic => Self::BadMagic,
            TokenError::UnknownKind(_) => Self::UnknownKind,
            TokenError::Truncated => Self::Truncated,
            TokenError::Trailing => Self::Trailing,
            TokenError::BadUtf8 => Self::BadUtf8,
            TokenError::TooManyMechs => Self::TooManyMechs,
            TokenError::TooLong(_) => Self::FieldTooLong,
        }
    }
}

fn defective(err: TokenError) -> Status {
    MinorCode::from(err).status(RoutineError::DefectiveToken)
}

fn unencodable(err: TokenError) -> Status {
    tracing::debug!(error = %err, "token encoding failed");
    MinorCode::from(err).status(RoutineError::Failure)
}

fn hmac_tag(key: &[u8], parts: &[&[u8]]) -> [u8; TAG_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    for part in parts {
        mac.update(part);
    }
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    tag
}

fn hmac_verify(key: &[u8], parts: &[&[u8]], tag: &[u8]) -> bool {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(tag).is_ok()
}

fn hkdf_expand(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> Result<[u8; 32], Status> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|_| MinorCode::KeyDerivation.status(RoutineError::Failure))?;
    Ok(okm)
}

/// Per-context keys, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct ContextKeys {
    accept: [u8; 32],
    confirm: [u8; 32],
    mic: [u8; 32],
    wrap: [u8; 32],
}

impl ContextKeys {
    fn derive(shared: &[u8], service_key: &KeyMaterial, transcript: &[u8]) -> Result<Self, Status> {
        let mut ikm = Vec::with_capacity(shared.len() + service_key.len());
        ikm.extend_from_slice(shared);
        ikm.extend_from_slice(service_key.as_bytes());

        let keys = Self::expand(&ikm, transcript);
        ikm.zeroize();
        keys
    }

    fn expand(ikm: &[u8], transcript: &[u8]) -> Result<Self, Status> {
        Ok(Self {
            accept: hkdf_expand(Some(transcript), ikm, INFO_ACCEPT)?,
            confirm: hkdf_expand(Some(transcript), ikm, INFO_CONFIRM)?,
            mic: hkdf_expand(Some(transcript), ikm, INFO_MIC)?,
            wrap: hkdf_expand(Some(transcript), ikm, INFO_WRAP)?,
        })
    }
}

fn transcript_hash(init_raw: &[u8], flags: u32, lifetime_secs: u32, acceptor_eph: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(init_raw);
    hasher.update(flags.to_be_bytes());
    hasher.update(lifetime_secs.to_be_bytes());
    hasher.update(acceptor_eph);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn init_mac_key(service_key: &KeyMaterial) -> Result<[u8; 32], Status> {
    hkdf_expand(None, service_key.as_bytes(), INFO_INIT)
}

/// Where the acceptor's keytab comes from.
#[derive(Debug, Clone)]
pub enum KeytabSource {
    /// Read the keytab file at acquisition time.
    File(PathBuf),
    /// Use an already loaded keytab.
    Memory(Keytab),
}

/// Keytab-backed pre-shared-key mechanism.
#[derive(Debug, Clone)]
pub struct KeytabMechanism {
    source: KeytabSource,
    max_lifetime: Duration,
}

impl KeytabMechanism {
    /// Create a mechanism reading keys from `source`.
    pub fn new(source: KeytabSource) -> Self {
        Self {
            source,
            max_lifetime: DEFAULT_MAX_LIFETIME,
        }
    }

    /// Mechanism backed by a keytab file.
    pub fn from_keytab_file(path: impl Into<PathBuf>) -> Self {
        Self::new(KeytabSource::File(path.into()))
    }

    /// Mechanism backed by an in-memory keytab.
    pub fn in_memory(keytab: Keytab) -> Self {
        Self::new(KeytabSource::Memory(keytab))
    }

    /// Cap context lifetimes at `max`.
    #[must_use]
    pub fn with_max_lifetime(mut self, max: Duration) -> Self {
        self.max_lifetime = max;
        self
    }

    fn keytab(&self) -> Result<Cow<'_, Keytab>, Status> {
        match &self.source {
            KeytabSource::Memory(keytab) => Ok(Cow::Borrowed(keytab)),
            KeytabSource::File(path) => Keytab::from_file(path).map(Cow::Owned).map_err(|e| {
                tracing::debug!(path = %path.display(), error = %e, "keytab load failed");
                match e {
                    KeytabError::Read { .. } => MinorCode::KeytabMissing.status(RoutineError::NoCred),
                    KeytabError::Parse(_) => {
                        MinorCode::KeytabCorrupt.status(RoutineError::DefectiveCredential)
                    },
                    KeytabError::InvalidKey { .. } => {
                        MinorCode::InvalidKey.status(RoutineError::DefectiveCredential)
                    },
                }
            }),
        }
    }

    fn granted_lifetime(&self, requested_secs: u32) -> u32 {
        let max = u32::try_from(self.max_lifetime.as_secs()).unwrap_or(u32::MAX);
        if requested_secs == 0 {
            max
        } else {
            requested_secs.min(max)
        }
    }

    fn first_leg(&self, credential: &KeytabCredential, raw: &[u8]) -> Result<AcceptLeg<KeytabPartial, KeytabSession>, Status> {
        let init = match token::decode(raw).map_err(defective)? {
            MechToken::Init(init) => init,
            other => {
                tracing::debug!(kind = ?other.kind(), "expected INIT token");
                return Err(MinorCode::UnexpectedToken.status(RoutineError::DefectiveToken));
            },
        };

        let oid = KEYTAB_MECH_OID;
        if !init.mechs.iter().any(|m| m == oid.as_str()) {
            return Err(MinorCode::NoCommonMech.status(RoutineError::BadMech));
        }

        let target = Name::parse(&init.target, NameType::HostBasedService)
            .map_err(|_| MinorCode::WrongTarget.status(RoutineError::BadName))?;
        if !target.matches(&credential.principal) {
            return Err(MinorCode::WrongTarget.status(RoutineError::BadName));
        }
        let initiator = Name::parse(&init.initiator, NameType::UserName)
            .map_err(|_| MinorCode::BadInitiatorName.status(RoutineError::BadName))?;

        let body = &raw[..raw.len() - TAG_LEN];
        let mut mac_key = init_mac_key(&credential.key)?;
        let authentic = hmac_verify(&mac_key, &[body], &init.mac);
        mac_key.zeroize();
        if !authentic {
            return Err(MinorCode::BadInitMac.status(RoutineError::BadMic));
        }

        let flags = (init.flags & GRANTABLE) | FlagSet::INTEG;
        let lifetime_secs = self.granted_lifetime(init.lifetime_secs);

        let secret = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral = PublicKey::from(&secret);
        let shared = secret.diffie_hellman(&PublicKey::from(init.ephemeral));
        if !shared.was_contributory() {
            return Err(MinorCode::KeyAgreement.status(RoutineError::DefectiveToken));
        }

        let transcript = transcript_hash(raw, flags, lifetime_secs, ephemeral.as_bytes());
        let keys = ContextKeys::derive(shared.as_bytes(), &credential.key, &transcript)?;
        let proof = hmac_tag(&keys.accept, &[transcript.as_slice()]);

        let output = token::encode(&MechToken::Accept(AcceptToken {
            flags,
            lifetime_secs,
            ephemeral: *ephemeral.as_bytes(),
            proof,
        }))
        .map_err(unencodable)?;

        let info = EstablishedInfo {
            mechanism: oid,
            peer: PeerIdentity::new(initiator.to_string()),
            name_forms: self.name_types().into_iter().map(NameType::oid).collect(),
            flags: FlagSet::from_bits(flags),
            lifetime: Some(Duration::from_secs(u64::from(lifetime_secs))),
        };

        if flags & FlagSet::MUTUAL != 0 {
            Ok(AcceptLeg::Continue {
                partial: KeytabPartial {
                    transcript,
                    keys,
                    info,
                },
                output: Some(output),
            })
        } else {
            let session = KeytabSession::new(keys, &info);
            Ok(AcceptLeg::Complete {
                session,
                info,
                output: Some(output),
            })
        }
    }

    fn confirm_leg(partial: KeytabPartial, raw: &[u8]) -> Result<AcceptLeg<KeytabPartial, KeytabSession>, Status> {
        let proof = match token::decode(raw).map_err(defective)? {
            MechToken::Confirm(proof) => proof,
            _ => return Err(MinorCode::UnexpectedToken.status(RoutineError::DefectiveToken)),
        };
        if !hmac_verify(&partial.keys.confirm, &[partial.transcript.as_slice()], &proof) {
            return Err(MinorCode::BadConfirm.status(RoutineError::BadMic));
        }

        let KeytabPartial { keys, info, .. } = partial;
        let session = KeytabSession::new(keys, &info);
        Ok(AcceptLeg::Complete {
            session,
            info,
            output: None,
        })
    }
}

impl MechanismProvider for KeytabMechanism {
    type Credential = KeytabCredential;
    type Partial = KeytabPartial;
    type Session = KeytabSession;

    fn oid(&self) -> &MechanismOid {
        static OID: Oid = KEYTAB_MECH_OID;
        &OID
    }

    fn name(&self) -> &'static str {
        "gsslayer-keytab"
    }

    fn acquire_credential(&self, name: &Name) -> Result<KeytabCredential, Status> {
        let keytab = self.keytab()?;
        let entry = keytab
            .find(name)
            .ok_or_else(|| MinorCode::NoKeytabEntry.status(RoutineError::NoCred))?;
        Ok(KeytabCredential {
            principal: entry.principal.clone(),
            key: entry.key.clone(),
        })
    }

    fn accept_leg(
        &self,
        credential: &KeytabCredential,
        partial: Option<KeytabPartial>,
        token: &[u8],
    ) -> Result<AcceptLeg<KeytabPartial, KeytabSession>, Status> {
        match partial {
            None => self.first_leg(credential, token),
            Some(partial) => Self::confirm_leg(partial, token),
        }
    }

    fn minor_message(&self, minor: u32) -> Option<&'static str> {
        MinorCode::from_code(minor).map(MinorCode::message)
    }
}

/// Acceptor credential: a service principal and its long-term key.
#[derive(Debug)]
pub struct KeytabCredential {
    principal: String,
    key: KeyMaterial,
}

impl KeytabCredential {
    /// Principal from the keytab entry.
    pub fn principal(&self) -> &str {
        &self.principal
    }
}

/// Acceptor state while waiting for the initiator's key confirmation.
pub struct KeytabPartial {
    transcript: [u8; 32],
    keys: ContextKeys,
    info: EstablishedInfo,
}

/// Sliding window over received sequence numbers.
#[derive(Debug, Default)]
struct SequenceWindow {
    highest: Option<u64>,
    /// Bit `i` marks `highest - i` as seen.
    seen: u64,
}

impl SequenceWindow {
    const SIZE: u64 = 64;

    fn check(&self, seq: u64, sequence: bool) -> Result<(), (u32, MinorCode)> {
        let Some(highest) = self.highest else {
            if sequence && seq != 0 {
                return Err((supplementary::GAP_TOKEN, MinorCode::Gap));
            }
            return Ok(());
        };

        if seq > highest {
            if sequence && seq != highest + 1 {
                return Err((supplementary::GAP_TOKEN, MinorCode::Gap));
            }
            return Ok(());
        }

        let age = highest - seq;
        if age >= Self::SIZE {
            return Err((supplementary::OLD_TOKEN, MinorCode::TooOld));
        }
        if self.seen & (1 << age) != 0 {
            return Err((supplementary::DUPLICATE_TOKEN, MinorCode::Replayed));
        }
        if sequence {
            return Err((supplementary::UNSEQ_TOKEN, MinorCode::OutOfSequence));
        }
        Ok(())
    }

    fn mark(&mut self, seq: u64) {
        match self.highest {
            Some(highest) if seq <= highest => self.seen |= 1 << (highest - seq),
            Some(highest) => {
                let shift = seq - highest;
                self.seen = if shift >= Self::SIZE { 0 } else { self.seen << shift };
                self.seen |= 1;
                self.highest = Some(seq);
            },
            None => {
                self.seen = 1;
                self.highest = Some(seq);
            },
        }
    }
}

/// Per-message state of an established keytab-mechanism context.
pub struct KeytabSession {
    keys: ContextKeys,
    flags: FlagSet,
    expires_at: Option<Instant>,
    window: SequenceWindow,
}

impl KeytabSession {
    fn new(keys: ContextKeys, info: &EstablishedInfo) -> Self {
        Self {
            keys,
            flags: info.flags,
            expires_at: info.lifetime.map(|l| Instant::now() + l),
            window: SequenceWindow::default(),
        }
    }

    fn check_expiry(&self) -> Result<(), Status> {
        match self.expires_at {
            Some(at) if Instant::now() >= at => {
                Err(MinorCode::ContextExpired.status(RoutineError::ContextExpired))
            },
            _ => Ok(()),
        }
    }
}

impl MechanismSession for KeytabSession {
    fn unwrap(&mut self, raw: &[u8]) -> Result<Bytes, Status> {
        self.check_expiry()?;
        let wrap = match token::decode(raw).map_err(defective)? {
            MechToken::Wrap(wrap) => wrap,
            _ => return Err(MinorCode::UnexpectedToken.status(RoutineError::DefectiveToken)),
        };

        let signed = token::wrap_signed_bytes(wrap.seq, &wrap.payload).map_err(defective)?;
        if !hmac_verify(&self.keys.wrap, &[&signed[..]], &wrap.tag) {
            return Err(MinorCode::BadMic.status(RoutineError::BadMic));
        }

        let replay = self.flags.contains(FlagSet::REPLAY);
        let sequence = self.flags.contains(FlagSet::SEQUENCE);
        if replay || sequence {
            self.window
                .check(wrap.seq, sequence)
                .map_err(|(bits, minor)| Status::supplementary(bits, minor as u32))?;
            self.window.mark(wrap.seq);
        }

        Ok(wrap.payload)
    }

    fn get_mic(&self, message: &[u8]) -> Result<Bytes, Status> {
        self.check_expiry()?;
        token::encode(&MechToken::Mic(hmac_tag(&self.keys.mic, &[message]))).map_err(unencodable)
    }

    fn verify_mic(&self, message: &[u8], mic: &[u8]) -> Result<(), Status> {
        self.check_expiry()?;
        let tag = match token::decode(mic).map_err(defective)? {
            MechToken::Mic(tag) => tag,
            _ => return Err(MinorCode::UnexpectedToken.status(RoutineError::DefectiveToken)),
        };
        if hmac_verify(&self.keys.mic, &[message], &tag) {
            Ok(())
        } else {
            Err(MinorCode::BadMic.status(RoutineError::BadMic))
        }
    }
}

/// Initiator side of the keytab mechanism.
///
/// Produces the peer tokens an acceptor consumes. Used by the demo client and
/// tests; acceptor code never needs it.
pub struct Initiator {
    name: String,
    target: String,
    service_key: KeyMaterial,
    flags: u32,
    lifetime_secs: u32,
    mechs: Vec<Oid>,
    pending: Option<(Bytes, EphemeralSecret)>,
}

/// Result of completing the initiator handshake.
pub struct InitiatorStep {
    /// Established initiator context.
    pub session: InitiatorSession,
    /// Key confirmation token to send, when mutual authentication was granted.
    pub output: Option<Bytes>,
}

impl Initiator {
    /// Initiator named `name` targeting service `target`, holding its key.
    pub fn new(name: impl Into<String>, target: impl Into<String>, service_key: KeyMaterial) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            service_key,
            flags: FlagSet::INTEG,
            lifetime_secs: 0,
            mechs: vec![KEYTAB_MECH_OID],
            pending: None,
        }
    }

    /// Request these flags.
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Request a context lifetime in seconds (0 lets the acceptor choose).
    #[must_use]
    pub fn with_lifetime(mut self, secs: u32) -> Self {
        self.lifetime_secs = secs;
        self
    }

    /// Offer these mechanisms instead of the keytab mechanism alone.
    #[must_use]
    pub fn with_mechs(mut self, mechs: Vec<Oid>) -> Self {
        self.mechs = mechs;
        self
    }

    /// Build the opening INIT token.
    pub fn initial_token(&mut self) -> Result<Bytes, Status> {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let mut nonce = [0u8; token::NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut init = InitToken {
            mechs: self.mechs.iter().map(|m| m.as_str().to_string()).collect(),
            flags: self.flags,
            lifetime_secs: self.lifetime_secs,
            initiator: self.name.clone(),
            target: self.target.clone(),
            ephemeral: *PublicKey::from(&secret).as_bytes(),
            nonce,
            mac: [0u8; TAG_LEN],
        };
        let body = token::encode_init_body(&init).map_err(unencodable)?;
        let mut mac_key = init_mac_key(&self.service_key)?;
        init.mac = hmac_tag(&mac_key, &[&body[..]]);
        mac_key.zeroize();

        let raw = token::encode(&MechToken::Init(init)).map_err(unencodable)?;
        self.pending = Some((raw.clone(), secret));
        Ok(raw)
    }

    /// Consume the acceptor's ACCEPT token.
    pub fn finish(mut self, raw: &[u8]) -> Result<InitiatorStep, Status> {
        let (init_raw, secret) = self
            .pending
            .take()
            .ok_or_else(|| MinorCode::InitiatorState.status(RoutineError::NoContext))?;
        let accept = match token::decode(raw).map_err(defective)? {
            MechToken::Accept(accept) => accept,
            _ => return Err(MinorCode::UnexpectedToken.status(RoutineError::DefectiveToken)),
        };

        let shared = secret.diffie_hellman(&PublicKey::from(accept.ephemeral));
        if !shared.was_contributory() {
            return Err(MinorCode::KeyAgreement.status(RoutineError::DefectiveToken));
        }
        let transcript = transcript_hash(&init_raw, accept.flags, accept.lifetime_secs, &accept.ephemeral);
        let keys = ContextKeys::derive(shared.as_bytes(), &self.service_key, &transcript)?;
        if !hmac_verify(&keys.accept, &[transcript.as_slice()], &accept.proof) {
            return Err(MinorCode::BadAcceptProof.status(RoutineError::BadMic));
        }

        let flags = FlagSet::from_bits(accept.flags);
        let output = flags
            .contains(FlagSet::MUTUAL)
            .then(|| {
                token::encode(&MechToken::Confirm(hmac_tag(&keys.confirm, &[transcript.as_slice()])))
            })
            .transpose()
            .map_err(unencodable)?;

        Ok(InitiatorStep {
            session: InitiatorSession {
                keys,
                flags,
                next_seq: 0,
            },
            output,
        })
    }
}

/// Established initiator context.
pub struct InitiatorSession {
    keys: ContextKeys,
    flags: FlagSet,
    next_seq: u64,
}

impl InitiatorSession {
    /// Flags granted by the acceptor.
    pub fn flags(&self) -> FlagSet {
        self.flags
    }

    /// Integrity-protect `payload` for the acceptor.
    pub fn wrap(&mut self, payload: &[u8]) -> Result<Bytes, Status> {
        let seq = self.next_seq;
        let signed = token::wrap_signed_bytes(seq, payload).map_err(unencodable)?;
        let tag = hmac_tag(&self.keys.wrap, &[&signed[..]]);
        let raw = token::encode(&MechToken::Wrap(WrapToken {
            seq,
            payload: Bytes::copy_from_slice(payload),
            tag,
        }))
        .map_err(unencodable)?;
        self.next_seq += 1;
        Ok(raw)
    }

    /// Compute a MIC the acceptor can verify.
    pub fn get_mic(&self, message: &[u8]) -> Result<Bytes, Status> {
        token::encode(&MechToken::Mic(hmac_tag(&self.keys.mic, &[message]))).map_err(unencodable)
    }

    /// Check a MIC produced by the acceptor.
    pub fn verify_mic(&self, message: &[u8], mic: &[u8]) -> bool {
        match token::decode(mic) {
            Ok(MechToken::Mic(tag)) => hmac_verify(&self.keys.mic, &[message], &tag),
            _ => false,
        }
    }
}
