//! Wire format of the built-in mechanism's tokens.
//!
//! Every token starts with a 4-byte magic (`GSL` + version) and a kind byte.
//! Integers are big-endian.
//!
//! ```text
//! INIT     mech_count:u8 (len:u8 oid)* flags:u32 lifetime:u32
//!          initiator:(len:u16 utf8) target:(len:u16 utf8)
//!          ephemeral:32 nonce:16 | mac:32
//! ACCEPT   flags:u32 lifetime:u32 ephemeral:32 proof:32
//! CONFIRM  proof:32
//! MIC      tag:32
//! WRAP     seq:u64 len:u32 payload tag:32
//! ```
//!
//! The INIT mac covers every byte before it, header included.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub(crate) const MAGIC: [u8; 4] = *b"GSL\x01";
pub(crate) const KEY_LEN: usize = 32;
pub(crate) const TAG_LEN: usize = 32;
pub(crate) const NONCE_LEN: usize = 16;
const HEADER_LEN: usize = MAGIC.len() + 1;
const MAX_MECHS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Kind {
    Init = 1,
    Accept = 2,
    Confirm = 3,
    Mic = 4,
    Wrap = 5,
}

impl Kind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Init),
            2 => Some(Self::Accept),
            3 => Some(Self::Confirm),
            4 => Some(Self::Mic),
            5 => Some(Self::Wrap),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenError {
    #[error("bad token magic")]
    BadMagic,
    #[error("unknown token kind {0}")]
    UnknownKind(u8),
    #[error("token truncated")]
    Truncated,
    #[error("trailing bytes after token")]
    Trailing,
    #[error("invalid UTF-8 in name")]
    BadUtf8,
    #[error("too many mechanisms")]
    TooManyMechs,
    #[error("{0} too long to encode")]
    TooLong(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InitToken {
    pub mechs: Vec<String>,
    pub flags: u32,
    pub lifetime_secs: u32,
    pub initiator: String,
    pub target: String,
    pub ephemeral: [u8; KEY_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub mac: [u8; TAG_LEN],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AcceptToken {
    pub flags: u32,
    pub lifetime_secs: u32,
    pub ephemeral: [u8; KEY_LEN],
    pub proof: [u8; TAG_LEN],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WrapToken {
    pub seq: u64,
    pub payload: Bytes,
    pub tag: [u8; TAG_LEN],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MechToken {
    Init(InitToken),
    Accept(AcceptToken),
    Confirm([u8; TAG_LEN]),
    Mic([u8; TAG_LEN]),
    Wrap(WrapToken),
}

impl MechToken {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Init(_) => Kind::Init,
            Self::Accept(_) => Kind::Accept,
            Self::Confirm(_) => Kind::Confirm,
            Self::Mic(_) => Kind::Mic,
            Self::Wrap(_) => Kind::Wrap,
        }
    }
}

fn header(kind: Kind, capacity: usize) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + capacity);
    buf.put_slice(&MAGIC);
    buf.put_u8(kind as u8);
    buf
}

fn len_u8(len: usize, field: &'static str) -> Result<u8, TokenError> {
    u8::try_from(len).map_err(|_| TokenError::TooLong(field))
}

fn len_u16(len: usize, field: &'static str) -> Result<u16, TokenError> {
    u16::try_from(len).map_err(|_| TokenError::TooLong(field))
}

fn len_u32(len: usize, field: &'static str) -> Result<u32, TokenError> {
    u32::try_from(len).map_err(|_| TokenError::TooLong(field))
}

/// INIT token bytes without the trailing mac.
pub(crate) fn encode_init_body(init: &InitToken) -> Result<BytesMut, TokenError> {
    if init.mechs.len() > MAX_MECHS {
        return Err(TokenError::TooManyMechs);
    }
    let mut buf = header(Kind::Init, 128);
    buf.put_u8(len_u8(init.mechs.len(), "mechanism list")?);
    for mech in &init.mechs {
        buf.put_u8(len_u8(mech.len(), "mechanism oid")?);
        buf.put_slice(mech.as_bytes());
    }
    buf.put_u32(init.flags);
    buf.put_u32(init.lifetime_secs);
    buf.put_u16(len_u16(init.initiator.len(), "initiator name")?);
    buf.put_slice(init.initiator.as_bytes());
    buf.put_u16(len_u16(init.target.len(), "target name")?);
    buf.put_slice(init.target.as_bytes());
    buf.put_slice(&init.ephemeral);
    buf.put_slice(&init.nonce);
    Ok(buf)
}

pub(crate) fn encode(token: &MechToken) -> Result<Bytes, TokenError> {
    let raw = match token {
        MechToken::Init(init) => {
            let mut buf = encode_init_body(init)?;
            buf.put_slice(&init.mac);
            buf.freeze()
        },
        MechToken::Accept(accept) => {
            let mut buf = header(Kind::Accept, 8 + KEY_LEN + TAG_LEN);
            buf.put_u32(accept.flags);
            buf.put_u32(accept.lifetime_secs);
            buf.put_slice(&accept.ephemeral);
            buf.put_slice(&accept.proof);
            buf.freeze()
        },
        MechToken::Confirm(proof) => {
            let mut buf = header(Kind::Confirm, TAG_LEN);
            buf.put_slice(proof);
            buf.freeze()
        },
        MechToken::Mic(tag) => {
            let mut buf = header(Kind::Mic, TAG_LEN);
            buf.put_slice(tag);
            buf.freeze()
        },
        MechToken::Wrap(wrap) => {
            let mut buf = wrap_signed_bytes(wrap.seq, &wrap.payload)?;
            buf.put_slice(&wrap.tag);
            buf.freeze()
        },
    };
    Ok(raw)
}

/// Bytes covered by a WRAP tag: header, sequence number and payload.
pub(crate) fn wrap_signed_bytes(seq: u64, payload: &[u8]) -> Result<BytesMut, TokenError> {
    let len = len_u32(payload.len(), "payload")?;
    let mut buf = header(Kind::Wrap, 12 + payload.len() + TAG_LEN);
    buf.put_u64(seq);
    buf.put_u32(len);
    buf.put_slice(payload);
    Ok(buf)
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn need(&self, n: usize) -> Result<(), TokenError> {
        if self.buf.remaining() < n {
            Err(TokenError::Truncated)
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8, TokenError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16, TokenError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self) -> Result<u32, TokenError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn u64(&mut self) -> Result<u64, TokenError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    fn slice(&mut self, n: usize) -> Result<&'a [u8], TokenError> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], TokenError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(N)?);
        Ok(out)
    }

    fn string(&mut self, len: usize) -> Result<String, TokenError> {
        let raw = self.slice(len)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| TokenError::BadUtf8)
    }

    fn finish(&self) -> Result<(), TokenError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(TokenError::Trailing)
        }
    }
}

pub(crate) fn decode(raw: &[u8]) -> Result<MechToken, TokenError> {
    if raw.len() < HEADER_LEN {
        return Err(if raw.starts_with(&MAGIC[..raw.len().min(MAGIC.len())]) {
            TokenError::Truncated
        } else {
            TokenError::BadMagic
        });
    }
    if raw[..MAGIC.len()] != MAGIC {
        return Err(TokenError::BadMagic);
    }
    let kind = Kind::from_byte(raw[MAGIC.len()]).ok_or(TokenError::UnknownKind(raw[MAGIC.len()]))?;
    let mut r = Reader {
        buf: &raw[HEADER_LEN..],
    };

    let token = match kind {
        Kind::Init => {
            let count = r.u8()? as usize;
            if count > MAX_MECHS {
                return Err(TokenError::TooManyMechs);
            }
            let mut mechs = Vec::with_capacity(count);
            for _ in 0..count {
                let len = r.u8()? as usize;
                mechs.push(r.string(len)?);
            }
            let flags = r.u32()?;
            let lifetime_secs = r.u32()?;
            let initiator_len = r.u16()? as usize;
            let initiator = r.string(initiator_len)?;
            let target_len = r.u16()? as usize;
            let target = r.string(target_len)?;
            MechToken::Init(InitToken {
                mechs,
                flags,
                lifetime_secs,
                initiator,
                target,
                ephemeral: r.array()?,
                nonce: r.array()?,
                mac: r.array()?,
            })
        },
        Kind::Accept => MechToken::Accept(AcceptToken {
            flags: r.u32()?,
            lifetime_secs: r.u32()?,
            ephemeral: r.array()?,
            proof: r.array()?,
        }),
        Kind::Confirm => MechToken::Confirm(r.array()?),
        Kind::Mic => MechToken::Mic(r.array()?),
        Kind::Wrap => {
            let seq = r.u64()?;
            let len = r.u32()? as usize;
            let payload = Bytes::copy_from_slice(r.slice(len)?);
            MechToken::Wrap(WrapToken {
                seq,
                payload,
                tag: r.array()?,
            })
        },
    };

    r.finish()?;
    Ok(token)
}
