//! Length-prefix framing over buffers.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::TransportError;

/// Size in bytes of the big-endian length header
pub const LENGTH_PREFIX_SIZE: usize = std::mem::size_of::<u32>();

/// Encode one token as a frame.
///
/// Fails when the token does not fit the 32-bit length header.
pub fn encode_frame(token: &[u8]) -> Result<Bytes, TransportError> {
    let len = u32::try_from(token.len()).map_err(|_| TransportError::TokenTooLarge {
        len: token.len(),
        max: u32::MAX as usize,
    })?;
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + token.len());
    buf.put_u32(len);
    buf.put_slice(token);
    Ok(buf.freeze())
}

/// Incremental frame decoder.
///
/// Feed received bytes into a `BytesMut` and call [`decode`](Self::decode)
/// until it returns `None`.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_len: usize,
}

impl FrameDecoder {
    /// Decoder rejecting tokens longer than `max_len`.
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// Largest accepted token.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Check an announced length against the limit.
    pub fn check_len(&self, len: usize) -> Result<(), TransportError> {
        if len > self.max_len {
            Err(TransportError::TokenTooLarge {
                len,
                max: self.max_len,
            })
        } else {
            Ok(())
        }
    }

    /// Split the next complete token off `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Oversized frames are
    /// rejected as soon as the header is available.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, TransportError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let mut header = [0u8; LENGTH_PREFIX_SIZE];
        header.copy_from_slice(&buf[..LENGTH_PREFIX_SIZE]);
        let len = u32::from_be_bytes(header) as usize;
        self.check_len(len)?;

        if buf.len() < LENGTH_PREFIX_SIZE + len {
            buf.reserve(LENGTH_PREFIX_SIZE + len - buf.len());
            return Ok(None);
        }
        buf.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(buf.split_to(len).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use proptest::prelude::*;

    #[test]
    fn test_encode_layout() {
        let frame = encode_frame(b"abc").unwrap();
        assert_eq!(&frame[..], &hex!("00000003 616263"));
        assert_eq!(&encode_frame(b"").unwrap()[..], &hex!("00000000"));
    }

    #[test]
    fn test_decode_partial_then_complete() {
        let decoder = FrameDecoder::new(1024);
        let mut buf = BytesMut::from(&hex!("00000005 6865")[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"llo");
        buf.extend_from_slice(&hex!("00000000"));
        assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap()[..], b"hello");
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap().len(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversize_rejected_before_body() {
        let decoder = FrameDecoder::new(16);
        let mut buf = BytesMut::from(&hex!("00000011")[..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(TransportError::TokenTooLarge { len: 17, max: 16 })
        ));
    }

    #[test]
    fn test_roundtrip_sizes() {
        let decoder = FrameDecoder::new(1 << 20);
        for n in [0usize, 1, 65536] {
            let token = vec![0xa5; n];
            let mut buf = BytesMut::from(&encode_frame(&token).unwrap()[..]);
            assert_eq!(buf.len(), LENGTH_PREFIX_SIZE + n);
            assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), token);
        }
    }

    proptest! {
        #[test]
        fn prop_split_stream_decodes(tokens in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 1..8), cut in 0usize..64) {
            let decoder = FrameDecoder::new(1024);
            let mut wire = Vec::new();
            for t in &tokens {
                wire.extend_from_slice(&encode_frame(t).unwrap());
            }

            let cut = cut.min(wire.len());
            let mut buf = BytesMut::from(&wire[..cut]);
            let mut out = Vec::new();
            while let Some(t) = decoder.decode(&mut buf).unwrap() {
                out.push(t.to_vec());
            }
            buf.extend_from_slice(&wire[cut..]);
            while let Some(t) = decoder.decode(&mut buf).unwrap() {
                out.push(t.to_vec());
            }
            prop_assert_eq!(out, tokens);
        }
    }
}
