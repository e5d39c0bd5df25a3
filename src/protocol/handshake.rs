//! RTMP handshake implementation
//!
//! The RTMP handshake consists of three phases:
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes) -------------->|
//!   |                                        |
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536 bytes) ---------------|
//!   |<------ S2 (1536 bytes) ---------------|
//!   |                                        |
//!   |------- C2 (1536 bytes: echo S1) ----->|
//!   |                                        |
//!   |          [Handshake Complete]          |
//! ```
//!
//! Two C1 flavors exist. When bytes 4..8 of C1 are zero the peer is a plain
//! encoder and the server answers with simple echoes. When they are nonzero
//! the peer is Flash-derived and expects the digest handshake: C1 and S1
//! carry an HMAC-SHA256 digest at a position derived from the packet bytes,
//! keyed with the partial Adobe key blobs, and S2 is keyed with the digest
//! extracted from C1.
//!
//! The client side always sends a plain C1 and echoes S1 as C2; that is the
//! interop contract this engine's clients rely on.
//!
//! Reference: RTMP Specification Section 5.2

use bytes::{Bytes, BytesMut};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

type HmacSha256 = Hmac<Sha256>;

/// C0+C1 on the wire
pub const REQUEST_SIZE: usize = 1 + HANDSHAKE_SIZE;
/// S0+S1+S2 on the wire
pub const RESPONSE_SIZE: usize = 1 + 2 * HANDSHAKE_SIZE;

/// Version field the server advertises inside a digest-mode S1
const SERVER_VERSION: u32 = 0x0d0e0a0d;

/// Digest length within C1/S1/S2
const DIGEST_SIZE: usize = 32;

static CLIENT_FULL_KEY: [u8; 62] = [
    b'G', b'e', b'n', b'u', b'i', b'n', b'e', b' ', b'A', b'd', b'o', b'b', b'e', b' ', b'F',
    b'l', b'a', b's', b'h', b' ', b'P', b'l', b'a', b'y', b'e', b'r', b' ', b'0', b'0', b'1',
    0xF0, 0xEE, 0xC2, 0x4A, 0x80, 0x68, 0xBE, 0xE8, 0x2E, 0x00, 0xD0, 0xD1, 0x02, 0x9E, 0x7E,
    0x57, 0x6E, 0xEC, 0x5D, 0x2D, 0x29, 0x80, 0x6F, 0xAB, 0x93, 0xB8, 0xE6, 0x36, 0xCF, 0xEB,
    0x31, 0xAE,
];

static SERVER_FULL_KEY: [u8; 68] = [
    b'G', b'e', b'n', b'u', b'i', b'n', b'e', b' ', b'A', b'd', b'o', b'b', b'e', b' ', b'F',
    b'l', b'a', b's', b'h', b' ', b'M', b'e', b'd', b'i', b'a', b' ', b'S', b'e', b'r', b'v',
    b'e', b'r', b' ', b'0', b'0', b'1', 0xF0, 0xEE, 0xC2, 0x4A, 0x80, 0x68, 0xBE, 0xE8, 0x2E,
    0x00, 0xD0, 0xD1, 0x02, 0x9E, 0x7E, 0x57, 0x6E, 0xEC, 0x5D, 0x2D, 0x29, 0x80, 0x6F, 0xAB,
    0x93, 0xB8, 0xE6, 0x36, 0xCF, 0xEB, 0x31, 0xAE,
];

/// Client digests are keyed with the text portion of the client blob
fn client_partial_key() -> &'static [u8] {
    &CLIENT_FULL_KEY[..30]
}

/// Server digests are keyed with the text portion of the server blob
fn server_partial_key() -> &'static [u8] {
    &SERVER_FULL_KEY[..36]
}

/// HMAC-SHA256 over `src`, optionally excising the 32-byte digest slot at
/// `gap` so a packet can be verified against the digest it embeds.
fn make_digest(key: &[u8], src: &[u8], gap: Option<usize>) -> [u8; DIGEST_SIZE] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    match gap {
        Some(gap) => {
            mac.update(&src[..gap]);
            mac.update(&src[gap + DIGEST_SIZE..]);
        }
        None => mac.update(src),
    }
    mac.finalize().into_bytes().into()
}

/// Digest slot position: sum of the 4 bytes at `base`, mod 728, offset past
/// the 4 scheme bytes.
fn digest_pos(p: &[u8], base: usize) -> usize {
    let sum: usize = p[base..base + 4].iter().map(|&b| b as usize).sum();
    (sum % 728) + base + 4
}

/// Locate and verify the digest embedded at `base`'s slot
fn find_digest(p: &[u8], key: &[u8], base: usize) -> Option<usize> {
    let gap = digest_pos(p, base);
    let digest = make_digest(key, p, Some(gap));
    if p[gap..gap + DIGEST_SIZE] == digest {
        Some(gap)
    } else {
        None
    }
}

/// Verify a digest-mode C1/S1 against `peer_key`, trying base 772 first and
/// then base 8. On success, returns the response key derived from the
/// embedded digest: HMAC(key, digest).
fn parse1(p: &[u8], peer_key: &[u8], key: &[u8]) -> Option<[u8; DIGEST_SIZE]> {
    let pos = find_digest(p, peer_key, 772).or_else(|| find_digest(p, peer_key, 8))?;
    Some(make_digest(key, &p[pos..pos + DIGEST_SIZE], None))
}

/// Fill a digest-mode C0+C1 / S0+S1 block: version byte, timestamp, version
/// field, random body, digest at the base-8 slot.
fn create01(p: &mut [u8], time: u32, version: u32, key: &[u8]) {
    p[0] = RTMP_VERSION;
    let p1 = &mut p[1..];
    rand::thread_rng().fill_bytes(&mut p1[8..]);
    p1[0..4].copy_from_slice(&time.to_be_bytes());
    p1[4..8].copy_from_slice(&version.to_be_bytes());
    let gap = digest_pos(p1, 8);
    let digest = make_digest(key, p1, Some(gap));
    p1[gap..gap + DIGEST_SIZE].copy_from_slice(&digest);
}

/// Fill a digest-mode S2: 1504 random bytes plus a trailing HMAC over them
fn create2(p: &mut [u8], key: &[u8]) {
    rand::thread_rng().fill_bytes(p);
    let gap = p.len() - DIGEST_SIZE;
    let digest = make_digest(key, &p[..gap], None);
    p[gap..].copy_from_slice(&digest);
}

/// Build the client's C0+C1.
///
/// A minimal C1: zero timestamp, zero version field (plain flavor), random
/// fill. Servers in digest mode still accept it because a zero version
/// field requests the simple exchange.
pub fn client_request() -> Bytes {
    let mut buf = BytesMut::zeroed(REQUEST_SIZE);
    buf[0] = RTMP_VERSION;
    rand::thread_rng().fill_bytes(&mut buf[9..]);
    buf.freeze()
}

/// Process the server's S0+S1+S2 and build C2.
///
/// S1 is echoed back as C2 regardless of the version the server advertises.
pub fn client_response(s0s1s2: &[u8]) -> Result<Bytes> {
    debug_assert_eq!(s0s1s2.len(), RESPONSE_SIZE);

    let version = s0s1s2[0];
    if version != RTMP_VERSION {
        return Err(HandshakeError::InvalidVersion(version).into());
    }

    let s1 = &s0s1s2[1..1 + HANDSHAKE_SIZE];
    tracing::debug!(
        server_version = ?&s1[4..8],
        "handshake: received S0S1S2"
    );

    Ok(Bytes::copy_from_slice(s1))
}

/// Process the client's C0+C1 and build S0+S1+S2.
///
/// A nonzero C1 version field selects the digest exchange: C1 must carry a
/// valid client digest, S1 carries a server digest, and S2 is keyed with
/// the digest extracted from C1. A zero version field selects the simple
/// exchange, which echoes C1.
pub fn server_response(c0c1: &[u8]) -> Result<Bytes> {
    debug_assert_eq!(c0c1.len(), REQUEST_SIZE);

    let version = c0c1[0];
    if version != RTMP_VERSION {
        return Err(HandshakeError::InvalidVersion(version).into());
    }

    let c1 = &c0c1[1..];
    let client_time = u32::from_be_bytes([c1[0], c1[1], c1[2], c1[3]]);
    let client_version = u32::from_be_bytes([c1[4], c1[5], c1[6], c1[7]]);

    let mut out = BytesMut::zeroed(RESPONSE_SIZE);

    if client_version != 0 {
        tracing::debug!(client_version, "handshake: digest mode");

        let digest = parse1(c1, client_partial_key(), &SERVER_FULL_KEY)
            .ok_or(HandshakeError::DigestMismatch)?;

        let (s0s1, s2) = out.split_at_mut(1 + HANDSHAKE_SIZE);
        create01(s0s1, client_time, SERVER_VERSION, server_partial_key());
        create2(s2, &digest);
    } else {
        tracing::debug!("handshake: simple mode");

        out[0] = RTMP_VERSION;
        out[1..1 + HANDSHAKE_SIZE].copy_from_slice(c1);
        out[1 + HANDSHAKE_SIZE..].copy_from_slice(c1);
    }

    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_request_shape() {
        let c0c1 = client_request();
        assert_eq!(c0c1.len(), REQUEST_SIZE);
        assert_eq!(c0c1[0], RTMP_VERSION);
        // Plain flavor: zero time and version fields
        assert_eq!(&c0c1[1..9], &[0u8; 8]);
    }

    #[test]
    fn test_simple_exchange() {
        let c0c1 = client_request();
        let s0s1s2 = server_response(&c0c1).unwrap();
        assert_eq!(s0s1s2.len(), RESPONSE_SIZE);
        assert_eq!(s0s1s2[0], RTMP_VERSION);
        // Simple mode echoes C1 into both S1 and S2
        assert_eq!(&s0s1s2[1..1 + HANDSHAKE_SIZE], &c0c1[1..]);
        assert_eq!(&s0s1s2[1 + HANDSHAKE_SIZE..], &c0c1[1..]);

        let c2 = client_response(&s0s1s2).unwrap();
        assert_eq!(c2.len(), HANDSHAKE_SIZE);
        // C2 echoes S1
        assert_eq!(&c2[..], &s0s1s2[1..1 + HANDSHAKE_SIZE]);
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut c0c1 = BytesMut::zeroed(REQUEST_SIZE);
        c0c1[0] = 6;
        assert!(server_response(&c0c1).is_err());

        let mut s0s1s2 = BytesMut::zeroed(RESPONSE_SIZE);
        s0s1s2[0] = 0;
        assert!(client_response(&s0s1s2).is_err());
    }

    /// Build a digest-mode C0+C1 the way a Flash-derived client would
    fn flash_client_request() -> BytesMut {
        let mut c0c1 = BytesMut::zeroed(REQUEST_SIZE);
        create01(&mut c0c1, 1000, 0x0a000102, client_partial_key());
        c0c1
    }

    #[test]
    fn test_digest_exchange() {
        let c0c1 = flash_client_request();
        let s0s1s2 = server_response(&c0c1).unwrap();
        assert_eq!(s0s1s2[0], RTMP_VERSION);

        let s1 = &s0s1s2[1..1 + HANDSHAKE_SIZE];
        // S1 carries a verifiable server digest and the server version
        assert_eq!(&s1[4..8], &SERVER_VERSION.to_be_bytes());
        assert!(parse1(s1, server_partial_key(), &CLIENT_FULL_KEY).is_some());

        // S2's trailing digest is keyed with HMAC(server full key, C1 digest)
        let c1 = &c0c1[1..];
        let c1_gap = find_digest(c1, client_partial_key(), 8).unwrap();
        let s2_key = make_digest(&SERVER_FULL_KEY, &c1[c1_gap..c1_gap + 32], None);
        let s2 = &s0s1s2[1 + HANDSHAKE_SIZE..];
        let expected = make_digest(&s2_key, &s2[..HANDSHAKE_SIZE - 32], None);
        assert_eq!(&s2[HANDSHAKE_SIZE - 32..], &expected);
    }

    #[test]
    fn test_digest_verifies_at_either_base() {
        // Base 8 (what create01 emits)
        let mut p = vec![0u8; HANDSHAKE_SIZE];
        rand::thread_rng().fill_bytes(&mut p);
        p[4..8].copy_from_slice(&0x0a000102u32.to_be_bytes());
        let gap = digest_pos(&p, 8);
        let digest = make_digest(client_partial_key(), &p, Some(gap));
        p[gap..gap + 32].copy_from_slice(&digest);
        assert!(parse1(&p, client_partial_key(), &SERVER_FULL_KEY).is_some());

        // Base 772
        let mut p = vec![0u8; HANDSHAKE_SIZE];
        rand::thread_rng().fill_bytes(&mut p);
        p[4..8].copy_from_slice(&0x0a000102u32.to_be_bytes());
        let gap = digest_pos(&p, 772);
        let digest = make_digest(client_partial_key(), &p, Some(gap));
        p[gap..gap + 32].copy_from_slice(&digest);
        assert!(parse1(&p, client_partial_key(), &SERVER_FULL_KEY).is_some());
    }

    #[test]
    fn test_tampered_digest_rejected() {
        let c0c1 = flash_client_request();
        let c1 = &c0c1[1..];
        let gap = find_digest(c1, client_partial_key(), 8).unwrap();

        // Flip one byte inside the digest region
        for offset in [0, 15, 31] {
            let mut bad = c0c1.clone();
            bad[1 + gap + offset] ^= 0x01;
            assert!(
                server_response(&bad).is_err(),
                "tampered digest byte {} accepted",
                offset
            );
        }

        // Flip a byte of the digested body too
        let mut bad = c0c1.clone();
        bad[1 + 100] ^= 0x01;
        assert!(server_response(&bad).is_err());
    }
}
