use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

/// RFC 6347 §4.2.1 bounds DTLSv1 cookies to 255 bytes; the teacher's
/// default (`DTLS1_COOKIE_LENGTH`) is 20, matching the HMAC-SHA1 tag length
/// truncation used here.
pub const DEFAULT_COOKIE_LENGTH: usize = 20;
pub(crate) const DEFAULT_POOL_SIZE: usize = 10;
pub(crate) const DEFAULT_KEY_LIFETIME: Duration = Duration::from_secs(300);

/// A ring of HMAC keys rotated on a timer. `generate` always uses the
/// newest key; `verify` accepts a cookie produced under any still-live key,
/// so a cookie generated just before a rotation still validates on the
/// client's retried ClientHello.
pub struct CookieStore {
    keys: VecDeque<[u8; 32]>,
    pool_size: usize,
    cookie_length: usize,
    key_lifetime: Duration,
    last_rotation: Instant,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_POOL_SIZE, DEFAULT_COOKIE_LENGTH, DEFAULT_KEY_LIFETIME)
    }

    pub fn with_params(pool_size: usize, cookie_length: usize, key_lifetime: Duration) -> Self {
        let mut store = CookieStore {
            keys: VecDeque::with_capacity(pool_size),
            pool_size,
            cookie_length,
            key_lifetime,
            last_rotation: Instant::now(),
        };
        store.keys.push_back(fresh_key());
        store
    }

    pub fn generate(&self, peer: SocketAddr) -> Vec<u8> {
        let key = self.keys.back().expect("cookie store always has one key");
        mac(key, peer, self.cookie_length)
    }

    pub fn verify(&self, peer: SocketAddr, cookie: &[u8]) -> bool {
        self.keys.iter().any(|key| {
            let expected = mac(key, peer, self.cookie_length);
            subtle_eq(&expected, cookie)
        })
    }

    pub fn poll_timeout(&self) -> Instant {
        self.last_rotation + self.key_lifetime
    }

    /// Drops the oldest key and pushes a fresh one; call when `poll_timeout` elapses.
    pub fn rotate(&mut self, now: Instant) {
        self.keys.push_back(fresh_key());
        while self.keys.len() > self.pool_size {
            self.keys.pop_front();
        }
        self.last_rotation = now;
    }
}

impl Default for CookieStore {
    fn default() -> Self {
        Self::new()
    }
}

fn fresh_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::rng().fill_bytes(&mut key);
    key
}

fn mac(key: &[u8], peer: SocketAddr, cookie_length: usize) -> Vec<u8> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("hmac accepts any key length");
    match peer {
        SocketAddr::V4(v4) => {
            mac.update(&v4.ip().octets());
            mac.update(&v4.port().to_be_bytes());
        }
        SocketAddr::V6(v6) => {
            mac.update(&v6.ip().octets());
            mac.update(&v6.port().to_be_bytes());
        }
    }
    let tag = mac.finalize().into_bytes();
    tag[..cookie_length.min(tag.len())].to_vec()
}

fn subtle_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_cookie_verifies() {
        let store = CookieStore::new();
        let peer: SocketAddr = "203.0.113.1:9".parse().unwrap();
        let cookie = store.generate(peer);
        assert_eq!(cookie.len(), DEFAULT_COOKIE_LENGTH);
        assert!(store.verify(peer, &cookie));
    }

    #[test]
    fn rotation_keeps_old_cookie_valid() {
        let mut store = CookieStore::new();
        let peer: SocketAddr = "203.0.113.1:9".parse().unwrap();
        let cookie = store.generate(peer);
        store.rotate(Instant::now());
        assert!(store.verify(peer, &cookie));
    }

    #[test]
    fn mismatched_peer_fails() {
        let store = CookieStore::new();
        let cookie = store.generate("203.0.113.1:9".parse().unwrap());
        assert!(!store.verify("203.0.113.2:9".parse().unwrap(), &cookie));
    }
}
