use md5::{Digest, Md5};

/// Lowercase hex MD5 of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(md5_raw(data))
}

/// Raw 16-byte MD5 of `data`.
pub fn md5_raw(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

/// Session digest over the four signing inputs, in this exact order.
pub fn session_digest(
    session_id: &str,
    request_checksum: &[u8],
    request_id: &str,
    shared_secret: &str,
) -> String {
    let mut hasher = Md5::new();
    hasher.update(session_id.as_bytes());
    hasher.update(request_checksum);
    hasher.update(request_id.as_bytes());
    hasher.update(shared_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_known_vectors() {
        assert_eq!(md5_hex(b"data"), "8d777f385d3dfec8815d20f7496026dc");
        assert_eq!(
            md5_raw(b"data").to_vec(),
            hex::decode("8d777f385d3dfec8815d20f7496026dc").unwrap()
        );
    }

    #[test]
    fn session_digest_known_vector() {
        assert_eq!(
            session_digest("SESSION-ID", b"REQUEST_CHECKSUM", "REQUEST-ID", "SECRET"),
            "af7b0121fe12199cdb5d765b73bd7cb5"
        );
    }

    #[test]
    fn session_digest_is_deterministic() {
        let a = session_digest("S", b"C", "R", "K");
        let b = session_digest("S", b"C", "R", "K");
        assert_eq!(a, b);
    }

    #[test]
    fn session_digest_changes_with_every_input() {
        let base = session_digest("S", b"C", "R", "K");
        assert_ne!(base, session_digest("S2", b"C", "R", "K"));
        assert_ne!(base, session_digest("S", b"C2", "R", "K"));
        assert_ne!(base, session_digest("S", b"C", "R2", "K"));
        assert_ne!(base, session_digest("S", b"C", "R", "K2"));
    }
}
