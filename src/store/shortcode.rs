use rand::Rng;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a random short code of `length` characters from `[a-zA-Z0-9]`.
///
/// Uniqueness is the caller's concern; codes are probed against the cache.
pub fn generate(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length() {
        for length in [1, 6, 12] {
            assert_eq!(generate(length).len(), length);
        }
    }

    #[test]
    fn stays_inside_alphabet() {
        let code = generate(64);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn codes_do_not_trivially_repeat() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(generate(8));
        }
        assert_eq!(seen.len(), 100);
    }
}
