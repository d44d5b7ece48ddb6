//! Short join codes shown to students on the projector.

use rand::Rng;

pub const SESSION_CODE_LEN: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub fn generate_session_code() -> String {
    generate_session_code_with(&mut rand::thread_rng())
}

pub fn generate_session_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SESSION_CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively; students type them by hand.
pub fn normalize_session_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn codes_are_six_uppercase_alphanumerics() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let code = generate_session_code_with(&mut rng);
            assert_eq!(code.len(), SESSION_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let a = generate_session_code_with(&mut StdRng::seed_from_u64(42));
        let b = generate_session_code_with(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_session_code(" ab12cd "), "AB12CD");
    }
}
