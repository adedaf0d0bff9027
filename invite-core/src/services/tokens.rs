use rand::Rng;

/// Random bytes behind each generated token.
pub const TOKEN_BYTES: usize = 20;

/// Generate an invitation token from the thread-local CSPRNG: 160 random
/// bits, lowercase hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}
