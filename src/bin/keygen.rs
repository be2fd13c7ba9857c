// =============================================================================
// keygen — generate an Ed25519 keypair for the signed crypto venue
// =============================================================================
//
// Prints the base64-encoded seed (private key material — store it in the
// environment, never commit it) and the base64-encoded public key, with a
// one-line usage hint. Exits 0 on success.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

fn main() {
    let mut csprng = OsRng;
    let signing_key = SigningKey::generate(&mut csprng);
    let verifying_key = signing_key.verifying_key();

    let seed_b64 = BASE64.encode(signing_key.to_bytes());
    let pubkey_b64 = BASE64.encode(verifying_key.to_bytes());

    println!("Ed25519 keypair generated.");
    println!();
    println!("  private seed (base64): {seed_b64}");
    println!("  public key   (base64): {pubkey_b64}");
    println!();
    println!("Set CRYPTO_API_SEED to the private seed and register the public");
    println!("key with the venue. Never commit or log the private seed.");
}
