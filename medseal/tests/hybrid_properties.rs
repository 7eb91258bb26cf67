//! Property tests for the envelope cipher.

use proptest::prelude::*;

use medseal::client::crypto::seal_bytes_for_server;
use medseal::server::cipher::{decrypt_envelope, encrypt_with_public_key, encrypt_with_session_key, open_wrapped, SessionKey, IV_LEN, KEY_LEN};
use medseal::server::keystore::KeyStore;
use medseal::ServerError;

const WEAK_PUBLIC_KEY: &str = include_str!("fixtures/weak_public_1024.pem");

fn server_keys() -> KeyStore {
    let keys = KeyStore::new();
    let secret = serde_json::json!({ "PKCS": include_str!("fixtures/server_key_pkcs8.pem") });
    keys.load(&secret.to_string()).unwrap();
    keys
}

proptest! {
    #[test]
    fn decrypt_inverts_encrypt(
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        key in any::<[u8; KEY_LEN]>(),
        iv in any::<[u8; IV_LEN]>(),
    ) {
        let session = SessionKey::from_parts(key, iv);
        let ciphertext = encrypt_with_session_key(&plaintext, &session);
        prop_assert_eq!(ciphertext.len() % 16, 0);
        prop_assert!(ciphertext.len() > plaintext.len());

        let decrypted = decrypt_envelope(&ciphertext, &key, &iv).unwrap();
        prop_assert_eq!(&decrypted[..], &plaintext[..]);
    }

    #[test]
    fn bad_key_or_iv_length_never_reaches_the_cipher(
        key in prop::collection::vec(any::<u8>(), 0..64),
        iv in prop::collection::vec(any::<u8>(), 0..32),
        ciphertext in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        prop_assume!(key.len() != KEY_LEN || iv.len() != IV_LEN);
        prop_assert_eq!(
            decrypt_envelope(&ciphertext, &key, &iv),
            Err(ServerError::InvalidKeyMaterial { key_len: key.len(), iv_len: iv.len() })
        );
    }

    #[test]
    fn tampered_ciphertext_never_panics(
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        flip_at in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let session = SessionKey::generate();
        let mut ciphertext = encrypt_with_session_key(&plaintext, &session);
        let i = flip_at.index(ciphertext.len());
        ciphertext[i] ^= mask;

        match decrypt_envelope(&ciphertext, session.key(), session.iv()) {
            Ok(decrypted) => prop_assert_ne!(&decrypted[..], &plaintext[..]),
            Err(e) => prop_assert_eq!(e, ServerError::CipherIntegrity),
        }
    }
}

#[test]
fn weak_public_key_is_refused() {
    assert_eq!(
        encrypt_with_public_key(&[0u8; KEY_LEN], WEAK_PUBLIC_KEY),
        Err(ServerError::WeakKey { bits: 1024 })
    );
}

#[test]
fn strong_public_key_is_accepted() {
    let keys = server_keys();
    let wrapped = encrypt_with_public_key(&[7u8; KEY_LEN], keys.public_key_pem().unwrap()).unwrap();
    assert_eq!(wrapped.len(), keys.modulus_bits().unwrap() / 8);
}

#[test]
fn wrapped_envelope_round_trips_through_the_key_store() {
    let keys = server_keys();
    let pem = keys.public_key_pem().unwrap();
    for plaintext in [&b""[..], &b"{}"[..], &[0xABu8; 4096][..]] {
        let envelope = seal_bytes_for_server(plaintext, pem).unwrap();
        assert_eq!(&open_wrapped(&keys, &envelope).unwrap()[..], plaintext);
    }
}
