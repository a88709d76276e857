//! WhatsApp media encryption primitives.
//!
//! Each attachment carries a 32-byte media key. HKDF-SHA256 (all-zero salt,
//! media-type info string) expands it to 112 bytes:
//!
//! | bytes  | use         |
//! |--------|-------------|
//! | 0..16  | AES-CBC IV  |
//! | 16..48 | AES-256 key |
//! | 48..80 | HMAC key    |
//!
//! The encrypted blob is `ciphertext ‖ mac[..10]`.

use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tally_core::error::TallyError;

/// Length of the MAC tag appended to every encrypted blob.
pub const MAC_TAG_LEN: usize = 10;

const BLOCK_SIZE: usize = 16;
const MEDIA_KEY_LEN: usize = 32;
const EXPANDED_LEN: usize = 112;
const HKDF_SALT: [u8; 32] = [0u8; 32];

/// Media type, selecting the HKDF info string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    /// HKDF info label.
    pub fn info(&self) -> &'static [u8] {
        match self {
            Self::Image => b"WhatsApp Image Keys",
            Self::Video => b"WhatsApp Video Keys",
            Self::Audio => b"WhatsApp Audio Keys",
            Self::Document => b"WhatsApp Document Keys",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }
}

/// Keys derived from a media key.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaKeys {
    pub iv: [u8; 16],
    pub cipher_key: [u8; 32],
    pub mac_key: [u8; 32],
}

impl std::fmt::Debug for MediaKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaKeys").finish_non_exhaustive()
    }
}

/// Derive IV, cipher key and MAC key from a 32-byte media key.
pub fn derive_keys(media_key: &[u8], kind: MediaKind) -> Result<MediaKeys, TallyError> {
    derive_keys_with(media_key, &HKDF_SALT, kind.info())
}

pub(crate) fn derive_keys_with(
    media_key: &[u8],
    salt: &[u8],
    info: &[u8],
) -> Result<MediaKeys, TallyError> {
    if media_key.len() != MEDIA_KEY_LEN {
        return Err(TallyError::Decryption(format!(
            "media key must be {MEDIA_KEY_LEN} bytes, got {}",
            media_key.len()
        )));
    }

    let hk = Hkdf::<Sha256>::new(Some(salt), media_key);
    let mut okm = [0u8; EXPANDED_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| TallyError::Decryption(format!("hkdf expand failed: {e}")))?;

    let mut keys = MediaKeys {
        iv: [0u8; 16],
        cipher_key: [0u8; 32],
        mac_key: [0u8; 32],
    };
    keys.iv.copy_from_slice(&okm[0..16]);
    keys.cipher_key.copy_from_slice(&okm[16..48]);
    keys.mac_key.copy_from_slice(&okm[48..80]);
    Ok(keys)
}

/// Decrypt an encrypted media blob. The trailing MAC tag is discarded, not checked.
pub fn decrypt(blob: &[u8], media_key: &[u8], kind: MediaKind) -> Result<Vec<u8>, TallyError> {
    let keys = derive_keys(media_key, kind)?;
    decrypt_with_keys(blob, &keys)
}

/// AES-256-CBC decrypt `blob` minus its MAC tag.
///
/// Padding is stripped by trusting the last byte without checking the pad
/// bytes, so a wrong key yields garbage rather than an error.
pub fn decrypt_with_keys(blob: &[u8], keys: &MediaKeys) -> Result<Vec<u8>, TallyError> {
    let ciphertext = split_ciphertext(blob)?;

    let decryptor = cbc::Decryptor::<Aes256>::new_from_slices(&keys.cipher_key, &keys.iv)
        .map_err(|e| TallyError::Decryption(format!("cipher init failed: {e}")))?;
    let mut plain = decryptor
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|e| TallyError::Decryption(format!("aes-cbc failed: {e}")))?;

    strip_padding(&mut plain);
    Ok(plain)
}

/// Check the truncated HMAC-SHA256 tag over `iv ‖ ciphertext`.
pub fn verify_mac(blob: &[u8], keys: &MediaKeys) -> Result<(), TallyError> {
    let ciphertext = split_ciphertext(blob)?;
    let tag = &blob[blob.len() - MAC_TAG_LEN..];

    let mut mac = Hmac::<Sha256>::new_from_slice(&keys.mac_key)
        .map_err(|e| TallyError::Decryption(format!("hmac init failed: {e}")))?;
    mac.update(&keys.iv);
    mac.update(ciphertext);
    mac.verify_truncated_left(tag)
        .map_err(|_| TallyError::Decryption("media MAC mismatch".into()))
}

fn split_ciphertext(blob: &[u8]) -> Result<&[u8], TallyError> {
    if blob.len() <= MAC_TAG_LEN {
        return Err(TallyError::Decryption(format!(
            "blob too short: {} bytes",
            blob.len()
        )));
    }
    let ciphertext = &blob[..blob.len() - MAC_TAG_LEN];
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(TallyError::Decryption(format!(
            "ciphertext length {} is not a multiple of {BLOCK_SIZE}",
            ciphertext.len()
        )));
    }
    Ok(ciphertext)
}

fn strip_padding(plain: &mut Vec<u8>) {
    if let Some(&last) = plain.last() {
        let pad = last as usize;
        if (1..=BLOCK_SIZE).contains(&pad) && pad <= plain.len() {
            plain.truncate(plain.len() - pad);
        }
    }
}

/// Encrypt the way the platform does. Test fixture only.
#[cfg(test)]
pub(crate) fn encrypt_for_test(plain: &[u8], keys: &MediaKeys) -> Vec<u8> {
    use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut};

    let encryptor = cbc::Encryptor::<Aes256>::new_from_slices(&keys.cipher_key, &keys.iv).unwrap();
    let mut blob = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plain);

    let mut mac = Hmac::<Sha256>::new_from_slice(&keys.mac_key).unwrap();
    mac.update(&keys.iv);
    mac.update(&blob);
    let tag = mac.finalize().into_bytes();
    blob.extend_from_slice(&tag[..MAC_TAG_LEN]);
    blob
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDIA_KEY: [u8; 32] = [
        0x4b, 0x1f, 0x93, 0x0e, 0x22, 0x7a, 0xc5, 0x61, 0x08, 0xd4, 0x3e, 0x9b, 0x50, 0xaa, 0x17,
        0xe2, 0x6c, 0x81, 0x0f, 0x3d, 0xb9, 0x44, 0x2a, 0xf7, 0x95, 0x13, 0x6e, 0xc0, 0x58, 0x21,
        0xdd, 0x07,
    ];

    #[test]
    fn test_derive_keys_matches_raw_hkdf_layout() {
        let keys = derive_keys(&MEDIA_KEY, MediaKind::Audio).unwrap();

        let hk = Hkdf::<Sha256>::new(Some(&[0u8; 32]), &MEDIA_KEY);
        let mut okm = [0u8; 112];
        hk.expand(b"WhatsApp Audio Keys", &mut okm).unwrap();

        assert_eq!(keys.iv[..], okm[0..16]);
        assert_eq!(keys.cipher_key[..], okm[16..48]);
        assert_eq!(keys.mac_key[..], okm[48..80]);
    }

    #[test]
    fn test_info_strings_produce_distinct_keys() {
        let audio = derive_keys(&MEDIA_KEY, MediaKind::Audio).unwrap();
        let image = derive_keys(&MEDIA_KEY, MediaKind::Image).unwrap();
        assert_ne!(audio.cipher_key, image.cipher_key);
        assert_ne!(audio.iv, image.iv);
        assert_eq!(MediaKind::Image.info(), b"WhatsApp Image Keys");
        assert_eq!(MediaKind::Document.info(), b"WhatsApp Document Keys");
    }

    #[test]
    fn test_round_trip_recovers_plaintext() {
        let plain = b"OggS\x00\x02 fake opus voice note payload, 50 reais no almoco";
        let keys = derive_keys(&MEDIA_KEY, MediaKind::Audio).unwrap();
        let blob = encrypt_for_test(plain, &keys);

        let decrypted = decrypt(&blob, &MEDIA_KEY, MediaKind::Audio).unwrap();
        assert_eq!(decrypted, plain);
        assert!(verify_mac(&blob, &keys).is_ok());
    }

    #[test]
    fn test_round_trip_block_aligned_plaintext() {
        let plain = [0xabu8; 32];
        let keys = derive_keys(&MEDIA_KEY, MediaKind::Image).unwrap();
        let blob = encrypt_for_test(&plain, &keys);
        assert_eq!(blob.len(), 48 + MAC_TAG_LEN, "full padding block added");
        assert_eq!(decrypt(&blob, &MEDIA_KEY, MediaKind::Image).unwrap(), plain);
    }

    #[test]
    fn test_wrong_info_string_gives_garbage_not_error() {
        let plain = b"receipt image bytes that should not survive a wrong key";
        let keys = derive_keys(&MEDIA_KEY, MediaKind::Image).unwrap();
        let blob = encrypt_for_test(plain, &keys);

        let garbage = decrypt(&blob, &MEDIA_KEY, MediaKind::Audio).unwrap();
        assert_ne!(garbage.as_slice(), plain.as_slice());
    }

    #[test]
    fn test_wrong_salt_gives_garbage_not_error() {
        let plain = b"another payload of reasonable length for the test";
        let keys = derive_keys(&MEDIA_KEY, MediaKind::Audio).unwrap();
        let blob = encrypt_for_test(plain, &keys);

        let wrong = derive_keys_with(&MEDIA_KEY, &[0u8; 16], MediaKind::Audio.info()).unwrap();
        let garbage = decrypt_with_keys(&blob, &wrong).unwrap();
        assert_ne!(garbage.as_slice(), plain.as_slice());
        assert!(verify_mac(&blob, &wrong).is_err());
    }

    #[test]
    fn test_tampered_blob_fails_mac_but_still_decrypts() {
        let plain = b"tamper me please, sixteen+ bytes";
        let keys = derive_keys(&MEDIA_KEY, MediaKind::Audio).unwrap();
        let mut blob = encrypt_for_test(plain, &keys);
        blob[0] ^= 0xff;

        assert!(verify_mac(&blob, &keys).is_err());
        assert!(decrypt_with_keys(&blob, &keys).is_ok());
    }

    #[test]
    fn test_misaligned_length_is_error() {
        let blob = vec![0u8; 16 + MAC_TAG_LEN + 3];
        let err = decrypt(&blob, &MEDIA_KEY, MediaKind::Audio).unwrap_err();
        assert!(matches!(err, TallyError::Decryption(_)));
    }

    #[test]
    fn test_short_blob_is_error() {
        let err = decrypt(&[1u8; MAC_TAG_LEN], &MEDIA_KEY, MediaKind::Audio).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_bad_key_length_is_error() {
        let err = derive_keys(&[0u8; 31], MediaKind::Image).unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }
}
