/*!
 * Credential decryption for Wireless@SGx
 *
 * The ISP encrypts the userid and password with AES-CCM under a key the
 * client never receives. The key is derived from three things the client
 * can reconstruct: a calendar date, the fixed transaction id, and the
 * OTP the user just typed. The catch is the date: it is the server's
 * date at encryption time, which around midnight (or across a clock
 * mismatch) can differ from ours by a day. So we derive candidate keys
 * for today, tomorrow and yesterday, in that order, and accept the first
 * one that both passes CCM tag verification and decrypts the userid to
 * the cleartext userid the server sent alongside.
 *
 * Key material, as 32 hex digits decoded to a 16-byte AES-128 key:
 *   {day*100+month as %03x} ++ transaction id (24 digits) ++ {otp as %05x}
 */

use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit};
use ccm::consts::{U10, U11, U12, U13, U16, U7, U8, U9};
use ccm::{Ccm, NonceSize};
use chrono::{Datelike, Local, NaiveDate};

use crate::error::{Error, Result};
use crate::protocol::{EncryptedCredentialBundle, TRANSACTION_ID};

/// AES-128-CCM with a 16-byte tag; the nonce length varies with the
/// server-issued iv, so it stays generic.
type CredentialCipher<N> = Ccm<Aes128, U16, N>;

const TAG_LEN: usize = 16;

/// Decrypt a phase-2 credential bundle using the OTP that produced it.
///
/// Returns the (username, password) pair. Fails with a single generic
/// validation error when no candidate date yields a key that verifies,
/// deliberately without saying which part was wrong.
pub fn decrypt_credentials(
    bundle: &EncryptedCredentialBundle,
    otp: &str,
) -> Result<(String, String)> {
    decrypt_with_base_date(bundle, otp, Local::now().date_naive())
}

fn decrypt_with_base_date(
    bundle: &EncryptedCredentialBundle,
    otp: &str,
    base: NaiveDate,
) -> Result<(String, String)> {
    let candidates = [
        base,
        base.succ_opt().unwrap_or(base),
        base.pred_opt().unwrap_or(base),
    ];

    for date in candidates {
        let key = derive_key(date, otp)?;

        let Some(userid) = ccm_open(&key, &bundle.nonce, &bundle.tag_userid, &bundle.enc_userid)
        else {
            continue;
        };
        if userid != bundle.userid {
            continue;
        }

        let Some(password) = ccm_open(
            &key,
            &bundle.nonce,
            &bundle.tag_password,
            &bundle.enc_password,
        ) else {
            continue;
        };

        let username = String::from_utf8(userid)
            .map_err(|_| Error::Validation("Decrypted userid is not valid UTF-8".to_string()))?;
        let password = String::from_utf8(password)
            .map_err(|_| Error::Validation("Decrypted password is not valid UTF-8".to_string()))?;
        return Ok((username, password));
    }

    Err(Error::Validation(
        "Failed to decrypt credentials. Invalid OTP or date mismatch.".to_string(),
    ))
}

/// Derive the 16-byte candidate key for one calendar date.
fn derive_key(date: NaiveDate, otp: &str) -> Result<[u8; 16]> {
    let otp: u32 = otp
        .trim()
        .parse()
        .map_err(|_| Error::Validation("OTP must be numeric".to_string()))?;

    let key_hex = format!(
        "{:03x}{}{:05x}",
        date.day() * 100 + date.month(),
        TRANSACTION_ID,
        otp
    );
    let key = hex::decode(&key_hex)
        .map_err(|_| Error::Validation("Key derivation produced invalid hex".to_string()))?;
    key.as_slice()
        .try_into()
        .map_err(|_| Error::Validation("Derived key is not 16 bytes".to_string()))
}

/// Authenticated decryption with a detached 16-byte tag. CCM fixes the
/// nonce length in the type system, so dispatch over the legal 7..=13
/// byte range at runtime. Returns None on tag mismatch or an unusable
/// nonce/tag length.
fn ccm_open(key: &[u8; 16], nonce: &[u8], tag: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
    match nonce.len() {
        7 => open_with::<U7>(key, nonce, tag, ciphertext),
        8 => open_with::<U8>(key, nonce, tag, ciphertext),
        9 => open_with::<U9>(key, nonce, tag, ciphertext),
        10 => open_with::<U10>(key, nonce, tag, ciphertext),
        11 => open_with::<U11>(key, nonce, tag, ciphertext),
        12 => open_with::<U12>(key, nonce, tag, ciphertext),
        13 => open_with::<U13>(key, nonce, tag, ciphertext),
        _ => None,
    }
}

fn open_with<N: NonceSize + ccm::aead::generic_array::ArrayLength<u8>>(
    key: &[u8; 16],
    nonce: &[u8],
    tag: &[u8],
    ciphertext: &[u8],
) -> Option<Vec<u8>> {
    if tag.len() != TAG_LEN {
        return None;
    }
    let cipher = CredentialCipher::<N>::new(GenericArray::from_slice(key));
    let mut sealed = Vec::with_capacity(ciphertext.len() + tag.len());
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);
    cipher
        .decrypt(GenericArray::from_slice(nonce), sealed.as_slice())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONCE: &[u8] = b"wsgx-nonce1";
    const USERID: &[u8] = b"user1234@wireless.sg";
    const PASSWORD: &[u8] = b"s3cret-pass";

    fn seal(key: &[u8; 16], plaintext: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let cipher = CredentialCipher::<U11>::new(GenericArray::from_slice(key));
        let mut sealed = cipher
            .encrypt(GenericArray::from_slice(NONCE), plaintext)
            .unwrap();
        let tag = sealed.split_off(sealed.len() - TAG_LEN);
        (sealed, tag)
    }

    fn bundle_for(date: NaiveDate, otp: &str) -> EncryptedCredentialBundle {
        let key = derive_key(date, otp).unwrap();
        let (enc_userid, tag_userid) = seal(&key, USERID);
        let (enc_password, tag_password) = seal(&key, PASSWORD);
        EncryptedCredentialBundle {
            userid: USERID.to_vec(),
            enc_userid,
            tag_userid,
            enc_password,
            tag_password,
            nonce: NONCE.to_vec(),
        }
    }

    fn base() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn key_derivation_is_deterministic() {
        // day=5, month=3: 503 -> "1f7"; otp "00042" -> 42 -> "0002a"
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let key = derive_key(date, "00042").unwrap();
        let expected = hex::decode(format!("1f7{TRANSACTION_ID}0002a")).unwrap();
        assert_eq!(key.as_slice(), expected.as_slice());
    }

    #[test]
    fn key_derivation_packs_the_date() {
        // day=15, month=12: 1512 -> "5e8"; the largest OTP still fits 5 digits
        let date = NaiveDate::from_ymd_opt(1999, 12, 15).unwrap();
        let key = derive_key(date, "999999").unwrap();
        let expected = hex::decode(format!("5e8{TRANSACTION_ID}f423f")).unwrap();
        assert_eq!(key.as_slice(), expected.as_slice());
    }

    #[test]
    fn rejects_non_numeric_otp() {
        let err = derive_key(base(), "12a456").unwrap_err();
        assert!(matches!(&err, Error::Validation(msg) if msg.contains("numeric")));
    }

    #[test]
    fn round_trips_for_each_candidate_date_offset() {
        for offset in [0i64, 1, -1] {
            let encryption_date = base() + chrono::Duration::days(offset);
            let bundle = bundle_for(encryption_date, "123456");
            let (username, password) = decrypt_with_base_date(&bundle, "123456", base()).unwrap();
            assert_eq!(username.as_bytes(), USERID, "offset {offset}");
            assert_eq!(password.as_bytes(), PASSWORD, "offset {offset}");
        }
    }

    #[test]
    fn fails_when_date_is_outside_the_tolerance_window() {
        let bundle = bundle_for(base() + chrono::Duration::days(2), "123456");
        let err = decrypt_with_base_date(&bundle, "123456", base()).unwrap_err();
        assert!(
            matches!(&err, Error::Validation(msg) if msg.contains("Invalid OTP or date mismatch"))
        );
    }

    #[test]
    fn fails_with_wrong_otp() {
        let bundle = bundle_for(base(), "123456");
        let err = decrypt_with_base_date(&bundle, "654321", base()).unwrap_err();
        assert!(
            matches!(&err, Error::Validation(msg) if msg.contains("Invalid OTP or date mismatch"))
        );
    }

    #[test]
    fn fails_when_decrypted_userid_does_not_match() {
        let mut bundle = bundle_for(base(), "123456");
        bundle.userid = b"someone-else@wireless.sg".to_vec();
        let err = decrypt_with_base_date(&bundle, "123456", base()).unwrap_err();
        assert!(
            matches!(&err, Error::Validation(msg) if msg.contains("Invalid OTP or date mismatch"))
        );
    }

    #[test]
    fn fails_on_tampered_ciphertext() {
        let mut bundle = bundle_for(base(), "123456");
        bundle.enc_password[0] ^= 0xff;
        let err = decrypt_with_base_date(&bundle, "123456", base()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn fails_on_illegal_nonce_length() {
        let mut bundle = bundle_for(base(), "123456");
        bundle.nonce = b"way-too-long-for-ccm".to_vec();
        assert!(decrypt_with_base_date(&bundle, "123456", base()).is_err());
    }
}
