/*!
 * Wireless@SGx registration protocol client
 *
 * Implements the two-phase ESSA exchange:
 * 1. `request_registration` asks the ISP to SMS an OTP to the mobile
 *    number and returns an opaque success code.
 * 2. `validate_otp` echoes the success code together with the OTP and
 *    returns the encrypted credential bundle.
 *
 * Both phases are plain GETs with query parameters against the ISP's
 * endpoint. Responses share one envelope: `status.resultcode` (1100 on
 * success), the echoed `api` name and protocol `version`, and a `body`
 * object carrying the phase-specific fields.
 */

use std::time::Duration;

use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::isp::{Isp, IspProfile};

/// Transaction id shared by all ISPs, sent verbatim as `tid` and folded
/// into the credential decryption key. 24 hex digits, so the derived AES
/// key (3 date digits + tid + 5 OTP digits) is exactly 16 bytes.
pub const TRANSACTION_ID: &str = "053786654500000000000000";

/// The single success result code of the ESSA API.
pub const RC_SUCCESS: i64 = 1100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// (request phase, validate phase) API names for new registrations.
const CREATE_APIS: (&str, &str) = ("create_user_r12x1a", "create_user_r12x1b");
/// (request phase, validate phase) API names for account retrieval.
const RETRIEVE_APIS: (&str, &str) = ("retrieve_user_r12x2a", "retrieve_user_r12x2b");

/// Personal fields sent with a phase-1 request. The server insists on
/// receiving them but only the mobile number and date of birth matter,
/// so the defaults are deliberately non-identifying.
#[derive(Debug, Clone)]
pub struct RegistrantIdentity {
    pub salutation: String,
    pub name: String,
    pub gender: String,
    pub nationality: String,
    pub email: String,
}

impl Default for RegistrantIdentity {
    fn default() -> Self {
        Self {
            salutation: "Mr".to_string(),
            name: "Some Person".to_string(),
            gender: "m".to_string(),
            nationality: "SG".to_string(),
            email: "nonexistent@noaddresshere.com".to_string(),
        }
    }
}

/// Output of phase 2: the cleartext userid (used as an integrity check
/// during decryption) plus the encrypted fields, hex-decoded to raw
/// bytes, and the nonce carried as the raw bytes of the `iv` field.
#[derive(Debug, Clone)]
pub struct EncryptedCredentialBundle {
    pub userid: Vec<u8>,
    pub enc_userid: Vec<u8>,
    pub tag_userid: Vec<u8>,
    pub enc_password: Vec<u8>,
    pub tag_password: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Response envelope shared by both phases. Every leaf is optional so a
/// malformed response parses and fails validation with the name of the
/// missing key instead of a deserialization error.
#[derive(Debug, Deserialize)]
struct EssaResponse {
    status: Option<ResponseStatus>,
    api: Option<String>,
    version: Option<String>,
    body: Option<ResponseBody>,
}

#[derive(Debug, Deserialize)]
struct ResponseStatus {
    resultcode: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseBody {
    message: Option<String>,
    success_code: Option<String>,
    userid: Option<String>,
    enc_userid: Option<String>,
    tag_userid: Option<String>,
    enc_password: Option<String>,
    tag_password: Option<String>,
    iv: Option<String>,
}

/// Client for one registration or retrieval attempt against a single ISP.
///
/// Stateless between calls; each phase is a single blocking request with
/// a 30 second timeout and no automatic retry. Resending an OTP is the
/// caller repeating `request_registration`.
pub struct RegistrationClient {
    http: reqwest::Client,
    profile: &'static IspProfile,
    endpoint: String,
    isp: Isp,
}

impl RegistrationClient {
    pub fn new(isp: Isp) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            profile: isp.profile(),
            endpoint: isp.profile().essa_url.to_string(),
            isp,
        })
    }

    /// Point the client at a different endpoint (staging, tests).
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    pub fn isp(&self) -> Isp {
        self.isp
    }

    /// Phase 1: request registration (or retrieval) and return the
    /// success code that must be echoed in phase 2. The server sends the
    /// OTP to `mobile` out-of-band.
    pub async fn request_registration(
        &self,
        mobile: &str,
        dob: &str,
        identity: &RegistrantIdentity,
        retrieve_mode: bool,
    ) -> Result<String> {
        let (api, version) = if retrieve_mode {
            (RETRIEVE_APIS.0, self.profile.retrieve_api_versions.0)
        } else {
            (CREATE_APIS.0, self.profile.create_api_versions.0)
        };

        let params = [
            ("api", api),
            ("api_password", self.profile.api_password),
            ("salutation", identity.salutation.as_str()),
            ("name", identity.name.as_str()),
            ("gender", identity.gender.as_str()),
            ("dob", dob),
            ("mobile", mobile),
            ("nationality", identity.nationality.as_str()),
            ("email", identity.email.as_str()),
            ("tid", TRANSACTION_ID),
        ];
        debug!(
            "requesting {api} v{version} from {} for mobile={mobile} dob={dob}",
            self.endpoint
        );

        let resp = self.get_json(&params).await?;
        parse_phase1(&resp, api, version)
    }

    /// Phase 2: validate the OTP and return the encrypted credential
    /// bundle. `success_code` is the value returned by phase 1.
    pub async fn validate_otp(
        &self,
        mobile: &str,
        dob: &str,
        otp: &str,
        success_code: &str,
        retrieve_mode: bool,
    ) -> Result<EncryptedCredentialBundle> {
        let (api, version) = if retrieve_mode {
            (RETRIEVE_APIS.1, self.profile.retrieve_api_versions.1)
        } else {
            (CREATE_APIS.1, self.profile.create_api_versions.1)
        };

        let params = [
            ("api", api),
            ("api_password", self.profile.api_password),
            ("dob", dob),
            ("mobile", mobile),
            ("otp", otp),
            ("success_code", success_code),
            ("tid", TRANSACTION_ID),
        ];
        debug!("validating OTP via {api} v{version}");

        let resp = self.get_json(&params).await?;
        parse_phase2(&resp, api, version)
    }

    async fn get_json(&self, params: &[(&str, &str)]) -> Result<EssaResponse> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        debug!("server response: {text}");
        serde_json::from_str(&text)
            .map_err(|_| Error::Validation("Invalid JSON response from server".to_string()))
    }
}

fn parse_phase1(resp: &EssaResponse, api: &str, version: &str) -> Result<String> {
    let body = check_envelope(resp, api, version)?;
    Ok(require(&body.success_code, "success_code")?.to_string())
}

fn parse_phase2(resp: &EssaResponse, api: &str, version: &str) -> Result<EncryptedCredentialBundle> {
    let body = check_envelope(resp, api, version)?;

    let userid = require(&body.userid, "userid")?;
    let enc_userid = require(&body.enc_userid, "enc_userid")?;
    let tag_userid = require(&body.tag_userid, "tag_userid")?;
    let enc_password = require(&body.enc_password, "enc_password")?;
    let tag_password = require(&body.tag_password, "tag_password")?;
    let iv = require(&body.iv, "iv")?;

    Ok(EncryptedCredentialBundle {
        userid: userid.as_bytes().to_vec(),
        enc_userid: decode_hex_field(enc_userid, "enc_userid")?,
        tag_userid: decode_hex_field(tag_userid, "tag_userid")?,
        enc_password: decode_hex_field(enc_password, "enc_password")?,
        tag_password: decode_hex_field(tag_password, "tag_password")?,
        nonce: iv.as_bytes().to_vec(),
    })
}

/// Envelope checks, in order: result status exists and is the success
/// code, the `api` and `version` echoes match, and a `body` is present.
fn check_envelope<'a>(resp: &'a EssaResponse, api: &str, version: &str) -> Result<&'a ResponseBody> {
    check_for_error(resp)?;
    expect_value("api", resp.api.as_deref(), api)?;
    expect_value("version", resp.version.as_deref(), version)?;
    resp.body.as_ref().ok_or_else(|| missing("body"))
}

fn check_for_error(resp: &EssaResponse) -> Result<()> {
    let status = resp.status.as_ref().ok_or_else(|| missing("status"))?;
    let code = status
        .resultcode
        .as_ref()
        .ok_or_else(|| missing("status.resultcode"))?;
    let code = parse_resultcode(code)?;

    if code != RC_SUCCESS {
        let message = resp
            .body
            .as_ref()
            .and_then(|body| body.message.clone())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(Error::Server { code, message });
    }
    Ok(())
}

/// The backend is inconsistent about whether `resultcode` is a JSON
/// number or a numeric string; accept both.
fn parse_resultcode(value: &Value) -> Result<i64> {
    let code = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    code.ok_or_else(|| Error::Validation("status.resultcode is not numeric".to_string()))
}

fn expect_value(key: &str, actual: Option<&str>, expected: &str) -> Result<()> {
    match actual {
        None => Err(missing(key)),
        Some(value) if value == expected => Ok(()),
        Some(value) => Err(Error::Validation(format!(
            "Unexpected value for {key}: {value} != {expected}"
        ))),
    }
}

fn require<'a>(field: &'a Option<String>, key: &str) -> Result<&'a str> {
    field.as_deref().ok_or_else(|| missing(key))
}

fn missing(key: &str) -> Error {
    Error::Validation(format!("Server response missing key: {key}"))
}

fn decode_hex_field(value: &str, key: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|_| Error::Validation(format!("Field {key} is not valid hex")))
}

/// Normalize a Singapore mobile number: an 8-digit local number gets the
/// 65 country prefix, a 10-digit 65-prefixed number passes through.
pub fn normalize_mobile(mobile: &str) -> Result<String> {
    let digits = mobile.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Validation(
            "Mobile number must contain digits only".to_string(),
        ));
    }
    match digits.len() {
        8 => Ok(format!("65{digits}")),
        10 if digits.starts_with("65") => Ok(digits.to_string()),
        _ => Err(Error::Validation(
            "Mobile number must be a Singapore number (65XXXXXXXX)".to_string(),
        )),
    }
}

/// Date of birth must be 8 digits, DDMMYYYY.
pub fn validate_dob(dob: &str) -> Result<()> {
    let valid = dob.len() == 8
        && dob.bytes().all(|b| b.is_ascii_digit())
        && (1..=31).contains(&dob[0..2].parse::<u32>().unwrap_or(0))
        && (1..=12).contains(&dob[2..4].parse::<u32>().unwrap_or(0))
        && (1900..=2099).contains(&dob[4..8].parse::<u32>().unwrap_or(0));
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(
            "Date of birth must be DDMMYYYY".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> EssaResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn missing_resultcode_is_named() {
        let resp = response(json!({ "status": {}, "api": "create_user_r12x1a" }));
        let err = check_for_error(&resp).unwrap_err();
        assert!(matches!(&err, Error::Validation(msg) if msg.contains("status.resultcode")));
    }

    #[test]
    fn missing_status_is_named() {
        let resp = response(json!({ "api": "create_user_r12x1a" }));
        let err = check_for_error(&resp).unwrap_err();
        assert!(matches!(&err, Error::Validation(msg) if msg.contains("status")));
    }

    #[test]
    fn non_success_code_becomes_server_error() {
        let resp = response(json!({
            "status": { "resultcode": 1340 },
            "body": { "message": "OTP expired" }
        }));
        match check_for_error(&resp).unwrap_err() {
            Error::Server { code, message } => {
                assert_eq!(code, 1340);
                assert_eq!(message, "OTP expired");
            }
            other => panic!("expected Server error, got {other:?}"),
        }
    }

    #[test]
    fn resultcode_accepts_numeric_strings() {
        let resp = response(json!({
            "status": { "resultcode": "1100" },
            "api": "create_user_r12x1a",
            "version": "2.6",
            "body": { "success_code": "ABC123" }
        }));
        let code = parse_phase1(&resp, "create_user_r12x1a", "2.6").unwrap();
        assert_eq!(code, "ABC123");
    }

    #[test]
    fn phase1_missing_success_code_is_named() {
        let resp = response(json!({
            "status": { "resultcode": 1100 },
            "api": "create_user_r12x1a",
            "version": "2.6",
            "body": {}
        }));
        let err = parse_phase1(&resp, "create_user_r12x1a", "2.6").unwrap_err();
        assert!(matches!(&err, Error::Validation(msg) if msg.contains("success_code")));
    }

    #[test]
    fn mismatched_version_echo_is_rejected() {
        let resp = response(json!({
            "status": { "resultcode": 1100 },
            "api": "create_user_r12x1a",
            "version": "2.0",
            "body": { "success_code": "ABC123" }
        }));
        let err = parse_phase1(&resp, "create_user_r12x1a", "2.6").unwrap_err();
        assert!(matches!(&err, Error::Validation(msg) if msg.contains("version")));
    }

    #[test]
    fn phase2_decodes_hex_fields_and_keeps_raw_nonce() {
        let resp = response(json!({
            "status": { "resultcode": 1100 },
            "api": "create_user_r12x1b",
            "version": "2.8",
            "body": {
                "userid": "user@wsg.sg",
                "enc_userid": "deadbeef",
                "tag_userid": "00112233445566778899aabbccddeeff",
                "enc_password": "cafe",
                "tag_password": "ffeeddccbbaa99887766554433221100",
                "iv": "abcdefghijk"
            }
        }));
        let bundle = parse_phase2(&resp, "create_user_r12x1b", "2.8").unwrap();
        assert_eq!(bundle.userid, b"user@wsg.sg");
        assert_eq!(bundle.enc_userid, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(bundle.enc_password, vec![0xca, 0xfe]);
        assert_eq!(bundle.tag_userid.len(), 16);
        assert_eq!(bundle.nonce, b"abcdefghijk");
    }

    #[test]
    fn phase2_missing_field_is_named() {
        let resp = response(json!({
            "status": { "resultcode": 1100 },
            "api": "create_user_r12x1b",
            "version": "2.8",
            "body": { "userid": "user@wsg.sg" }
        }));
        let err = parse_phase2(&resp, "create_user_r12x1b", "2.8").unwrap_err();
        assert!(matches!(&err, Error::Validation(msg) if msg.contains("enc_userid")));
    }

    #[test]
    fn phase2_rejects_bad_hex() {
        let resp = response(json!({
            "status": { "resultcode": 1100 },
            "api": "create_user_r12x1b",
            "version": "2.8",
            "body": {
                "userid": "user@wsg.sg",
                "enc_userid": "not-hex!",
                "tag_userid": "00112233445566778899aabbccddeeff",
                "enc_password": "cafe",
                "tag_password": "ffeeddccbbaa99887766554433221100",
                "iv": "abcdefghijk"
            }
        }));
        let err = parse_phase2(&resp, "create_user_r12x1b", "2.8").unwrap_err();
        assert!(matches!(&err, Error::Validation(msg) if msg.contains("enc_userid")));
    }

    #[test]
    fn mobile_numbers_are_normalized() {
        assert_eq!(normalize_mobile("91234567").unwrap(), "6591234567");
        assert_eq!(normalize_mobile("6591234567").unwrap(), "6591234567");
        assert_eq!(normalize_mobile(" 81234567 ").unwrap(), "6581234567");
        assert!(normalize_mobile("1234567").is_err());
        assert!(normalize_mobile("9123456a").is_err());
        assert!(normalize_mobile("4491234567").is_err());
    }

    #[test]
    fn dob_format_is_checked() {
        assert!(validate_dob("01011990").is_ok());
        assert!(validate_dob("31121999").is_ok());
        assert!(validate_dob("00011990").is_err());
        assert!(validate_dob("01131990").is_err());
        assert!(validate_dob("1011990").is_err());
        assert!(validate_dob("010119x0").is_err());
    }
}
