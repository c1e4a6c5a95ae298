/*!
 * Error taxonomy for the Wireless@SGx registration protocol
 *
 * Every failure the protocol client or decryption engine can produce maps
 * to one of four kinds:
 * - `Config`: the caller asked for an ISP the registry does not know
 * - `Http`: transport failure, timeout, or non-2xx status
 * - `Server`: a well-formed response carrying a non-success result code
 * - `Validation`: malformed response shape, missing field, bad hex, or
 *   decryption exhaustion (wrong OTP / date mismatch)
 */

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Unknown or unsupported ISP identifier.
    #[error("invalid ISP: {0} (choose from: singtel, starhub)")]
    Config(String),

    /// Transport-level failure. Recoverable by retrying the request.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered with a non-success result code.
    #[error("server error (code {code}): {message}")]
    Server { code: i64, message: String },

    /// Response shape, field, or decryption validation failure.
    #[error("{0}")]
    Validation(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Strip the URL so query parameters (OTP, api_password) never end
        // up in an error message.
        Error::Http(err.without_url().to_string())
    }
}
