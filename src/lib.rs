// Public exports for the binary and integration tests
pub mod crypto;
pub mod error;
pub mod isp;
pub mod network;
pub mod protocol;
pub mod storage;

pub use crypto::decrypt_credentials;
pub use error::{Error, Result};
pub use isp::{Isp, IspProfile};
pub use protocol::{EncryptedCredentialBundle, RegistrantIdentity, RegistrationClient};
pub use storage::{Credentials, SecureStorage};
