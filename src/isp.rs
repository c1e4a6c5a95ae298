/*!
 * ISP registry for Wireless@SGx
 *
 * Static table of the operators running the registration backend. Each
 * entry carries the ESSA endpoint, the shared API password, and the
 * protocol version pairs for the create and retrieve flows. Adding an
 * operator is one new table row.
 */

use std::fmt;

use crate::error::{Error, Result};

/// Connection profile for a single ISP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IspProfile {
    pub name: &'static str,
    /// Registration API endpoint.
    pub essa_url: &'static str,
    /// Shared API password. Empty for Singtel.
    pub api_password: &'static str,
    /// (request version, validate version) for new registrations.
    pub create_api_versions: (&'static str, &'static str),
    /// (request version, validate version) for existing-account retrieval.
    pub retrieve_api_versions: (&'static str, &'static str),
}

const SINGTEL: IspProfile = IspProfile {
    name: "singtel",
    essa_url: "https://singtel-wsg.singtel.com/essa_r12",
    api_password: "",
    create_api_versions: ("2.6", "2.8"),
    retrieve_api_versions: ("2.0", "2.6"),
};

const STARHUB: IspProfile = IspProfile {
    name: "starhub",
    essa_url: "https://api.wifi.starhub.net.sg/essa_r12",
    api_password: "5t4rHUB4p1",
    create_api_versions: ("2.6", "2.8"),
    retrieve_api_versions: ("2.0", "2.6"),
};

/// Supported Wireless@SGx operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isp {
    #[default]
    Singtel,
    Starhub,
}

impl Isp {
    pub const ALL: [Isp; 2] = [Isp::Singtel, Isp::Starhub];

    /// Look up an ISP by its identifier (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "singtel" => Ok(Isp::Singtel),
            "starhub" => Ok(Isp::Starhub),
            other => Err(Error::Config(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        self.profile().name
    }

    pub fn profile(self) -> &'static IspProfile {
        match self {
            Isp::Singtel => &SINGTEL,
            Isp::Starhub => &STARHUB,
        }
    }
}

impl fmt::Display for Isp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_configured_profile_for_every_isp() {
        for isp in Isp::ALL {
            let resolved = Isp::from_name(isp.name()).unwrap();
            assert_eq!(resolved, isp);
            assert_eq!(resolved.profile(), isp.profile());
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(Isp::from_name("Singtel").unwrap(), Isp::Singtel);
        assert_eq!(Isp::from_name("STARHUB").unwrap(), Isp::Starhub);
    }

    #[test]
    fn lookup_rejects_unknown_isp() {
        for name in ["m1", "myrepublic", ""] {
            match Isp::from_name(name) {
                Err(Error::Config(found)) => assert_eq!(found, name),
                other => panic!("expected Config error, got {other:?}"),
            }
        }
    }

    #[test]
    fn profiles_are_distinct() {
        assert_ne!(SINGTEL.essa_url, STARHUB.essa_url);
        assert_ne!(SINGTEL.api_password, STARHUB.api_password);
        assert!(SINGTEL.api_password.is_empty());
        assert!(!STARHUB.api_password.is_empty());
    }
}
