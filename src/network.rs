/*!
 * Network configuration for Wireless@SGx
 *
 * Creates the WPA-Enterprise (PEAP/MSCHAPv2) profile for the fixed
 * Wireless@SGx SSID through whichever backend the host runs:
 * NetworkManager, systemd-networkd + wpa_supplicant, or a bare
 * wpa_supplicant config. The EAP exchange itself is entirely the
 * backend's job; this module only hands it the credentials.
 */

use std::fs;
use std::path::Path;
use std::process::Command;

use log::debug;
use thiserror::Error;

pub const SSID: &str = "Wireless@SGx";
const CONNECTION_NAME: &str = "Wireless@SGx";

const WPA_SUPPLICANT_DIR: &str = "/etc/wpa_supplicant";

#[derive(Debug, Error)]
pub enum NetworkConfigError {
    #[error("no supported network manager found (need NetworkManager, systemd-networkd, or wpa_supplicant)")]
    NoBackend,
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: &'static str,
        source: std::io::Error,
    },
    #[error("failed to configure {backend}: {detail}")]
    Configure {
        backend: &'static str,
        detail: String,
    },
    #[error("failed to write wpa_supplicant config: {0}")]
    WriteConfig(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    NetworkManager,
    SystemdNetworkd,
    WpaSupplicant,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::NetworkManager => "NetworkManager",
            Backend::SystemdNetworkd => "systemd-networkd",
            Backend::WpaSupplicant => "wpa_supplicant",
        }
    }
}

pub struct NetworkConfigurator;

impl NetworkConfigurator {
    pub fn new() -> Self {
        Self
    }

    /// Figure out which network manager is in charge of the host.
    pub fn detect_backend(&self) -> Result<Backend, NetworkConfigError> {
        if systemctl_is_active("NetworkManager") {
            return Ok(Backend::NetworkManager);
        }
        if systemctl_is_active("systemd-networkd") {
            return Ok(Backend::SystemdNetworkd);
        }
        if Path::new(WPA_SUPPLICANT_DIR).exists() {
            return Ok(Backend::WpaSupplicant);
        }
        Err(NetworkConfigError::NoBackend)
    }

    /// Create (or replace) the Wireless@SGx profile with the given
    /// credentials. Returns the backend that was configured.
    pub fn configure(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Backend, NetworkConfigError> {
        let backend = self.detect_backend()?;
        debug!("configuring {SSID} via {}", backend.name());
        match backend {
            Backend::NetworkManager => self.configure_networkmanager(username, password)?,
            Backend::SystemdNetworkd => self.configure_systemd_networkd(username, password)?,
            Backend::WpaSupplicant => self.configure_wpa_supplicant(username, password)?,
        }
        Ok(backend)
    }

    fn configure_networkmanager(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), NetworkConfigError> {
        // A stale profile would shadow the new one.
        let _ = Command::new("nmcli")
            .args(["connection", "delete", CONNECTION_NAME])
            .output();

        let output = Command::new("nmcli")
            .args([
                "connection",
                "add",
                "type",
                "wifi",
                "con-name",
                CONNECTION_NAME,
                "ifname",
                "*",
                "ssid",
                SSID,
                "wifi-sec.key-mgmt",
                "wpa-eap",
                "802-1x.eap",
                "peap",
                "802-1x.phase2-auth",
                "mschapv2",
                "802-1x.identity",
                username,
                "802-1x.password",
                password,
                "802-1x.anonymous-identity",
                "",
                "connection.autoconnect",
                "yes",
            ])
            .output()
            .map_err(|source| NetworkConfigError::Spawn {
                command: "nmcli",
                source,
            })?;

        if !output.status.success() {
            return Err(NetworkConfigError::Configure {
                backend: "NetworkManager",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn configure_systemd_networkd(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), NetworkConfigError> {
        let config_path = Path::new(WPA_SUPPLICANT_DIR).join("wpa_supplicant-wlan0.conf");
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&config_path, wpa_network_block(username, password))?;

        for action in ["enable", "restart"] {
            let output = Command::new("systemctl")
                .args([action, "wpa_supplicant@wlan0.service"])
                .output()
                .map_err(|source| NetworkConfigError::Spawn {
                    command: "systemctl",
                    source,
                })?;
            if !output.status.success() {
                return Err(NetworkConfigError::Configure {
                    backend: "systemd-networkd",
                    detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
        }
        Ok(())
    }

    fn configure_wpa_supplicant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), NetworkConfigError> {
        let config = format!(
            "ctrl_interface=/var/run/wpa_supplicant\n\
             ctrl_interface_group=0\n\
             update_config=1\n\
             \n{}",
            wpa_network_block(username, password)
        );
        fs::write(Path::new(WPA_SUPPLICANT_DIR).join("wpa_supplicant.conf"), config)?;
        Ok(())
    }

    /// Best-effort immediate connect after configuring NetworkManager.
    /// Out of range is not an error; the profile autoconnects later.
    pub fn bring_up(&self) -> bool {
        Command::new("nmcli")
            .args(["connection", "up", CONNECTION_NAME])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// True when the host is associated with Wireless@SGx.
    pub fn test_connection(&self) -> bool {
        if let Ok(output) = Command::new("nmcli")
            .args(["-t", "-f", "ACTIVE,SSID", "dev", "wifi"])
            .output()
        {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout
                .lines()
                .any(|line| line.starts_with("yes:") && line.contains(SSID))
            {
                return true;
            }
        }

        // Hosts without NetworkManager still usually have iwconfig.
        if let Ok(output) = Command::new("iwconfig").output() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.contains(SSID) {
                return true;
            }
        }

        false
    }

    /// Whether the NetworkManager profile exists with autoconnect on.
    /// None when the profile (or nmcli) is absent.
    pub fn autoconnect_enabled(&self) -> Option<bool> {
        let output = Command::new("nmcli")
            .args([
                "-t",
                "-f",
                "connection.autoconnect",
                "con",
                "show",
                CONNECTION_NAME,
            ])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Some(stdout.trim().ends_with("yes"))
    }

    /// IP address and activation state of the profile, for `status`.
    pub fn connection_details(&self) -> Vec<(String, String)> {
        let Ok(output) = Command::new("nmcli")
            .args([
                "-t",
                "-f",
                "IP4.ADDRESS,GENERAL.STATE",
                "con",
                "show",
                CONNECTION_NAME,
            ])
            .output()
        else {
            return Vec::new();
        };
        if !output.status.success() {
            return Vec::new();
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                let label = if key.starts_with("IP4.ADDRESS") {
                    "IP Address"
                } else if key.starts_with("GENERAL.STATE") {
                    "State"
                } else {
                    return None;
                };
                Some((label.to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Drop the NetworkManager profile. Best effort.
    pub fn forget(&self) -> bool {
        Command::new("nmcli")
            .args(["connection", "delete", CONNECTION_NAME])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Settings for users on systems none of the backends cover.
    pub fn manual_instructions(&self, username: &str, password: &str) -> String {
        format!(
            "Manual Network Configuration Instructions:\n\
             \n\
             1. Open your network settings\n\
             2. Add a new WiFi connection\n\
             3. Use these settings:\n\
             \n\
                SSID: {SSID}\n\
                Security: WPA & WPA2 Enterprise\n\
                Authentication: Protected EAP (PEAP)\n\
                Anonymous identity: (leave blank)\n\
                CA certificate: (No CA certificate is required)\n\
                PEAP version: Automatic\n\
                Inner authentication: MSCHAPv2\n\
                Username: {username}\n\
                Password: {password}\n\
             \n\
             4. Save and connect to the network"
        )
    }
}

impl Default for NetworkConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

fn systemctl_is_active(unit: &str) -> bool {
    Command::new("systemctl")
        .args(["is-active", unit])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn wpa_network_block(username: &str, password: &str) -> String {
    format!(
        r#"network={{
    ssid="{SSID}"
    key_mgmt=WPA-EAP
    eap=PEAP
    phase2="auth=MSCHAPV2"
    identity="{username}"
    password="{password}"
    anonymous_identity=""
}}
"#
    )
}
