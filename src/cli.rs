use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wirelesssgx")]
#[command(version = "1.0.0")]
#[command(about = "Wireless@SGx registration and connection manager for Linux", long_about = None)]
pub struct Args {
    /// Verbose output (protocol debug logging, secrets redacted)
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Register a new Wireless@SGx account
    ///
    /// Requests an SMS OTP for your mobile number, verifies it, decrypts
    /// the credentials the ISP returns, stores them securely and
    /// configures the Wireless@SGx network profile.
    ///
    /// Example: wirelesssgx register --mobile 91234567 --dob 01011990
    Register {
        /// Singapore mobile number (8 digits, or with the 65 prefix)
        #[arg(short, long)]
        mobile: String,

        /// Date of birth (DDMMYYYY)
        #[arg(short, long)]
        dob: String,

        /// ISP operating your account (singtel or starhub)
        #[arg(short, long, default_value = "singtel")]
        isp: String,
    },

    /// Retrieve the credentials of an existing account
    ///
    /// Same OTP flow as registration, for accounts that were registered
    /// before (on this machine or elsewhere).
    ///
    /// Example: wirelesssgx retrieve --mobile 91234567 --dob 01011990 --isp starhub
    Retrieve {
        /// Singapore mobile number (8 digits, or with the 65 prefix)
        #[arg(short, long)]
        mobile: String,

        /// Date of birth (DDMMYYYY)
        #[arg(short, long)]
        dob: String,

        /// ISP operating your account (singtel or starhub)
        #[arg(short, long, default_value = "singtel")]
        isp: String,
    },

    /// Show saved credentials (password masked)
    Show,

    /// Configure the network and connect using saved credentials
    Connect,

    /// Enable auto-connect for Wireless@SGx (NetworkManager only)
    Autoconnect,

    /// Delete saved credentials and the network profile
    Forget {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Check whether the host is connected to Wireless@SGx
    Status,
}
