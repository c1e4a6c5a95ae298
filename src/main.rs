mod cli;

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use env_logger::Env;

use wirelesssgx::network::{Backend, NetworkConfigurator};
use wirelesssgx::protocol::{normalize_mobile, validate_dob, RegistrantIdentity};
use wirelesssgx::storage::SecureStorage;
use wirelesssgx::{decrypt_credentials, Error, Isp, RegistrationClient};

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "wirelesssgx=debug" } else { "off" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    match args.command {
        Command::Register { mobile, dob, isp } => {
            handle_enrollment(&mobile, &dob, &isp, false).await?;
        }
        Command::Retrieve { mobile, dob, isp } => {
            handle_enrollment(&mobile, &dob, &isp, true).await?;
        }
        Command::Show => handle_show()?,
        Command::Connect => handle_connect()?,
        Command::Autoconnect => handle_autoconnect()?,
        Command::Forget { yes } => handle_forget(yes)?,
        Command::Status => handle_status(),
    }

    Ok(())
}

/// Shared register/retrieve flow: request the OTP, prompt until it
/// verifies (with resend support), decrypt, store, configure.
async fn handle_enrollment(mobile: &str, dob: &str, isp: &str, retrieve_mode: bool) -> Result<()> {
    let title = if retrieve_mode {
        "🔐 Retrieve Existing Account"
    } else {
        "📝 New Registration"
    };
    println!("\n{}", title.bold().cyan());

    let isp = Isp::from_name(isp)?;
    let mobile = normalize_mobile(mobile)?;
    validate_dob(dob)?;

    let client = RegistrationClient::new(isp)?;
    let identity = RegistrantIdentity::default();

    println!("{}", "Requesting OTP...".yellow());
    let mut success_code = match client
        .request_registration(&mobile, dob, &identity, retrieve_mode)
        .await
    {
        Ok(code) => code,
        Err(Error::Server { code, message })
            if !retrieve_mode && message.to_lowercase().contains("registered before") =>
        {
            println!(
                "{}",
                format!("❌ Server error (code {code}): {message}").red()
            );
            println!(
                "{}",
                "💡 This number already has an account. Try: wirelesssgx retrieve".yellow()
            );
            bail!("mobile number is already registered");
        }
        Err(err) => bail!("failed to request an OTP: {err}"),
    };

    println!(
        "{}",
        format!("✅ OTP sent to {}", mobile.trim_start_matches("65")).green()
    );
    println!("{}", "⏱️  The OTP is valid for about 5 minutes.".dimmed());

    let credentials = loop {
        let input = prompt("Enter the 6-digit OTP ('r' to resend, 'q' to quit): ")?;

        match input.as_str() {
            "q" | "quit" => bail!("cancelled"),
            "r" | "resend" => {
                println!("{}", "Requesting a new OTP...".yellow());
                match client
                    .request_registration(&mobile, dob, &identity, retrieve_mode)
                    .await
                {
                    Ok(code) => {
                        success_code = code;
                        println!(
                            "{}",
                            format!("✅ OTP re-sent to {}", mobile.trim_start_matches("65"))
                                .green()
                        );
                    }
                    Err(err) => println!("{}", format!("❌ Resend failed: {err}").red()),
                }
                continue;
            }
            otp if otp.len() == 6 && otp.bytes().all(|b| b.is_ascii_digit()) => {
                println!("{}", "Verifying OTP...".yellow());
                let verified = async {
                    let bundle = client
                        .validate_otp(&mobile, dob, otp, &success_code, retrieve_mode)
                        .await?;
                    decrypt_credentials(&bundle, otp)
                }
                .await;

                match verified {
                    Ok(creds) => break creds,
                    Err(err) => println!("{}", format!("❌ Verification failed: {err}").red()),
                }
            }
            _ => println!("{}", "Please enter a valid 6-digit OTP".red()),
        }
    };

    let (username, password) = credentials;
    println!("\n{}", "🎉 Success! Your Wireless@SGx credentials:".bold().green());
    println!("  Username: {}", username.bold());
    println!("  Password: {}", password.bold());

    store_and_configure(&username, &password, isp);
    Ok(())
}

/// Persist the credentials and set up the network profile. Neither step
/// should throw away a successful registration, so failures degrade to
/// warnings and manual instructions.
fn store_and_configure(username: &str, password: &str, isp: Isp) {
    let storage = SecureStorage::new();
    match storage.save_credentials(username, password, isp) {
        Ok(()) => println!("{}", "💾 Credentials saved securely.".green()),
        Err(err) => println!(
            "{}",
            format!("⚠️  Could not save credentials: {err}").yellow()
        ),
    }

    let network = NetworkConfigurator::new();
    match network.configure(username, password) {
        Ok(backend) => {
            println!(
                "{}",
                format!("✅ Network configured via {}.", backend.name()).green()
            );
            if network.bring_up() {
                println!("{}", "✅ Connected to Wireless@SGx!".bold().green());
            } else {
                println!(
                    "{}",
                    "ℹ️  Connection will be established when in range.".cyan()
                );
            }
        }
        Err(err) => {
            println!(
                "{}",
                format!("⚠️  Could not configure the network: {err}").yellow()
            );
            println!("\n{}", network.manual_instructions(username, password));
        }
    }
}

fn handle_show() -> Result<()> {
    let storage = SecureStorage::new();
    let Some(creds) = storage.load_credentials() else {
        println!("No saved credentials found.");
        return Ok(());
    };

    println!("\n{}", "🔐 Saved Wireless@SGx Credentials:".bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("Username: {}", creds.username);
    println!("Password: {}", "*".repeat(creds.password.len()));
    println!("ISP: {}", creds.isp);
    println!("{}", "─".repeat(40).dimmed());

    match NetworkConfigurator::new().autoconnect_enabled() {
        Some(true) => println!("{}", "✅ Auto-connect: Enabled".green()),
        Some(false) => println!("{}", "❌ Auto-connect: Disabled".red()),
        None => println!("{}", "ℹ️  No Wireless@SGx network profile found.".cyan()),
    }

    println!("\nOptions:");
    println!("  wirelesssgx connect     - Connect using saved credentials");
    println!("  wirelesssgx autoconnect - Enable auto-connect");
    println!("  wirelesssgx forget      - Delete saved credentials");
    Ok(())
}

fn handle_connect() -> Result<()> {
    let storage = SecureStorage::new();
    let Some(creds) = storage.load_credentials() else {
        println!(
            "{}",
            "❌ No saved credentials found. Run 'wirelesssgx register' to set up.".red()
        );
        bail!("no saved credentials");
    };

    println!("{}", "🔄 Connecting to Wireless@SGx using saved credentials...".cyan());
    let network = NetworkConfigurator::new();
    let backend = network
        .configure(&creds.username, &creds.password)
        .context("failed to configure the network")?;
    println!(
        "{}",
        format!("✅ Network configured via {}.", backend.name()).green()
    );

    if network.bring_up() {
        println!("{}", "✅ Connected to Wireless@SGx!".bold().green());
    } else {
        println!(
            "{}",
            "ℹ️  Network configured. Connection will be established when in range.".cyan()
        );
    }
    Ok(())
}

fn handle_autoconnect() -> Result<()> {
    let storage = SecureStorage::new();
    let Some(creds) = storage.load_credentials() else {
        println!(
            "{}",
            "❌ No saved credentials found. Run 'wirelesssgx register' to set up.".red()
        );
        bail!("no saved credentials");
    };

    let network = NetworkConfigurator::new();
    let backend = network.detect_backend()?;
    if backend != Backend::NetworkManager {
        println!("{}", "❌ Auto-connect is only available with NetworkManager".red());
        println!("ℹ️  Your system uses: {}", backend.name());
        bail!("unsupported backend for auto-connect");
    }

    println!("{}", "🔄 Configuring auto-connect for Wireless@SGx...".cyan());
    network
        .configure(&creds.username, &creds.password)
        .context("failed to configure the network")?;

    println!("{}", "✅ Auto-connect enabled!".green());
    println!("\nWireless@SGx will now connect automatically when in range.");
    println!("To disable it: nmcli connection modify Wireless@SGx connection.autoconnect no");
    Ok(())
}

fn handle_forget(assume_yes: bool) -> Result<()> {
    let storage = SecureStorage::new();
    if !storage.has_credentials() {
        println!("No saved credentials to delete.");
        return Ok(());
    }

    if !assume_yes {
        let answer = prompt("Are you sure you want to delete saved credentials? [y/N] ")?;
        if !matches!(answer.to_lowercase().as_str(), "y" | "yes") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    storage
        .delete_credentials()
        .context("failed to delete credentials")?;
    println!("{}", "✅ Credentials deleted successfully".green());

    if NetworkConfigurator::new().forget() {
        println!("{}", "✅ Network profile removed".green());
    }
    Ok(())
}

fn handle_status() {
    let network = NetworkConfigurator::new();

    if network.test_connection() {
        println!("{}", "✅ Connected to Wireless@SGx".bold().green());
        for (label, value) in network.connection_details() {
            println!("{label}: {value}");
        }
        return;
    }

    println!("{}", "❌ Not connected to Wireless@SGx".red());
    if SecureStorage::new().has_credentials() {
        println!("\nYou have saved credentials. Try:");
        println!("  wirelesssgx connect - to connect now");
    } else {
        println!("\nNo saved credentials. Run 'wirelesssgx register' to set up.");
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush().context("failed to flush stdout")?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("failed to read input")?;
    Ok(line.trim().to_string())
}
