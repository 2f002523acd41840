use std::{
    io::{BufRead, Write},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use drop_core::{Challenge, Ticket};
use qrcode::{QrCode, render::unicode};

/// Renders the full ticket string as a terminal QR code.
pub fn generate_qr_code(ticket: &Ticket) -> Result<String> {
    let code = QrCode::new(ticket.to_string().as_bytes())
        .context("Failed to generate QR code")?;

    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Prints the ticket, its QR code and the code the receiver has to pick.
pub fn display_session_info(ticket: &Ticket, waiting: bool) {
    println!("\n========================================");
    println!("ARK Drop - Sender");
    println!("========================================\n");

    match generate_qr_code(ticket) {
        Ok(qr) => println!("{qr}\n"),
        Err(e) => {
            eprintln!("Warning: Could not generate QR code: {e}");
            println!("Ticket and confirmation are shown below:\n");
        }
    }

    println!("Ticket: {ticket}");
    println!("Confirmation: {}", ticket.code());
    println!("\n========================================");
    if waiting {
        println!("Waiting for connection...");
        println!("Press Ctrl+C to cancel");
    } else {
        println!("The offer stays available until it is received.");
    }
    println!("========================================\n");
}

/// Shows the three challenge codes and reads the one the user picks.
pub fn read_choice(
    challenge: &Challenge,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<u8> {
    writeln!(output, "Which code does the sender show?")?;
    let codes: Vec<String> =
        challenge.options().iter().map(|c| c.to_string()).collect();
    writeln!(output, "   {}", codes.join("   "))?;
    write!(output, "> ")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(anyhow!("No confirmation code entered"));
    }
    let line = line.trim();
    line.parse::<u8>()
        .with_context(|| format!("Invalid confirmation code: {line}"))
}

/// `mm:ss`, or `--:--` while the rate is unknown.
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => {
            let secs = eta.as_secs();
            format!("{:02}:{:02}", secs / 60, secs % 60)
        }
        None => "--:--".to_string(),
    }
}
