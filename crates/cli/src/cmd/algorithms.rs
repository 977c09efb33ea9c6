//! List digest back ends

use anyhow::Result;
use digestkit_core::HashAlgorithm;
use owo_colors::OwoColorize;

pub fn run() -> Result<()> {
    println!("{}", "Digest back ends".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for algorithm in HashAlgorithm::ALL {
        let marker = if algorithm == HashAlgorithm::default() { "*" } else { " " };
        let status = if algorithm.is_available() {
            "available".green().to_string()
        } else {
            "not compiled in".dimmed().to_string()
        };
        println!(
            "{} {:<10} {:>3} bytes  {}",
            marker,
            algorithm.name(),
            algorithm.digest_len(),
            status
        );
    }

    println!();
    println!("{}", "* default".dimmed());
    Ok(())
}
