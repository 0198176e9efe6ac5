// Licensed under the Apache-2.0 license

use anyhow::{Context, Result};
use std::process::Command;

/// RP2040 (Cortex-M0+) and RP2350 (Cortex-M33) targets.
const TARGETS: [&str; 2] = ["thumbv6m-none-eabi", "thumbv8m.main-none-eabihf"];

/// `cargo check` the library for each bare-metal target, with and without `defmt`.
pub fn run(target: Option<&str>) -> Result<()> {
    let targets: Vec<&str> = match target {
        Some(target) => vec![target],
        None => TARGETS.to_vec(),
    };

    for target in targets {
        for features in [None, Some("defmt")] {
            let label = features.map_or_else(|| target.to_string(), |f| format!("{target} +{f}"));
            println!("Checking {label}...");

            let mut cmd = Command::new("cargo");
            cmd.args(["check", "-p", "rp-i2c-dma", "--lib", "--target", target]);
            if let Some(features) = features {
                cmd.args(["--features", features]);
            }

            let output = cmd
                .output()
                .with_context(|| format!("Failed to run cargo check for {label}"))?;
            if !output.status.success() {
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
                anyhow::bail!("Check failed for {label}");
            }
        }
    }

    println!("All targets check cleanly");
    Ok(())
}
