//! Environment check command.

use console::style;

use crate::config::{PresetProvider, Settings};
use crate::import::PopplerBackend;
use crate::providers::{BackendKind, Router};

/// Report which backends and tools are usable.
pub fn cmd_check(settings: &Settings) -> anyhow::Result<()> {
    let router = Router::from_env(
        reqwest::Client::new(),
        settings.provider_timeout(),
        settings.retry_base(),
    );

    println!("{}", style("Backends").bold());
    for kind in BackendKind::all() {
        match router.provider(kind) {
            Some(provider) if provider.is_available() => {
                println!("  {} {}", style("✓").green(), kind);
            }
            Some(provider) => {
                println!(
                    "  {} {}: {}",
                    style("✗").red(),
                    kind,
                    provider.availability_hint()
                );
            }
            None => println!("  {} {}: not registered", style("✗").red(), kind),
        }
    }

    println!("{}", style("Presets").bold());
    for preset in settings.catalog().presets() {
        match router.check_engine(&preset.model) {
            Ok(kind) => println!("  {} {} ({})", style("✓").green(), preset.name, kind),
            Err(e) => println!("  {} {}: {}", style("✗").red(), preset.name, e),
        }
    }

    println!("{}", style("PDF import").bold());
    let missing = PopplerBackend::missing_tools();
    if missing.is_empty() {
        println!("  {} poppler-utils", style("✓").green());
    } else {
        println!(
            "  {} missing {} (install poppler-utils)",
            style("✗").red(),
            missing.join(", ")
        );
    }
    Ok(())
}
