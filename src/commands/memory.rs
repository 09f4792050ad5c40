use super::helpers::open_memory;
use crate::cli::MemoryCommands;
use crate::config::Config;
use crate::error::Result;
use crate::ui::{ConsoleUi, Ui};

pub fn execute(config: &Config, command: &MemoryCommands) -> Result<()> {
    match command {
        MemoryCommands::Show => show(config),
        MemoryCommands::Clear { yes } => clear(config, *yes),
    }
}

fn show(config: &Config) -> Result<()> {
    if !config.memory.enabled {
        println!("Memory is disabled.");
        return Ok(());
    }

    let memory = open_memory(config)?;
    println!("Memory file: {}\n", config.memory_path().display());

    let mut empty = true;
    for (name, tool) in memory.tools() {
        empty = false;
        let updated = tool.updated_at.format("%Y-%m-%d %H:%M");
        if tool.install_succeeded_before {
            println!(
                "  ✓ {:<20} {:<30} {}",
                name,
                tool.version.as_deref().unwrap_or("-"),
                updated
            );
        } else {
            println!(
                "  ✗ {:<20} {} failure(s), last: {} ({})",
                name,
                tool.failure_count,
                tool.last_error.as_deref().unwrap_or("unknown error"),
                updated
            );
        }
    }

    if empty {
        println!("No installations remembered yet.");
        return Ok(());
    }

    let stats = memory.stats();
    println!(
        "\n{} installed, {} failed ({:.0}% success)",
        stats.installed,
        stats.failed,
        stats.success_rate * 100.0
    );
    Ok(())
}

fn clear(config: &Config, yes: bool) -> Result<()> {
    let mut ui = ConsoleUi::new(yes);
    if !ui.confirm("Forget all remembered installations?") {
        println!("Cancelled.");
        return Ok(());
    }

    let mut memory = open_memory(config)?;
    memory.clear()?;
    println!("✓ Memory cleared");
    Ok(())
}
