use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;

use callframe::abi::{Abi, abi_for_arch};
use callframe::arch::ArchSpec;
use callframe::emulate::AddressRange;
use callframe::plan::{RegisterLocation, UnwindPlan};
use callframe::registers::RegisterInfo;
use callframe::unwind::InstructionEmulationUnwinder;

#[derive(Parser)]
#[command(name = "callframe")]
#[command(about = "Inspect calling conventions and synthesized unwind plans")]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "arm-apple-darwin",
        help = "Target triple (machine-vendor-os)"
    )]
    arch: String,

    #[arg(long, global = true, help = "Emit JSON instead of text")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize an unwind plan from a function's code bytes
    Synthesize {
        #[arg(help = "Hex-encoded instruction bytes, or @path to a raw binary file")]
        code: String,

        #[arg(long, default_value_t = 0x4000, help = "Load address of the first byte")]
        base: u64,
    },
    /// Print the ABI's at-function-entry unwind plan
    EntryPlan,
    /// Print the ABI's architectural default unwind plan
    DefaultPlan,
    /// List the architecture's registers with their numbers and volatility
    Registers,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let arch = ArchSpec::parse(&cli.arch)
        .with_context(|| format!("Invalid architecture triple '{}'", cli.arch))?;
    let abi = abi_for_arch(&arch).context("No ABI plugin for this architecture")?;
    tracing::debug!(arch = %arch, abi = abi.name(), "resolved target");

    match cli.command {
        Commands::Synthesize { code, base } => {
            let bytes = read_code(&code)?;
            let mut unwinder = InstructionEmulationUnwinder::for_arch(&arch)
                .context("No instruction emulator for this architecture")?;
            let range = AddressRange::new(base, bytes.len() as u64);
            let plan = unwinder
                .synthesize(&range, &bytes, abi.as_ref())
                .context("Unwind synthesis failed")?;
            print_plan(&plan, abi.register_table(), cli.json);
        }
        Commands::EntryPlan => {
            print_plan(&abi.function_entry_unwind_plan(), abi.register_table(), cli.json);
        }
        Commands::DefaultPlan => {
            print_plan(&abi.default_unwind_plan(), abi.register_table(), cli.json);
        }
        Commands::Registers => {
            print_registers(abi.as_ref(), cli.json);
        }
    }

    Ok(())
}

/// Code bytes from a hex string (whitespace ignored) or, with a leading
/// `@`, from a raw file.
fn read_code(input: &str) -> Result<Vec<u8>> {
    if let Some(path) = input.strip_prefix('@') {
        return fs::read(path).with_context(|| format!("Failed to read {path}"));
    }
    let hex: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    anyhow::ensure!(
        hex.len().is_multiple_of(2),
        "hex input must have an even number of digits"
    );
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte '{}'", &hex[i..i + 2]))
        })
        .collect()
}

fn register_name(table: &[RegisterInfo], dwarf: u32) -> String {
    table
        .iter()
        .find(|info| info.dwarf == dwarf)
        .map_or_else(|| format!("reg{dwarf}"), |info| info.name.to_string())
}

fn location_string(table: &[RegisterInfo], location: RegisterLocation) -> String {
    match location {
        RegisterLocation::Undefined => "undefined".to_string(),
        RegisterLocation::SameAsCaller => "same".to_string(),
        RegisterLocation::AtCfaPlusOffset(offset) => format!("[CFA{offset:+}]"),
        RegisterLocation::IsCfaPlusOffset(offset) => format!("CFA{offset:+}"),
        RegisterLocation::InRegister(reg) => format!("in {}", register_name(table, reg)),
        RegisterLocation::Constant(value) => format!("={value:#x}"),
    }
}

fn print_plan(plan: &UnwindPlan, table: &[RegisterInfo], json: bool) {
    if json {
        let rows: Vec<serde_json::Value> = plan
            .rows()
            .map(|row| {
                let registers: serde_json::Map<String, serde_json::Value> = row
                    .registers()
                    .map(|(reg, location)| {
                        (
                            register_name(table, reg),
                            serde_json::Value::String(location_string(table, location)),
                        )
                    })
                    .collect();
                serde_json::json!({
                    "offset": row.offset(),
                    "cfa": {
                        "register": register_name(table, row.cfa_register()),
                        "offset": row.cfa_offset(),
                    },
                    "registers": registers,
                })
            })
            .collect();
        let value = serde_json::json!({
            "source": plan.source_name(),
            "valid_at_all_instruction_locations": plan.is_valid_at_all_instruction_locations(),
            "rows": rows,
        });
        println!("{value:#}");
        return;
    }

    println!(
        "{} (valid at all instructions: {})",
        plan.source_name(),
        plan.is_valid_at_all_instruction_locations()
    );
    for row in plan.rows() {
        let mut line = format!(
            "  +{:<4} CFA={}{:+}",
            row.offset(),
            register_name(table, row.cfa_register()),
            row.cfa_offset()
        );
        for (reg, location) in row.registers() {
            line.push_str(&format!(
                "  {}={}",
                register_name(table, reg),
                location_string(table, location)
            ));
        }
        println!("{line}");
    }
}

fn print_registers(abi: &dyn Abi, json: bool) {
    let table = abi.register_table();
    if json {
        let registers: Vec<serde_json::Value> = table
            .iter()
            .map(|info| {
                serde_json::json!({
                    "name": info.name,
                    "alt_name": info.alt_name,
                    "byte_size": info.byte_size,
                    "dwarf": info.id(callframe::registers::RegisterKind::Dwarf),
                    "volatile": abi.is_register_volatile(info),
                })
            })
            .collect();
        println!("{:#}", serde_json::Value::Array(registers));
        return;
    }

    for info in table {
        let dwarf = info
            .id(callframe::registers::RegisterKind::Dwarf)
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        println!(
            "{:<6} dwarf={:<4} size={}  {}",
            info.name,
            dwarf,
            info.byte_size,
            if abi.is_register_volatile(info) {
                "volatile"
            } else {
                "callee-saved"
            }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_code_hex_with_whitespace() {
        let bytes = read_code("04 e0 2d e5").unwrap();
        assert_eq!(bytes, vec![0x04, 0xE0, 0x2D, 0xE5]);
    }

    #[test]
    fn test_read_code_rejects_odd_length() {
        assert!(read_code("abc").is_err());
    }

    #[test]
    fn test_location_strings() {
        let table = callframe::abi::ArmAbi.register_table();
        assert_eq!(
            location_string(table, RegisterLocation::AtCfaPlusOffset(-4)),
            "[CFA-4]"
        );
        assert_eq!(
            location_string(table, RegisterLocation::InRegister(14)),
            "in lr"
        );
        assert_eq!(location_string(table, RegisterLocation::SameAsCaller), "same");
    }
}
