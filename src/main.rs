//! Xenon CPU - headless runner
//!
//! Loads a raw image into guest memory and runs the three cores until the
//! instruction budget runs out or nothing is left to run. Prints the state
//! of every core afterwards.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use xc_core::config::Config;
use xc_core::EmulatorContext;
use xc_cpu::system::CORES;
use xc_cpu::{Segment, Xenon};

const USAGE: &str = "usage: xenon-cpu <image> [load-address] [entry] [budget]";

/// Hypervisor real-mode addresses with bit 63 set bypass HRMOR
const REAL_MODE_BYPASS: u64 = 1 << 63;

struct Args {
    image: String,
    load_addr: u64,
    entry: u64,
    budget: u64,
}

fn parse_number(text: &str) -> Result<u64> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.with_context(|| format!("invalid number '{}'", text))
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let Some(image) = args.next() else {
        bail!(USAGE);
    };
    let load_addr = args.next().map(|a| parse_number(&a)).transpose()?.unwrap_or(0);
    let entry = args.next().map(|a| parse_number(&a)).transpose()?.unwrap_or(REAL_MODE_BYPASS | load_addr);
    let budget = args.next().map(|a| parse_number(&a)).transpose()?.unwrap_or(u64::MAX);
    if args.next().is_some() {
        bail!(USAGE);
    }
    Ok(Args { image, load_addr, entry, budget })
}

fn print_cores(xenon: &Xenon) -> Result<()> {
    for index in 0..CORES as u8 {
        let core = xenon.core(index)?;
        let stats = core.jit.stats();
        println!(
            "core {}: {:?}  blocks {} rebuilds {} hits {} evicted {}  native {} fallback {}",
            index,
            core.run_state(),
            stats.blocks_compiled,
            stats.rebuilds,
            stats.cache_hits,
            stats.evictions + stats.invalidations,
            stats.native_instructions,
            stats.fallback_instructions
        );
        for thread in &core.threads {
            println!(
                "  thread {} (pir {}): nia 0x{:016x} msr 0x{:016x} retired {}",
                thread.index, thread.pir, thread.nia, thread.msr, thread.retired
            );
        }
        if let Some(err) = &core.last_error {
            println!("  halted: {}", err);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args()?;

    let config = Config::load().unwrap_or_default();
    xc_core::logging::init(&config);

    tracing::info!("Starting Xenon CPU with {:?} backend", config.cpu.backend);

    let data = std::fs::read(&args.image).with_context(|| format!("failed to read image {}", args.image))?;
    let ctx = Arc::new(EmulatorContext::new(config));
    let mut xenon = Xenon::new(Arc::clone(&ctx)).context("failed to build the system")?;
    xenon
        .load_image(args.entry, &[Segment::new(args.load_addr, data)])
        .context("failed to load image")?;

    let result = xenon.run_budget(args.budget);
    print_cores(&xenon)?;
    let executed = result?;
    println!("executed {} instructions", executed);
    if let Some(reason) = ctx.shutdown_reason() {
        tracing::info!("Shutdown: {:?}", reason);
    }
    Ok(())
}
