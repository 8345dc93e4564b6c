//! Entry point for the doffld loader.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Map the input module and work out which target family it is for.
//! 3. Open the module, then list its sections, copy one section out, or load
//!    the whole module into a flat memory image.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use doffld::checksum::ReorderMap;
use doffld::config::Config;
use doffld::doff::FileHeader;
use doffld::{
    DefaultSyms, Loader, MemoryStream, Module, SectionInfo, TargetFamily, TargetMemory,
    TargetProfile,
};

type FileModule<'a> = Module<MemoryStream<'a>, DefaultSyms>;

fn main() -> Result<()> {
    let config = Config::parse();

    let directive: Directive = format!("doffld={}", config.log_level)
        .parse()
        .with_context(|| format!("invalid log level {:?}", config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_target(false)
        .init();

    // Map input file into memory
    let path = &config.input;
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file)? };

    let family = match config.target {
        Some(family) => family,
        None => detect_family(&mmap)
            .with_context(|| format!("cannot tell the target of {}", path.display()))?,
    };
    tracing::info!("{}: {:?} module", path.display(), family);

    let mut module = Loader::new(TargetProfile::native(family))
        .stream(MemoryStream::new(&mmap))
        .syms(DefaultSyms::new())
        .open()
        .with_context(|| format!("failed to open {}", path.display()))?;

    if let Some(name) = &config.section {
        let data = copy_section(&mut module, name)?;
        emit(&config, &data)?;
    } else if config.load {
        let data = load_image(&mut module, config.base)?;
        emit(&config, &data)?;
    } else {
        list_sections(&module);
    }

    module.close();
    Ok(())
}

/// Identify the family from the target id in the file header.
fn detect_family(data: &[u8]) -> Result<TargetFamily> {
    let host = TargetProfile::native(TargetFamily::C6000).host_order();
    let mut raw = data
        .get(..FileHeader::SIZE)
        .context("file is shorter than a DOFF header")?
        .to_vec();
    let marker = FileHeader::parse(&raw, host).byte_reshuffle;
    ReorderMap::from_marker(marker).apply(&mut raw, host);
    let target_id = FileHeader::parse(&raw, host).target_id;
    TargetFamily::from_target_id(target_id)
        .with_context(|| format!("unknown target id {:#x}", target_id))
}

fn list_sections(module: &FileModule<'_>) {
    println!(
        "{}: {} sections, timestamp {:#010x}",
        String::from_utf8_lossy(&module.file_name()),
        module.section_count(),
        module.timestamp()
    );
    println!(
        "{:<4} {:<16} {:>10} {:>10} {:>8} {:>4} {:>6} {:>7}",
        "Idx", "Name", "Run", "Load", "Size", "Page", "Flags", "Packets"
    );
    for (i, info) in module.sections().enumerate() {
        println!(
            "{:<4} {:<16} {:#010x} {:#010x} {:#8x} {:>4} {:#06x} {:>7}",
            i,
            info.name,
            info.run_addr,
            info.load_addr,
            info.size,
            info.page,
            info.flags.bits(),
            info.packet_count
        );
    }
}

fn copy_section(module: &mut FileModule<'_>, name: &str) -> Result<Vec<u8>> {
    let info = module
        .get_section_info(name)
        .with_context(|| format!("no section named {}", name))?;
    let units = module.profile().units;
    let len = units.host_to_byte(module.round_up_section_size(info.size)) as usize;
    let mut data = vec![0u8; len];
    module
        .get_section(&info, &mut data)
        .with_context(|| format!("failed to read section {}", name))?;
    data.truncate(units.taddr_to_byte(info.size) as usize);
    Ok(data)
}

fn load_image(module: &mut FileModule<'_>, base: u32) -> Result<Vec<u8>> {
    let units = module.profile().units;
    let size = image_size(module.sections()).context("image too large")?;
    let mut memory = TargetMemory::new(base, size, units.target());
    let mut space = memory.allocator();
    let image = module.load(&mut space, &mut memory).context("load failed")?;
    println!("entry point {:#010x}", image.entry_point);
    for info in image.sections.iter().filter(|s| s.flags.is_allocated()) {
        println!("  {:<16} {:#010x} {:#8x}", info.name, info.run_addr, info.size);
    }
    let used = units.taddr_to_byte(space.high_water() - base) as usize;
    Ok(memory.as_bytes()[..used].to_vec())
}

/// Target AUs that hold every allocated section at its worst-case alignment.
fn image_size(sections: impl Iterator<Item = SectionInfo>) -> Option<u32> {
    sections
        .filter(|s| s.flags.is_allocated())
        .try_fold(0u32, |total, s| {
            total.checked_add(s.size)?.checked_add(s.flags.alignment())
        })
}

fn emit(config: &Config, data: &[u8]) -> Result<()> {
    match &config.output {
        Some(path) => std::fs::write(path, data)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => std::io::stdout().write_all(data)?,
    }
    Ok(())
}
