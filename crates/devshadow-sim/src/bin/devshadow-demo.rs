//! Fork a toy machine into several execution states and check that each
//! keeps its own devices and disk contents.
//!
//! # Usage
//!
//! ```bash
//! devshadow-demo --forks 4 --steps 32
//! devshadow-demo --shared-devices serial,rng --seed 7
//! devshadow-demo --config engine.json --image disk.raw
//! RUST_LOG=debug devshadow-demo --persistent-disk-writes
//! ```

use clap::Parser;
use devshadow::{EngineConfig, MemoryImage, SECTOR_SIZE};
use devshadow_sim::{SimError, SimMachine, StateId, StatePool};
use log::{info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

#[derive(Parser)]
#[command(name = "devshadow-demo")]
#[command(about = "Per-state device snapshots and copy-on-write disks on a toy machine")]
#[command(version)]
struct Cli {
    /// Seed for the machine's entropy device and the branch schedule.
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of branches forked from the root state.
    #[arg(short, long, default_value = "4")]
    forks: u64,

    /// Maximum steps each branch runs.
    #[arg(long, default_value = "32")]
    steps: u64,

    /// JSON engine configuration; flags below override it.
    #[arg(short, long)]
    config: Option<String>,

    /// Comma-separated devices shared by all states.
    #[arg(long)]
    shared_devices: Option<String>,

    /// Write block I/O straight to the backing image.
    #[arg(long)]
    persistent_disk_writes: bool,

    /// Raw disk image to shadow; a blank one is used otherwise.
    #[arg(long)]
    image: Option<String>,

    /// Sectors of the blank disk.
    #[arg(long, default_value = "64")]
    disk_sectors: u64,
}

struct Branch {
    id: StateId,
    sector: u64,
    fill: u8,
    fingerprint: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn engine_config(cli: &Cli) -> Result<EngineConfig, SimError> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(list) = &cli.shared_devices {
        config = config.with_shared_devices(list);
    }
    if cli.persistent_disk_writes {
        config.persistent_disk_writes = true;
    }
    Ok(config)
}

fn backing(cli: &Cli) -> Result<MemoryImage, SimError> {
    match &cli.image {
        Some(path) => {
            let data = std::fs::read(path).map_err(|source| SimError::Image {
                path: path.clone(),
                source,
            })?;
            Ok(MemoryImage::from_image(data)?)
        }
        None => Ok(MemoryImage::new(cli.disk_sectors.max(1))),
    }
}

fn run(cli: &Cli) -> Result<(), SimError> {
    let config = engine_config(cli)?;
    let persistent = config.persistent_disk_writes;
    let image = backing(cli)?;
    let sectors = (image.size() / SECTOR_SIZE as u64).max(1);

    let mut pool = StatePool::new(SimMachine::standard(cli.seed), config, image);
    let mut rng = ChaCha20Rng::seed_from_u64(cli.seed);

    // ── Phase 1: run the root, then branch ─────────────────────────────
    pool.step(cli.steps / 2);
    let root = pool.current();
    let root_fingerprint = pool.fingerprint();
    info!("Root {root} at {root_fingerprint:#018x}");

    let ids: Vec<StateId> = (0..cli.forks).map(|_| pool.fork()).collect();

    // ── Phase 2: run every branch its own way ──────────────────────────
    let mut branches = Vec::with_capacity(ids.len());
    for (i, id) in ids.into_iter().enumerate() {
        pool.switch_to(id)?;
        pool.reseed(rng.gen());
        pool.step(rng.gen_range(1..=cli.steps.max(1)));

        let sector = rng.gen_range(0..sectors);
        let fill = 0x80 | i as u8;
        pool.write_disk(sector, &[fill; SECTOR_SIZE])?;

        let fingerprint = pool.fingerprint();
        info!(
            "Branch {id}: sector {sector} <- {fill:#04x}, state {fingerprint:#018x}, {} shadowed sector(s)",
            pool.shadowed_sectors(id).unwrap_or(0)
        );
        branches.push(Branch {
            id,
            sector,
            fill,
            fingerprint,
        });
    }

    // ── Phase 3: revisit and verify ────────────────────────────────────
    let mut mismatches = 0;
    let mut buf = [0u8; SECTOR_SIZE];
    for branch in &branches {
        pool.switch_to(branch.id)?;
        if pool.fingerprint() != branch.fingerprint {
            warn!("Branch {}: device state changed while parked", branch.id);
            mismatches += 1;
        }

        pool.read_disk(branch.sector, &mut buf)?;
        let overwritten = branches
            .iter()
            .any(|other| other.sector == branch.sector && other.id > branch.id);
        if buf[0] != branch.fill && !(persistent && overwritten) {
            warn!(
                "Branch {}: sector {} reads {:#04x}, wrote {:#04x}",
                branch.id, branch.sector, buf[0], branch.fill
            );
            mismatches += 1;
        }
    }

    pool.switch_to(root)?;
    if pool.fingerprint() != root_fingerprint {
        warn!("Root {root}: device state changed while parked");
        mismatches += 1;
    }

    // ── Phase 4: drop the branches ─────────────────────────────────────
    for branch in &branches {
        pool.destroy(branch.id)?;
    }

    eprintln!("═══════════════════════════════════════════════════════════════════════");
    eprintln!("  devshadow demo");
    eprintln!("═══════════════════════════════════════════════════════════════════════");
    eprintln!("  Per-state devices: {}", pool.engine().devices().len());
    eprintln!(
        "  Snapshot size:     {} bytes",
        pool.engine().finalized_size().unwrap_or(0)
    );
    eprintln!("  Branches:          {}", branches.len());
    let disks: Vec<String> = pool
        .engine()
        .slots()
        .devices()
        .iter()
        .map(ToString::to_string)
        .collect();
    eprintln!("  Shadowed disks:    {}", disks.join(", "));
    eprintln!(
        "  Disk policy:       {:?} ({} backing writes)",
        pool.engine().policy(),
        pool.backing().stats().writes
    );
    eprintln!("  Mismatches:        {mismatches}");

    if mismatches > 0 {
        std::process::exit(2);
    }
    Ok(())
}
