//! vpic-info: inspect a VPIC run and the values of one variable
//!
//! Prints the catalog summary and, when a variable is named, loads one of
//! its components on a single rank and reports value statistics.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use ndarray::ArrayView1;

use vistle_vpic::util::math::compute_stats;
use vistle_vpic::{Dataset, ReaderConfig, SerialCommunicator};

#[derive(Parser, Debug)]
#[command(name = "vpic-info", version, about = "Inspect VPIC simulation output")]
struct Args {
    /// Run catalog (.vpc) written by the simulation
    catalog: PathBuf,

    /// Variable to load, by name
    #[arg(short, long)]
    variable: Option<String>,

    /// Output component of the variable
    #[arg(short, long, default_value_t = 0)]
    component: usize,

    /// Index into the list of dumps
    #[arg(short, long, default_value_t = 0)]
    time_step: usize,

    /// Stride per axis, e.g. 2,2,1
    #[arg(short, long, value_delimiter = ',', num_args = 3)]
    stride: Option<Vec<usize>>,

    /// Reader configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level, overrides the configuration
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ReaderConfig::load(args.config.as_deref()).context("loading reader configuration")?;
    vistle_vpic::init_logging(args.log_level.as_deref().unwrap_or(&config.log_level));

    let mut dataset = Dataset::open(&args.catalog, SerialCommunicator, config)
        .with_context(|| format!("opening {}", args.catalog.display()))?;

    if let Some(stride) = &args.stride {
        dataset.set_stride([stride[0], stride[1], stride[2]]);
    }
    dataset.calculate_grid_extents()?;

    print_summary(&dataset);

    let Some(name) = args.variable.as_deref() else {
        return Ok(());
    };
    let Some(variable) = dataset.catalog().variable_index(name) else {
        bail!("no variable named '{name}'");
    };

    let mut buffer = vec![0.0f32; dataset.local_len()];
    dataset
        .load_variable_data(&mut buffer, args.time_step, variable, args.component)
        .with_context(|| format!("loading {name}[{}] at time step {}", args.component, args.time_step))?;

    let stats = compute_stats(ArrayView1::from(&buffer[..]));
    println!();
    println!("{name}[{}] at time step {}", args.component, args.time_step);
    println!("  points   {:?} ({})", dataset.local_dimensions(), stats.count);
    println!("  min      {}", stats.min);
    println!("  max      {}", stats.max);
    println!("  mean     {}", stats.mean);
    println!("  std dev  {}", stats.std_dev);
    Ok(())
}

fn print_summary(dataset: &Dataset<SerialCommunicator>) {
    let catalog = dataset.catalog();
    println!("Catalog      {}", catalog.path().display());
    if let Some(version) = catalog.header_version() {
        println!("Version      {version}");
    }
    println!("Layout       {:?} ({} parts)", catalog.layout_size(), catalog.total_parts());
    println!("Part size    {:?} ({:?} with ghosts)", catalog.part_size(), catalog.ghost_size());
    println!("Origin       {:?}", dataset.origin().as_slice());
    println!("Step         {:?}", dataset.step().as_slice());
    println!("Stride       {:?}", dataset.stride());
    println!("Grid size    {:?}", dataset.grid_size());

    println!("Variables");
    for variable in dataset.variables() {
        println!(
            "  {:<32} {:<8} {} x {:?} {}B",
            variable.name,
            variable.struct_kind.as_str(),
            variable.output_components(),
            variable.basic_kind,
            variable.byte_width
        );
    }

    let times = dataset.time_steps();
    match (times.first(), times.last()) {
        (Some(first), Some(last)) => println!("Time steps   {} ({first} .. {last})", times.len()),
        _ => println!("Time steps   none yet"),
    }
}
