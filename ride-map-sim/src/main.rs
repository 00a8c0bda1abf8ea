use anyhow::Result;
use clap::Parser;

use ride_map_sim::{run, Scenario};

#[derive(Parser)]
struct Args {
    /// Path to a .json scenario to play
    #[arg(long)]
    input: String,

    /// Where to write the final map as GeoJSON
    #[arg(long, default_value = "ride.geojson")]
    output: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;
    let args = Args::parse();
    let scenario = Scenario::from_json(&std::fs::read_to_string(&args.input)?)?;

    let report = run(scenario).await?;
    std::fs::write(&args.output, &report.geojson)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
