//! # hapcall: Founder Haplotype Calling over PBA Panels
//!
//! ## Usage
//! ```bash
//! # Progeny assignment
//! hapcall --founder f1.pba --founder f2.pba --progeny p1.pba --out calls
//!
//! # Haplotype grouping with uniform bins
//! hapcall --founder f1.pba --founder f2.pba --bin-size 100000 --out groups
//! ```

use std::time::Instant;

use hapcall::config::Config;
use hapcall::error::Result;
use hapcall::pipelines::{GroupingPipeline, HaplotypingPipeline};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let start = Instant::now();
    let config = Config::parse_and_validate()?;

    tracing::info!(
        threads = config.nthreads(),
        founders = config.founders.len(),
        "hapcall v{}",
        env!("CARGO_PKG_VERSION")
    );

    if config.is_grouping_mode() {
        tracing::info!("mode: haplotype grouping");
        let mut pipeline = GroupingPipeline::new(config);
        pipeline.run()?;
    } else {
        tracing::info!("mode: progeny assignment");
        let mut pipeline = HaplotypingPipeline::new(config);
        pipeline.run()?;
    }

    tracing::info!(elapsed_s = start.elapsed().as_secs_f64(), "completed");
    Ok(())
}
