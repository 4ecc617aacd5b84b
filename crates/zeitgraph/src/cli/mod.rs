pub mod integrate;
pub mod schema;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "zgraph",
    about = "Integrate newspaper extractions into a temporal knowledge graph",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve, enrich and reify an extraction corpus, then write the CSV bundle
    Integrate(IntegrateArgs),
    /// Print the graph constraint and index statements
    Schema,
}

#[derive(Args)]
pub struct IntegrateArgs {
    /// Extraction file, or a directory of `.json` files
    pub input: PathBuf,
    /// Directory that receives the CSV bundle
    #[arg(short, long)]
    pub out: PathBuf,
    /// JSON pipeline configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Similarity at or above which two mentions merge
    #[arg(short, long)]
    pub threshold: Option<f64>,
    /// Skip geocoding and date resolution
    #[arg(long = "no-enrich")]
    pub no_enrich: bool,
    /// Also write a JSON snapshot of the bundle
    #[arg(long)]
    pub json: Option<PathBuf>,
    /// Load the bundle into the configured Neo4j database
    #[cfg(feature = "neo4j")]
    #[arg(long = "load-graph")]
    pub load_graph: bool,
}
