use anyhow::{Context, Result};
use console::style;

use zeitgraph_core::export;
use zeitgraph_core::ingest::read_path;
use zeitgraph_core::{Pipeline, PipelineConfig, RunReport};

use super::IntegrateArgs;

fn load_config(args: &IntegrateArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env()?;

    if let Some(threshold) = args.threshold {
        config.resolver.merge_threshold = threshold;
    }
    if args.no_enrich {
        config.enrichment.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

pub async fn run(args: &IntegrateArgs) -> Result<()> {
    let config = load_config(args)?;

    let batch = read_path(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    eprintln!(
        "{} Read {} articles from {}",
        style("●").blue(),
        batch.article_count(),
        args.input.display()
    );

    let pipeline = Pipeline::from_config(config).await?;
    let output = pipeline.run(batch).await?;

    let summary = pipeline
        .export(&output, &args.out)
        .with_context(|| format!("Failed to export to {}", args.out.display()))?;
    eprintln!(
        "{} Wrote {} entities, {} locations, {} time periods and {} relations to {}",
        style("✓").green(),
        summary.entities,
        summary.locations,
        summary.timeperiods,
        summary.relations,
        args.out.display()
    );

    if let Some(path) = &args.json {
        export::write_json(&output.bundle, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("{} Wrote snapshot to {}", style("✓").green(), path.display());
    }

    #[cfg(feature = "neo4j")]
    if args.load_graph {
        load_graph(&pipeline.config().graph, &output.bundle).await?;
    }

    print!("{}", output.report.stats);
    print_problems(&output.report);
    Ok(())
}

#[cfg(feature = "neo4j")]
async fn load_graph(
    config: &zeitgraph_core::GraphStoreConfig,
    bundle: &zeitgraph_core::ExportBundle,
) -> Result<()> {
    use zeitgraph_core::export::{GraphStore, Neo4jStore};

    let store = Neo4jStore::from_config(config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.uri))?;
    store.load(bundle).await.context("Failed to load graph store")?;
    eprintln!("{} Loaded bundle into {}", style("✓").green(), config.uri);
    Ok(())
}

fn print_problems(report: &RunReport) {
    let stats = &report.stats;
    if stats.locations_without_coordinates > 0 {
        eprintln!(
            "{} {} locations have no coordinates",
            style("!").yellow(),
            stats.locations_without_coordinates
        );
    }
    if stats.times_without_dates > 0 {
        eprintln!(
            "{} {} time entities have no dates",
            style("!").yellow(),
            stats.times_without_dates
        );
    }

    let counts = [
        ("skipped files", report.skipped_files.len()),
        ("malformed mentions", report.malformed_mentions.len()),
        ("malformed relations", report.malformed_relations.len()),
        ("unresolved references", report.unresolved_references.len()),
        ("dropped contexts", report.dropped_contexts.len()),
        ("enrichment failures", report.enrichment_failures.len()),
    ];
    for (label, count) in counts.into_iter().filter(|(_, count)| *count > 0) {
        eprintln!("{} {count} {label}", style("!").yellow());
    }

    for skipped in &report.skipped_files {
        eprintln!("  {}: {}", skipped.path, skipped.error);
    }

    for reference in &report.unresolved_references {
        tracing::debug!(
            relation = %reference.relation_id,
            missing = %reference.missing_mention_id,
            "Rejected relation"
        );
    }
}
