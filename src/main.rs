use std::env;
use std::io::{self, BufRead, Write};

use anyhow::{bail, Context};
use trackscape::collect::{Collector, CollectorConfig, JsonCatalog};
use trackscape::render::HtmlSink;
use trackscape::PipelineBuilder;

const CATALOG_VAR: &str = "TRACKSCAPE_CATALOG";
const OUTPUT_VAR: &str = "TRACKSCAPE_OUTPUT";
const DEFAULT_OUTPUT: &str = "trackscape.html";

fn prompt_query() -> anyhow::Result<String> {
    print!("Enter the artist's name to search and visualize songs: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read query from stdin")?;
    let query = line.trim().to_string();
    if query.is_empty() {
        bail!("no query given");
    }
    Ok(query)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let catalog_path = env::var(CATALOG_VAR)
        .with_context(|| format!("{} must point to a JSON track catalog", CATALOG_VAR))?;
    let output = env::var(OUTPUT_VAR).unwrap_or_else(|_| DEFAULT_OUTPUT.to_string());

    let catalog = JsonCatalog::from_path(&catalog_path)
        .with_context(|| format!("failed to load catalog {}", catalog_path))?;
    let collector = Collector::new(catalog, CollectorConfig::default())?;

    let query = prompt_query()?;
    let pipeline = PipelineBuilder::new()
        .title(format!(
            "PCA and t-SNE Visualization of Audio Features: {}",
            query
        ))
        .build()?;

    let mut sink = HtmlSink::new(&output);
    let (projection, rendered) = pipeline
        .run(&query, &collector, &mut sink)
        .with_context(|| format!("failed to visualize tracks for {:?}", query))?;
    rendered.with_context(|| format!("failed to write chart to {}", output))?;

    log::info!(
        "visualized {} tracks for {:?} in {}",
        projection.tracks.len(),
        query,
        sink.path().display()
    );
    Ok(())
}
