//! Operator commands: publishing revisions and setting weights.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use convoy_core::{ConvoyConfig, ServiceWeights, Unit};
use tracing::info;

/// Publish the units in a JSON file as one revision and print its hash.
pub async fn publish(config: &ConvoyConfig, units_path: &Path) -> anyhow::Result<()> {
    let units = read_units(units_path)?;
    let store = crate::open_store(config)?;
    let revision = convoy_agent::publish_revision(&store, &units).await?;
    println!("{}", revision.hash);
    Ok(())
}

/// Replace `service`'s weights with `<revision>=<weight>` pairs.
pub async fn weights(config: &ConvoyConfig, service: &str, pairs: &[String]) -> anyhow::Result<()> {
    let weights = parse_weights(pairs)?;
    let store = crate::open_store(config)?;
    info!(%service, weights = ?weights.as_map(), "setting weights");
    convoy_agent::set_weights(&store, service, weights).await?;
    Ok(())
}

fn read_units(path: &Path) -> anyhow::Result<Vec<Unit>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read units from {}", path.display()))?;
    let units: Vec<Unit> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of units", path.display()))?;
    if units.is_empty() {
        bail!("{} lists no units", path.display());
    }
    Ok(units)
}

fn parse_weights(pairs: &[String]) -> anyhow::Result<ServiceWeights> {
    let mut weights = BTreeMap::new();
    for pair in pairs {
        let (revision, weight) = pair
            .split_once('=')
            .with_context(|| format!("expected <revision>=<weight>, got `{pair}`"))?;
        let weight: u64 = weight
            .trim()
            .parse()
            .with_context(|| format!("invalid weight in `{pair}`"))?;
        let revision = revision.trim();
        if revision.is_empty() {
            bail!("empty revision in `{pair}`");
        }
        if weights.insert(revision.to_string(), weight).is_some() {
            bail!("revision {revision} given twice");
        }
    }
    Ok(ServiceWeights::new(weights)?)
}
