//! CLI command implementations.

pub mod validate;

use anyhow::Result;
use hookgraph_config::SystemConfig;
use hookgraph_config::taskclusterrc::{ConfigIdentity, build_config_url};
use hookgraph_core::exchange::Exchanges;

pub fn reference(config: &SystemConfig, prefix: Option<String>) -> Result<()> {
    let prefix = prefix.unwrap_or_else(|| config.exchange_prefix.clone());
    let reference = Exchanges::github()?.reference(&prefix);
    println!("{}", serde_json::to_string_pretty(&reference)?);
    Ok(())
}

pub fn config_url(config: &SystemConfig, organization: &str, repository: &str, branch: &str) {
    let identity = ConfigIdentity {
        organization,
        repository,
        branch,
    };
    println!("{}", build_config_url(&identity, &config.raw_host));
}
