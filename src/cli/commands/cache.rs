//! Cache Command
//!
//! Inspect and maintain the response cache.
//!
//! Usage:
//!   codetutor cache stats
//!   codetutor cache prune
//!   codetutor cache clear

use crate::cli::ui::Output;
use crate::config::Config;
use crate::gateway::cache::open_cache;
use crate::types::Result;

pub fn stats(config: &Config) -> Result<()> {
    let cache = open_cache(&config.cache)?;
    let stats = cache.stats()?;
    let out = Output::new();

    out.section("Response Cache");
    out.field("Backend", config.cache.backend);
    out.field("Location", cache.location());
    out.field("Enabled", config.cache.enabled);
    out.field("TTL", format!("{}s", cache.ttl().as_secs()));
    out.field("Entries", stats.entries);
    out.field("Fresh", stats.fresh);
    out.field("Expired", stats.expired);
    if stats.legacy > 0 {
        out.warning(&format!(
            "{} legacy entries without timestamps (never served)",
            stats.legacy
        ));
    }
    Ok(())
}

pub fn prune(config: &Config) -> Result<()> {
    let pruned = open_cache(&config.cache)?.prune()?;
    Output::new().success(&format!("Pruned {} expired entries", pruned));
    Ok(())
}

pub fn clear(config: &Config) -> Result<()> {
    let cleared = open_cache(&config.cache)?.clear()?;
    Output::new().success(&format!("Cleared {} cache entries", cleared));
    Ok(())
}
