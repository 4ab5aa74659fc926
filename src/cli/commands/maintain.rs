//! Maintenance passes from the command line.

use tokio::runtime::Runtime;

use super::open_library;
use crate::config::Config;
use crate::library::maintenance;

pub fn cmd_maintain(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let library = open_library(config).await?;
        let report = {
            let _guard = library.lock_catalog().await;
            maintenance::run_all(&library).await?
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    })
}
