//! Catalog inspection.

use tokio::runtime::Runtime;

use super::open_library;
use crate::config::Config;
use crate::db;
use crate::library::StreamTarget;

/// Print catalog counts as pretty JSON.
pub fn cmd_status(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let library = open_library(config).await?;
        let stats = db::catalog_stats(library.pool()).await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        Ok(())
    })
}

/// Print the file or URL a catalog path plays from, and the WebDAV user
/// attached to it.
pub fn cmd_resolve(rt: &Runtime, config: &Config, uri: &str) -> anyhow::Result<()> {
    rt.block_on(async {
        let library = open_library(config).await?;
        match library.stream_target(uri) {
            Some(StreamTarget::Local(path)) => println!("{}", path.display()),
            Some(StreamTarget::Remote { url, auth }) => match auth {
                Some(auth) => println!("{url} (as {})", auth.user),
                None => println!("{url}"),
            },
            None => anyhow::bail!("Not a catalog path: {uri}"),
        }
        Ok(())
    })
}
