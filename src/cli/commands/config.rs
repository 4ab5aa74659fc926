//! Configuration file commands.

use crate::config::{self, Config};

/// Save the effective configuration (file, environment and flags merged).
pub fn cmd_config_init(config: &Config) -> anyhow::Result<()> {
    let path = config::save(config)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Print the effective configuration as TOML, without the WebDAV password.
pub fn cmd_config_show(config: &Config) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if shown.webdav.password.is_some() {
        shown.webdav.password = Some("********".to_string());
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}
