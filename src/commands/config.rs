//! Config command handler.

use kbase::KbConfig;

use super::CmdResult;

/// Config command: prints the effective configuration as TOML.
pub fn cmd_config(config: &KbConfig) -> CmdResult {
    println!("# Database: {}", display_database(config));
    println!("{}", config.to_toml_string()?);
    Ok(())
}

fn display_database(config: &KbConfig) -> String {
    config
        .database_path()
        .map_or_else(|| "(none)".to_string(), |p| p.display().to_string())
}
