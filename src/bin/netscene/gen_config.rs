use std::path::Path;

use anyhow::Result;
use netscene::{scenario::ScenarioConfig, Config};

pub(super) fn gen_config(output: &Path) -> Result<()> {
    ScenarioConfig::default().save(output)
}
