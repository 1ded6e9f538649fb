use log::info;
use r2plus1d_model::R3dConfig;
use std::error::Error;
use std::fs;
use std::path::Path;

/// Load and validate a network config from a JSON file.
pub fn load_config(path: &str) -> Result<R3dConfig, Box<dyn Error>> {
    let json = fs::read_to_string(Path::new(path))?;
    let config: R3dConfig = serde_json::from_str(&json)?;
    let depth = config.validate()?;
    info!("loaded {} config from {} ({} classes)", depth, path, config.num_class);
    Ok(config)
}

/// Save a network config to a JSON file.
pub fn save_config(config: &R3dConfig, path: &str) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(config)?;
    fs::write(Path::new(path), json)?;
    Ok(())
}
