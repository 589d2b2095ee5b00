use colored::Colorize;
use nimbus_config::LoadedConfig;

pub fn show(loaded: &LoadedConfig) -> anyhow::Result<()> {
    match &loaded.source {
        Some(path) => println!("# {}", path.display().to_string().cyan()),
        None => println!("# {}", "no config file found, defaults in effect".dimmed()),
    }
    print!("{}", serde_yaml::to_string(&loaded.config)?);
    Ok(())
}
