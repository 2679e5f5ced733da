// config.rs — Initialize and show the user configuration.

use ic_session::{boot_settings, UserConfig};

pub async fn execute() -> anyhow::Result<()> {
    let settings = boot_settings()?;
    let path = settings.home.join("config.json");

    if !path.exists() {
        std::fs::create_dir_all(&settings.home)?;
        let default = serde_json::to_string_pretty(&UserConfig::default())?;
        std::fs::write(&path, default)?;
        eprintln!("wrote default config to {}", path.display());
    }

    println!("config: {}", path.display());
    println!("{}", std::fs::read_to_string(&path)?);
    Ok(())
}
