//! `spindle config` — Print configuration as TOML.

use spindle_config::AppConfig;

pub fn show(config: &AppConfig, default: bool) {
    if default {
        println!("# Default configuration (~/.spindle/config.toml)");
        print!("{}", AppConfig::default_toml());
        return;
    }

    println!(
        "# Effective configuration ({})",
        AppConfig::config_dir().join("config.toml").display()
    );
    print!("{}", config.to_toml());
}
