//! `lsconverge facts` - show what the planners will branch on

use anyhow::Result;

use crate::Context;
use crate::cli::FactsArgs;
use crate::config::SiteConfig;
use crate::{detect, paths, ui};

pub fn run(ctx: &Context, args: FactsArgs) -> Result<()> {
    let (config, config_path) = SiteConfig::load(args.config.as_deref())?;
    let facts = detect::detect(&config.facts)?;
    let settings = config.settings(facts.kernel);

    if !ctx.quiet {
        ui::header("Host Facts");
    }
    ui::kv("kernel", facts.kernel.as_str());
    ui::kv("os_family", facts.os_family.as_str());
    ui::kv("package_provider", facts.provider().as_str());

    ui::section("Settings");
    ui::kv("home_dir", &settings.home_dir.display().to_string());
    ui::kv("staging_dir", &settings.staging_dir.display().to_string());
    ui::kv("user", &settings.user);
    match config_path {
        Some(path) => ui::kv("config", &path.display().to_string()),
        None => ui::kv(
            "config",
            &format!("(defaults; none in {})", paths::config_dir()?.display()),
        ),
    }

    if let Err(e) = facts.validate() {
        ui::warn(&e.to_string());
    }
    Ok(())
}
