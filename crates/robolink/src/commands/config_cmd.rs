//! Config subcommand handlers.

use std::path::PathBuf;

use robolink_config::Settings;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let settings = robolink_config::load_settings(global.config.as_deref())?;
            let toml_text = toml::to_string_pretty(&settings)?;
            let out = output::render_single(global.output, &settings, |_| toml_text.clone())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", config_file(global).display());
            Ok(())
        }
        ConfigCommand::Init { force } => {
            let path = config_file(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            let written = robolink_config::save_settings(&Settings::default(), Some(&path))?;
            if !global.quiet {
                eprintln!("Wrote {}", written.display());
            }
            Ok(())
        }
    }
}

fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(robolink_config::config_path)
}
