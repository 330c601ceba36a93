//! Config subcommand handlers.

use secrecy::SecretString;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::{CliError, prompt_err};
use crate::output;

use super::util;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&util::config_path(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Show => {
            let (_, mut cfg) = util::load(global)?;
            if cfg.account.password.is_some() {
                cfg.account.password = Some("********".into());
            }
            let out = output::render_single(
                global.output,
                &cfg,
                |c| format!("{c:#?}"),
                |c| c.account.email.clone().unwrap_or_default(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let (path, cfg) = util::load(global)?;
            let email = cfg.account.email.ok_or_else(|| CliError::NoAccount {
                path: path.display().to_string(),
            })?;
            let password =
                rpassword::prompt_password(format!("Password for {email}: ")).map_err(prompt_err)?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }
            smarttag_config::store_password_keyring(&email, &SecretString::from(password))?;
            if !global.quiet {
                eprintln!("✓ Password stored in system keyring");
            }
            Ok(())
        }
    }
}
