//! Interactive first-run setup: sign in, pick students, store the password.

use dialoguer::{Input, MultiSelect, Select};
use secrecy::{ExposeSecret, SecretString};

use smarttag_config::StudentEntry;
use smarttag_core::{Credentials, DiscoveredStudent};

use crate::cli::{GlobalOpts, SetupArgs};
use crate::error::{CliError, prompt_err};

use super::util;

pub async fn handle(args: SetupArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (path, mut cfg) = util::load(global)?;
    eprintln!("SMART Tag setup");
    eprintln!("   Config path: {}\n", path.display());

    // 1. Account
    let email = match args.email.or_else(|| cfg.account.email.clone()) {
        Some(email) => email,
        None => Input::new()
            .with_prompt("Portal email")
            .interact_text()
            .map_err(prompt_err)?,
    };
    let password = rpassword::prompt_password("Password: ").map_err(prompt_err)?;
    if email.trim().is_empty() || password.is_empty() {
        return Err(CliError::Validation {
            field: "credentials".into(),
            reason: "email and password cannot be empty".into(),
        });
    }
    let password = SecretString::from(password);

    // 2. Sign in and list the account's students
    let credentials = Credentials::new(email.trim(), password.clone());
    let coordinator = util::coordinator_with(&cfg, credentials, global)?;
    let spinner = util::spinner("Signing in...", global.quiet);
    let found = coordinator.discover_students().await;
    spinner.finish_and_clear();
    let found = found?;

    // 3. Pick students
    let chosen = if found.is_empty() {
        eprintln!("   No students are linked to this account yet.");
        Vec::new()
    } else if args.all {
        found
    } else {
        pick_students(found, &cfg.students)?
    };

    // 4. Store the password
    let email = email.trim().to_owned();
    cfg.account.email = Some(email.clone());
    let use_keyring = !args.plaintext && {
        let choices = &[
            "Store in system keyring (recommended)",
            "Save to config file (plaintext)",
        ];
        Select::new()
            .with_prompt("Where to store the password?")
            .items(choices)
            .default(0)
            .interact()
            .map_err(prompt_err)?
            == 0
    };
    if use_keyring {
        smarttag_config::store_password_keyring(&email, &password)?;
        cfg.account.password = None;
        eprintln!("   ✓ Password stored in system keyring");
    } else {
        cfg.account.password = Some(password.expose_secret().to_owned());
    }

    // 5. Write config, keeping polling flags of students already tracked
    cfg.students = chosen
        .into_iter()
        .map(|s| {
            let enabled = cfg.student(s.id.as_str()).is_none_or(|e| e.enabled);
            StudentEntry::from(&s.into_student().with_enabled(enabled))
        })
        .collect();
    smarttag_config::save_config(&cfg, &path)?;

    eprintln!("\n✓ Configuration written to {}", path.display());
    eprintln!("   Tracking {} student(s)", cfg.students.len());
    eprintln!("\n   Try it: smarttag status");
    Ok(())
}

fn pick_students(
    found: Vec<DiscoveredStudent>,
    tracked: &[StudentEntry],
) -> Result<Vec<DiscoveredStudent>, CliError> {
    let labels: Vec<String> = found.iter().map(DiscoveredStudent::label).collect();
    let defaults: Vec<bool> = if tracked.is_empty() {
        vec![true; found.len()]
    } else {
        found
            .iter()
            .map(|s| tracked.iter().any(|t| t.id == s.id.as_str()))
            .collect()
    };

    let picked = MultiSelect::new()
        .with_prompt("Students to track (space to toggle, enter to confirm)")
        .items(&labels)
        .defaults(&defaults)
        .interact()
        .map_err(prompt_err)?;

    Ok(found
        .into_iter()
        .enumerate()
        .filter(|(i, _)| picked.contains(i))
        .map(|(_, s)| s)
        .collect())
}
