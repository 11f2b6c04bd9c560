//! Collects carrier details on the terminal.

use async_trait::async_trait;
use log::warn;
use nmtether::backend::Wizard;
use nmtether::{AccessMethod, TechnologyFamily, WizardOutcome};
use std::io::{self, BufRead, Write};

/// A wizard that asks its questions on stdin/stdout.
///
/// Leaving the provider name empty cancels it.
#[derive(Debug, Default)]
pub struct TerminalWizard;

#[async_trait]
impl Wizard for TerminalWizard {
    async fn present(&self, family: TechnologyFamily) -> WizardOutcome {
        match tokio::task::spawn_blocking(move || ask(family, &mut io::stdin().lock())).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!("Could not read carrier details: {e}");
                WizardOutcome::Canceled
            }
            Err(e) => {
                warn!("Wizard prompt ended abnormally: {e}");
                WizardOutcome::Canceled
            }
        }
    }
}

fn ask(family: TechnologyFamily, input: &mut impl BufRead) -> io::Result<WizardOutcome> {
    println!();
    println!("Your phone has a {family} modem. Enter your mobile broadband details.");

    let Some(provider) = prompt(input, "Provider (empty to cancel)")? else {
        return Ok(WizardOutcome::Canceled);
    };

    let mut method = AccessMethod::new(family, provider);
    method.plan_name = prompt(input, "Plan")?;
    if family == TechnologyFamily::Gsm {
        method.gsm_apn = prompt(input, "APN")?;
    }
    method.username = prompt(input, "Username")?;
    method.password = prompt(input, "Password")?;

    Ok(WizardOutcome::Completed(method))
}

/// Reads one answer. Blank answers and end of input are `None`.
fn prompt(input: &mut impl BufRead, question: &str) -> io::Result<Option<String>> {
    print!("{question}: ");
    io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}
