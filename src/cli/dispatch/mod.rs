//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the server action with its full
//! configuration.

use crate::cli::{
    actions::{server::Args, Action},
    commands,
};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);

    let dsn = matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let webhook_secret = matches
        .get_one::<String>(commands::ARG_WEBHOOK_SECRET)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --webhook-secret")?;

    let frontend_origin = matches
        .get_one::<String>(commands::ARG_FRONTEND_ORIGIN)
        .cloned()
        .context("missing required argument: --frontend-origin")?;

    let day_offset_minutes = matches
        .get_one::<i32>(commands::ARG_DAY_OFFSET)
        .copied()
        .unwrap_or(0);

    Ok(Action::Server(Args {
        port,
        dsn,
        webhook_secret,
        frontend_origin,
        day_offset_minutes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn dispatch_builds_server_args() {
        let matches = commands::new().get_matches_from(vec![
            "prepdesk",
            "--port",
            "8443",
            "--dsn",
            "postgres://user@localhost:5432/prepdesk",
            "--webhook-secret",
            "whsec_test",
            "--day-offset-minutes",
            "180",
        ]);

        let action = handler(&matches).expect("dispatch should succeed");
        let Action::Server(args) = action;
        assert_eq!(args.port, 8443);
        assert_eq!(args.dsn, "postgres://user@localhost:5432/prepdesk");
        assert_eq!(args.webhook_secret.expose_secret(), "whsec_test");
        assert_eq!(args.day_offset_minutes, 180);
    }

    #[test]
    fn dsn_can_come_from_environment() {
        temp_env::with_vars(
            [
                ("PREPDESK_DSN", Some("postgres://env@localhost/prepdesk")),
                ("PREPDESK_WEBHOOK_SECRET", Some("whsec_env")),
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["prepdesk"]);
                let action = handler(&matches).expect("dispatch should succeed");
                let Action::Server(args) = action;
                assert_eq!(args.dsn, "postgres://env@localhost/prepdesk");
                assert_eq!(args.webhook_secret.expose_secret(), "whsec_env");
            },
        );
    }
}
