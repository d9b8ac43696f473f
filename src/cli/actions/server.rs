use crate::{api, cli::globals::GlobalArgs, clock::DayClock};
use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub webhook_secret: SecretString,
    pub frontend_origin: String,
    pub day_offset_minutes: i32,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to
/// start.
pub async fn execute(args: Args) -> Result<()> {
    let day_clock = DayClock::from_offset_minutes(args.day_offset_minutes)?;

    let globals = GlobalArgs::new(
        args.webhook_secret,
        args.frontend_origin,
        args.day_offset_minutes,
    );

    debug!("Global args: {:?}", globals);

    api::new(args.port, args.dsn, globals, day_clock).await
}
