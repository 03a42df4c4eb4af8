//! `conductor cron` subcommands.

use anyhow::{Context, Result, bail};
use chrono::Utc;

use conductor_scheduler::{CronExpression, parse_timezone};

pub(crate) fn cron_next(expression: &str, count: usize, timezone: &str) -> Result<()> {
    let cron = CronExpression::parse(expression)
        .with_context(|| format!("Invalid cron expression '{}'", expression))?;
    let tz = parse_timezone(timezone)?;

    let upcoming = cron.upcoming(Utc::now(), &tz, count);
    if upcoming.is_empty() {
        bail!("'{}' has no fire time in the search horizon", expression);
    }

    for time in upcoming {
        println!("{}  ({})", time.with_timezone(&tz).to_rfc3339(), time.to_rfc3339());
    }
    Ok(())
}

pub(crate) fn cron_validate(expression: &str) -> Result<()> {
    match CronExpression::parse(expression) {
        Ok(cron) => {
            println!("'{}' is valid", cron);
            Ok(())
        }
        Err(e) => bail!("'{}' is invalid: {}", expression, e),
    }
}
