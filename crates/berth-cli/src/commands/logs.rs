//! `berth logs`: print a service's captured output.

use berth_common::config::RuntimeConfig;
use clap::Args;

use super::Context;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Service name.
    pub service: String,

    /// Only print the last N lines.
    #[arg(short = 'n', long)]
    pub tail: Option<usize>,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the service is not in the descriptor or its log
/// cannot be read.
pub fn execute(ctx: &Context, args: &LogsArgs) -> anyhow::Result<()> {
    let engine = ctx.engine(RuntimeConfig::default())?;
    let logs = engine.logs(&args.service)?;

    if logs.is_empty() {
        println!("No logs available for service: {}", args.service);
        return Ok(());
    }
    print!("{}", tail(&logs, args.tail));
    Ok(())
}

/// Keeps the last `n` lines of `logs`, or all of them.
fn tail(logs: &str, n: Option<usize>) -> String {
    let Some(n) = n else {
        return logs.to_string();
    };
    let lines: Vec<&str> = logs.lines().collect();
    let start = lines.len().saturating_sub(n);
    let mut out = lines[start..].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        let logs = "one\ntwo\nthree\n";
        assert_eq!(tail(logs, Some(2)), "two\nthree\n");
        assert_eq!(tail(logs, Some(10)), logs);
        assert_eq!(tail(logs, None), logs);
        assert_eq!(tail(logs, Some(0)), "");
    }
}
