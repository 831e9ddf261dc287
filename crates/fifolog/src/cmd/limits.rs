use fifolog_frame::HEADER_LEN;
use serde::Serialize;

use crate::cmd::{parse_terminator, LimitsArgs};
use crate::exit::{CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_report, OutputFormat, Report};

#[derive(Serialize)]
struct LimitsOutput {
    schema_id: &'static str,
    os: &'static str,
    atomic_write_limit: usize,
    pipe_capacity: usize,
    header_len: usize,
    terminator_len: usize,
    atomic_budget: usize,
}

impl Report for LimitsOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("os", self.os.to_string()),
            ("atomic_write_limit", self.atomic_write_limit.to_string()),
            ("pipe_capacity", self.pipe_capacity.to_string()),
            ("header_len", self.header_len.to_string()),
            ("terminator_len", self.terminator_len.to_string()),
            ("atomic_budget", self.atomic_budget.to_string()),
        ]
    }
}

pub fn run(args: LimitsArgs, format: OutputFormat) -> CliResult<i32> {
    let terminator = parse_terminator(&args.terminator)?;
    let atomic_write_limit = fifolog_transport::atomic_write_limit();
    let atomic_budget = budget(atomic_write_limit, terminator.len()).ok_or_else(|| {
        CliError::new(
            USAGE,
            format!(
                "atomic write limit {atomic_write_limit} leaves no room after a {}-byte terminator",
                terminator.len()
            ),
        )
    })?;

    let output = LimitsOutput {
        schema_id: "https://schemas.fifolog.dev/cli/v1/limits.schema.json",
        os: std::env::consts::OS,
        atomic_write_limit,
        pipe_capacity: fifolog_transport::pipe_capacity(),
        header_len: HEADER_LEN,
        terminator_len: terminator.len(),
        atomic_budget,
    };
    print_report(&output, format);

    Ok(SUCCESS)
}

fn budget(limit: usize, terminator_len: usize) -> Option<usize> {
    limit
        .checked_sub(HEADER_LEN + terminator_len)
        .filter(|budget| *budget > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_subtracts_header_and_terminator() {
        assert_eq!(budget(4096, 1), Some(4090));
        assert_eq!(budget(512, 2), Some(505));
        assert_eq!(budget(6, 1), None);
    }
}
