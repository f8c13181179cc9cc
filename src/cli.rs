use crate::config::loader::SupervisorConfig;
use crate::config::types::{LaunchSpec, LimitPolicy, LimitSet, RecordFormat};
use crate::exec::supervise;
use crate::report::ReportChannel;
use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "limitrun", author, version, about, long_about = None)]
struct Cli {
    /// Terminate the child if any limit cannot be installed
    #[arg(long)]
    strict: bool,

    /// Layout of the record written to REPORT_FD
    #[arg(long, value_enum)]
    record_format: Option<RecordFormat>,

    /// Descriptor the program may inherit (repeatable)
    #[arg(long = "keep-fd", value_name = "FD")]
    keep_fds: Vec<RawFd>,

    /// JSON configuration file (defaults to $LIMITRUN_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// CPU time limit in seconds
    #[arg(value_name = "CPU_SECS", value_parser = LimitSet::parse_value)]
    cpu_time: u64,

    /// Address space limit in bytes
    #[arg(value_name = "AS_BYTES", value_parser = LimitSet::parse_value)]
    address_space: u64,

    /// Largest file the program may write, in bytes
    #[arg(value_name = "FSIZE_BYTES", value_parser = LimitSet::parse_value)]
    file_size: u64,

    /// Descriptor that receives the result record
    #[arg(value_name = "REPORT_FD", allow_negative_numbers = true)]
    report_fd: RawFd,

    /// Program to run followed by its arguments
    #[arg(
        value_name = "PROGRAM",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<OsString>,
}

impl Cli {
    /// Layer command-line flags over the file configuration.
    fn apply_to(&self, config: &mut SupervisorConfig) {
        if self.strict {
            config.limit_policy = LimitPolicy::Strict;
        }
        if let Some(format) = self.record_format {
            config.record_format = format;
        }
        config.keep_fds.extend_from_slice(&self.keep_fds);
    }

    fn limits(&self) -> LimitSet {
        LimitSet::new(self.cpu_time, self.address_space, self.file_size)
    }
}

/// Insert `--` in front of the first positional so that nothing from the
/// limits onward is read as a limitrun option.
fn end_options_at_first_positional<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator,
    I::Item: Into<OsString>,
{
    let command = Cli::command();
    let takes_value = |flag: &str| {
        command.get_arguments().any(|arg| {
            arg.get_long() == Some(flag.trim_start_matches("--")) && arg.get_action().takes_values()
        })
    };

    let mut args = args.into_iter().map(Into::<OsString>::into);
    let mut out: Vec<OsString> = args.next().into_iter().collect();
    let mut pending_value = false;

    for arg in args.by_ref() {
        if pending_value {
            pending_value = false;
            out.push(arg);
            continue;
        }
        match arg.to_str() {
            Some("--") => {
                out.push(arg);
                break;
            }
            Some(flag) if flag.starts_with('-') => {
                pending_value = !flag.contains('=') && takes_value(flag);
                out.push(arg);
            }
            _ => {
                out.push(OsString::from("--"));
                out.push(arg);
                break;
            }
        }
    }
    out.extend(args);
    out
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // Usage errors exit 2 before anything is opened or forked.
    let cli = Cli::try_parse_from(end_options_at_first_positional(std::env::args_os()))
        .unwrap_or_else(|e| e.exit());

    let mut config = SupervisorConfig::load(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    log::debug!("effective configuration: {:?}", config);

    let channel = ReportChannel::open(cli.report_fd, config.record_format)?;
    let spec = LaunchSpec::from_command(cli.command.clone())?;
    let limits = cli.limits();

    let record = supervise(&spec, &limits, &config.spawn_options(), channel)?;
    log::info!("{:?}: {}", spec.program, record);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(end_options_at_first_positional(
            std::iter::once("limitrun").chain(args.iter().copied()),
        ))
    }

    #[test]
    fn positionals_in_fixed_order() {
        let cli = parse(&["2", "268435456", "1048576", "3", "sh", "-c", "echo ok"]).unwrap();
        assert_eq!(cli.limits(), LimitSet::new(2, 268_435_456, 1_048_576));
        assert_eq!(cli.report_fd, 3);
        assert_eq!(cli.command, vec!["sh", "-c", "echo ok"]);
        assert!(!cli.strict);
        assert_eq!(cli.record_format, None);
    }

    #[test]
    fn flags_after_program_belong_to_the_program() {
        let cli = parse(&["1", "1", "1", "3", "prog", "--strict", "-1"]).unwrap();
        assert!(!cli.strict);
        assert_eq!(cli.command, vec!["prog", "--strict", "-1"]);
    }

    #[test]
    fn options_precede_positionals() {
        let cli = parse(&[
            "--strict",
            "--record-format",
            "versioned",
            "--keep-fd",
            "5",
            "--keep-fd",
            "6",
            "unlimited",
            "0",
            "infinity",
            "4",
            "true",
        ])
        .unwrap();
        assert!(cli.strict);
        assert_eq!(cli.record_format, Some(RecordFormat::Versioned));
        assert_eq!(cli.keep_fds, vec![5, 6]);
        assert_eq!(cli.cpu_time, libc::RLIM_INFINITY as u64);
        assert_eq!(cli.address_space, 0);
    }

    #[test]
    fn missing_program_is_a_usage_error() {
        let err = parse(&["2", "268435456", "1048576", "3"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn unparsable_limit_is_a_usage_error() {
        let err = parse(&["two", "268435456", "1048576", "3", "true"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn options_after_the_limits_belong_to_the_program() {
        let cli = parse(&["1", "1", "1", "3", "--strict", "y"]).unwrap();
        assert!(!cli.strict);
        assert_eq!(cli.command, vec!["--strict", "y"]);

        let cli = parse(&["1", "1", "1", "3", "--keep-fd", "9", "--config", "c.json"]).unwrap();
        assert!(cli.keep_fds.is_empty());
        assert_eq!(cli.config, None);
        assert_eq!(cli.command, vec!["--keep-fd", "9", "--config", "c.json"]);
    }

    #[test]
    fn options_between_limits_are_not_options() {
        let err = parse(&["1", "--strict", "1", "1", "3", "true"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn option_values_are_not_mistaken_for_positionals() {
        let args = end_options_at_first_positional([
            "limitrun",
            "--keep-fd",
            "5",
            "--record-format=versioned",
            "--strict",
            "1",
            "2",
        ]);
        assert_eq!(
            args,
            vec![
                "limitrun",
                "--keep-fd",
                "5",
                "--record-format=versioned",
                "--strict",
                "--",
                "1",
                "2"
            ]
        );
    }

    #[test]
    fn negative_report_fd_reaches_validation() {
        let cli = parse(&["1", "1", "1", "-1", "true"]).unwrap();
        assert_eq!(cli.report_fd, -1);
    }

    #[test]
    fn flags_override_file_configuration() {
        let cli = parse(&["--strict", "--keep-fd", "7", "1", "1", "1", "3", "true"]).unwrap();
        let mut config = SupervisorConfig {
            limit_policy: LimitPolicy::BestEffort,
            record_format: RecordFormat::Versioned,
            keep_fds: vec![5],
        };
        cli.apply_to(&mut config);
        assert_eq!(config.limit_policy, LimitPolicy::Strict);
        assert_eq!(config.record_format, RecordFormat::Versioned);
        assert_eq!(config.keep_fds, vec![5, 7]);
    }
}
