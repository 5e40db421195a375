//! `-v`/`-q` flags controlling how much hostgate logs.
//!
//! Without flags only warnings and errors are shown:
//! - `-q` shows errors only
//! - `-v` adds info
//! - `-vv` adds debug
//! - `-vvv` adds trace

use std::fmt;

use log::{Level, LevelFilter};
use serde::Deserialize;

/// Position of the default level on the scale below
const DEFAULT_LEVEL: i8 = 1;

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Verbosity {
    /// Log more, pass several times for even more output
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet"
    )]
    verbose: u8,

    /// Log less, only errors are shown with `-q`
    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "verbose"
    )]
    quiet: u8,
}

impl Verbosity {
    pub(crate) const fn log_level(&self) -> Level {
        level_from_value(self.value())
    }

    pub(crate) fn log_level_filter(&self) -> LevelFilter {
        self.log_level().to_level_filter()
    }

    #[allow(clippy::cast_possible_wrap)]
    const fn value(&self) -> i8 {
        DEFAULT_LEVEL - (self.quiet as i8) + (self.verbose as i8)
    }
}

// Accepts level names such as "info" or "Warning" in the config file
impl<'de> Deserialize<'de> for Verbosity {
    #[allow(clippy::cast_sign_loss)]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        let level = match name.to_lowercase().as_str() {
            "error" => Level::Error,
            "warn" | "warning" => Level::Warn,
            "info" => Level::Info,
            "debug" => Level::Debug,
            "trace" => Level::Trace,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "invalid log level `{other}`"
                )));
            }
        };
        let value = value_from_level(level) - DEFAULT_LEVEL;
        Ok(if value < 0 {
            Verbosity {
                verbose: 0,
                quiet: value.unsigned_abs(),
            }
        } else {
            Verbosity {
                verbose: value as u8,
                quiet: 0,
            }
        })
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log_level())
    }
}

const fn value_from_level(level: Level) -> i8 {
    match level {
        Level::Error => 0,
        Level::Warn => 1,
        Level::Info => 2,
        Level::Debug => 3,
        Level::Trace => 4,
    }
}

const fn level_from_value(value: i8) -> Level {
    match value {
        i8::MIN..=0 => Level::Error,
        1 => Level::Warn,
        2 => Level::Info,
        3 => Level::Debug,
        _ => Level::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        verbose: Verbosity,
    }

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_level_is_warn() {
        assert_eq!(Verbosity::default().log_level(), Level::Warn);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from(["hostgate", "-vv"]);
        assert_eq!(cli.verbose.log_level(), Level::Debug);

        let cli = Cli::parse_from(["hostgate", "-qqq"]);
        assert_eq!(cli.verbose.log_level(), Level::Error);
    }

    #[test]
    fn test_deserialize_level_names() {
        #[derive(Deserialize)]
        struct File {
            verbose: Verbosity,
        }

        for (name, level) in [
            ("error", Level::Error),
            ("Warning", Level::Warn),
            ("info", Level::Info),
            ("TRACE", Level::Trace),
        ] {
            let file: File = toml::from_str(&format!("verbose = \"{name}\"")).unwrap();
            assert_eq!(file.verbose.log_level(), level);
        }

        assert!(toml::from_str::<File>("verbose = \"loud\"").is_err());
    }
}
