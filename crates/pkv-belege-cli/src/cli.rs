//! Command line arguments.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pkv_belege_core::reconcile::ImportMode;

#[derive(Parser, Debug)]
#[command(
    name = "pkv-belege",
    version,
    about = "Receipts for private health insurance, kept offline",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List receipts of a year, newest first
    List {
        /// Defaults to the current year
        year: Option<i32>,
    },

    /// Add a receipt
    Add(RecordArgs),

    /// Replace date, amount and description of a receipt
    Edit {
        id: String,
        #[command(flatten)]
        record: RecordArgs,
    },

    /// Delete a receipt
    Delete { id: String },

    /// Totals of a year against the thresholds
    Overview {
        /// Defaults to the current year
        year: Option<i32>,
    },

    /// Show or change the thresholds
    Settings {
        /// Deductible in EUR
        #[arg(long, value_parser = parse_amount)]
        deductible: Option<f64>,

        /// Premium refund in EUR
        #[arg(long, value_parser = parse_amount)]
        reimbursement: Option<f64>,
    },

    /// Record count and age of the last backup
    Status,

    /// Write pkv-belege-backup-<date>.json
    Export {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Import a backup file
    Import {
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = ImportModeArg::Merge)]
        mode: ImportModeArg,
    },

    /// Offline cache of the application shell
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Version checks and updates
    #[command(subcommand)]
    Update(UpdateCommand),
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct RecordArgs {
    /// Receipt date (YYYY-MM-DD)
    #[arg(value_parser = parse_date)]
    pub date: NaiveDate,

    /// Amount in EUR, decimal comma or point
    #[arg(value_parser = parse_amount, allow_hyphen_values = true)]
    pub amount: f64,

    #[arg(required = true, num_args = 1..)]
    pub description: Vec<String>,
}

impl RecordArgs {
    pub fn description(&self) -> String {
        self.description.join(" ")
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportModeArg {
    /// Discard stored receipts and settings, take the backup's
    Replace,
    /// Update matching receipts, append the rest
    Merge,
    /// Append receipts under new ids
    Add,
}

impl From<ImportModeArg> for ImportMode {
    fn from(mode: ImportModeArg) -> Self {
        match mode {
            ImportModeArg::Replace => ImportMode::Replace,
            ImportModeArg::Merge => ImportMode::Merge,
            ImportModeArg::Add => ImportMode::Add,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CacheCommand {
    /// Install this version's cache generation
    Install,

    /// Fetch a resource through the cache
    Fetch {
        path: String,

        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,
    },

    /// Ask the active generation for its version
    Version,

    /// Delete the active generation's cache
    Clear,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq)]
pub enum UpdateCommand {
    /// Compare the installed version with the last one seen
    Check,

    /// Activate a waiting generation now
    Apply,

    /// Clear the cache and install this version afresh
    Refresh,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("invalid date (expected YYYY-MM-DD): {}", raw))
}

fn parse_amount(raw: &str) -> Result<f64, String> {
    raw.replace(',', ".")
        .parse::<f64>()
        .map_err(|_| format!("invalid amount: {}", raw))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(line: &str) -> Result<Command, clap::Error> {
        let args = std::iter::once("pkv-belege").chain(line.split_whitespace());
        Cli::try_parse_from(args).map(|cli| cli.command)
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_record_commands() {
        let Command::Add(record) = parse("add 2024-03-01 150,50 Zahnarzt Kontrolle").unwrap() else {
            panic!("expected add");
        };
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(record.amount, 150.5);
        assert_eq!(record.description(), "Zahnarzt Kontrolle");

        assert!(matches!(
            parse("edit 1700000000000 2024-03-01 180 Zahnarzt").unwrap(),
            Command::Edit { ref id, ref record } if id == "1700000000000" && record.amount == 180.0
        ));
        assert_eq!(parse("list 2024").unwrap(), Command::List { year: Some(2024) });
        assert_eq!(parse("overview").unwrap(), Command::Overview { year: None });
        assert!(parse("add 2024-03-01 150").is_err());
        assert!(parse("add 01.03.2024 150 Brille").is_err());
        assert!(parse("delete").is_err());
    }

    #[test]
    fn test_settings_flags() {
        assert_eq!(
            parse("settings --deductible 300 --reimbursement 450,5").unwrap(),
            Command::Settings {
                deductible: Some(300.0),
                reimbursement: Some(450.5),
            }
        );
        assert!(parse("settings --deductible").is_err());
        assert!(parse("settings --other 1").is_err());
    }

    #[test]
    fn test_import_modes() {
        assert_eq!(
            parse("import backup.json").unwrap(),
            Command::Import {
                file: PathBuf::from("backup.json"),
                mode: ImportModeArg::Merge,
            }
        );
        let Command::Import { mode, .. } = parse("import backup.json --mode add").unwrap() else {
            panic!("expected import");
        };
        assert_eq!(ImportMode::from(mode), ImportMode::Add);
        assert!(parse("import backup.json --mode overwrite").is_err());
        assert!(parse("import").is_err());
    }

    #[test]
    fn test_cache_and_update_commands() {
        assert_eq!(parse("cache install").unwrap(), Command::Cache(CacheCommand::Install));
        assert_eq!(
            parse("cache fetch ./index.html --navigate").unwrap(),
            Command::Cache(CacheCommand::Fetch {
                path: "./index.html".to_string(),
                navigate: true,
            })
        );
        assert_eq!(parse("update refresh").unwrap(), Command::Update(UpdateCommand::Refresh));
        assert!(parse("cache").is_err());
        assert!(parse("update now").is_err());
        assert!(parse("").is_err());
    }
}
