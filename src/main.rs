use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use bids_select::data::loader::{load_table, save_table};
use bids_select::{
    bids_name, get_data_selection, ss_to_path, sss_to_source, Axis, BidsNameOptions,
    SelectionConfig,
};

#[derive(Parser)]
#[command(name = "bids-select", about = "Select and name scans in raw scanner output")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a selection pass over a directory of measurements
    Select {
        #[arg(long)]
        root: PathBuf,
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Include criterion, e.g. `task=CogB,JogB`
        #[arg(long = "match", value_name = "KEY=VALUES")]
        include: Vec<String>,
        /// Exclude criterion, e.g. `subjects=4001`
        #[arg(long, value_name = "KEY=VALUES")]
        exclude: Vec<String>,
        #[arg(long = "measurement")]
        measurements: Vec<String>,
        #[arg(long = "exclude-measurement")]
        exclude_measurements: Vec<String>,
        #[arg(long)]
        count_runs: bool,
        #[arg(long)]
        jobs: Option<usize>,
        /// Where to write the table (.csv, .json or .parquet)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the canonical name for a (subject, session)
    Name {
        #[arg(long)]
        table: PathBuf,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        session: String,
        #[arg(long = "extra", default_values_t = vec!["acquisition".to_string()])]
        extra_keys: Vec<String>,
        #[arg(long)]
        suffix: Option<String>,
        #[arg(long, default_value = ".nii.gz")]
        extension: String,
    },
    /// Print the container path for a (subject, session)
    Path {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        session: String,
    },
    /// Fill a `{subject}`/`{session}`/`{scan}` path template
    Source {
        #[arg(long)]
        template: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        session: String,
        #[arg(long, default_value = "")]
        scan: String,
        #[arg(long)]
        group_by: Option<Axis>,
    },
}

/// Parse repeated `key=v1,v2` arguments into a criteria map.
fn parse_criteria(args: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut out = BTreeMap::new();
    for arg in args {
        let Some((key, values)) = arg.split_once('=') else {
            bail!("Expected KEY=VALUES, got '{arg}'");
        };
        let values: Vec<String> = values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect();
        out.insert(key.trim().to_string(), values);
    }
    Ok(out)
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Select {
            root,
            config,
            include,
            exclude,
            measurements,
            exclude_measurements,
            count_runs,
            jobs,
            output,
        } => {
            let mut cfg = match config {
                Some(path) => SelectionConfig::from_path(&path)?,
                None => SelectionConfig::default(),
            };
            cfg.criteria.include.extend(parse_criteria(&include)?);
            cfg.criteria.exclude.extend(parse_criteria(&exclude)?);
            cfg.measurements.extend(measurements);
            cfg.exclude_measurements.extend(exclude_measurements);
            cfg.count_runs |= count_runs;
            if let Some(jobs) = jobs {
                cfg.jobs = jobs;
            }

            let selection = get_data_selection(&root, &cfg)
                .with_context(|| format!("selecting scans under {}", root.display()))?;
            println!(
                "{} scan(s) selected, {} measurement(s) skipped",
                selection.table.len(),
                selection.report.skipped.len()
            );
            for (subject, session) in selection.table.subject_sessions() {
                let scans = selection.table.rows_for(&subject, &session).count();
                println!("  {}: {scans} scan(s)", ss_to_path(&subject, &session));
            }
            for diagnostic in &selection.report.diagnostics {
                println!("warning: {diagnostic}");
            }
            if let Some(output) = output {
                save_table(&selection.table, &output)
                    .with_context(|| format!("writing {}", output.display()))?;
            }
        }
        Command::Name {
            table,
            subject,
            session,
            extra_keys,
            suffix,
            extension,
        } => {
            let table = load_table(&table)
                .with_context(|| format!("loading {}", table.display()))?;
            let options = BidsNameOptions {
                extra_keys,
                extension,
                suffix,
            };
            if let Some(name) = bids_name(&subject, &session, &table, &options) {
                println!("{name}");
            }
        }
        Command::Path { subject, session } => println!("{}", ss_to_path(&subject, &session)),
        Command::Source {
            template,
            subject,
            session,
            scan,
            group_by,
        } => println!(
            "{}",
            sss_to_source(&template, &subject, &session, &scan, group_by)?
        ),
    }
    Ok(())
}
