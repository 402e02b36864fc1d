//! rowtree - command line front end for B+Tree table files

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rowtree::access::{DuplicatePolicy, Record, RowId, TreeOptions, DEFAULT_ORDER};
use rowtree::catalog::Schema;
use rowtree::Table;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Build and inspect B+Tree table files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Maximum children per internal node. Fixed when a table is created
    #[arg(short, long, global = true)]
    order: Option<usize>,

    /// Fail on a row id that is already stored instead of keeping both
    #[arg(long, global = true)]
    reject_duplicates: bool,

    /// Fsync after every page write
    #[arg(long, global = true)]
    sync: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty table
    Create {
        table: PathBuf,

        /// Column definitions, e.g. "name:text(20),age:int,dept:short"
        #[arg(short, long)]
        columns: String,
    },
    /// Append the rows of a CSV file (first line is a header)
    Load { table: PathBuf, csv: PathBuf },
    /// Append one row, values given in column order
    Insert {
        table: PathBuf,

        #[arg(required = true, allow_hyphen_values = true)]
        values: Vec<String>,
    },
    /// Print records in row id order
    Scan {
        table: PathBuf,

        /// Start at this row id
        #[arg(long)]
        from: Option<RowId>,
    },
    /// Print one record
    Get { table: PathBuf, row_id: RowId },
    /// Print the shape of the tree
    Stats { table: PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    run(args)
}

fn run(args: Args) -> Result<()> {
    let duplicates = if args.reject_duplicates {
        DuplicatePolicy::Reject
    } else {
        DuplicatePolicy::Allow
    };
    let options = TreeOptions::default()
        .with_order(args.order.unwrap_or(DEFAULT_ORDER))
        .with_duplicates(duplicates)
        .with_sync_on_write(args.sync);

    match args.command {
        Command::Create { table, columns } => {
            let schema: Schema = columns
                .parse()
                .with_context(|| format!("Invalid column definitions '{}'", columns))?;
            let table = Table::create(&table, schema, options)
                .with_context(|| format!("Failed to create table {}", table.display()))?;
            println!(
                "Created {} ({}), {} records per leaf",
                table.path().display(),
                table.schema(),
                table.tree().max_records_per_leaf()
            );
        }
        Command::Load { table, csv } => {
            let mut table = open_table(&table, options, args.order)?;
            let file = File::open(&csv)
                .with_context(|| format!("Failed to open {}", csv.display()))?;
            let count = table
                .load_csv(BufReader::new(file))
                .with_context(|| format!("Failed to load {}", csv.display()))?;
            table.sync()?;
            println!("Loaded {} rows into {}", count, table.path().display());
        }
        Command::Insert { table, values } => {
            let mut table = open_table(&table, options, args.order)?;
            let row = table.parse_row(&values).context("Invalid row")?;
            let row_id = table.insert(row)?;
            table.sync()?;
            println!("Inserted row {} into {}", row_id, table.path().display());
        }
        Command::Scan { table, from } => {
            let table = open_table(&table, options, args.order)?;
            let scan = match from {
                Some(row_id) => table.scan_from(row_id)?,
                None => table.scan()?,
            };
            for record in scan {
                println!("{}", format_record(&table, &record?));
            }
        }
        Command::Get { table, row_id } => {
            let table = open_table(&table, options, args.order)?;
            match table.get(row_id)? {
                Some(record) => println!("{}", format_record(&table, &record)),
                None => bail!("Row {} not found", row_id),
            }
        }
        Command::Stats { table } => {
            let table = open_table(&table, options, args.order)?;
            println!("{}", table.statistics());
        }
    }

    Ok(())
}

/// Open a table with its stored order. An explicit `--order` must agree with it.
fn open_table(path: &Path, options: TreeOptions, order: Option<usize>) -> Result<Table> {
    let table = Table::open(path, options)
        .with_context(|| format!("Failed to open table {}", path.display()))?;
    let stored = table.tree().options().order;
    if let Some(order) = order {
        if order != stored {
            bail!(
                "{} was created with order {}, not {}",
                path.display(),
                stored,
                order
            );
        }
    }
    Ok(table)
}

fn format_record(table: &Table, record: &Record) -> String {
    let cells: Vec<String> = table
        .schema()
        .fields()
        .iter()
        .map(|field| match record.get(&field.name) {
            Some(value) => format!("{}={}", field.name, value),
            None => format!("{}=", field.name),
        })
        .collect();
    format!("{}\t{}", record.row_id(), cells.join("\t"))
}
