use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use flight_loader::runner::{
    AbortedRun, AuthMode, ConnectionTarget, DEFAULT_BATCH_SIZE, DEFAULT_POSTGRES_PORT,
    DEFAULT_TABLE_NAME, LoadArgs, plan_load, run_load,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Clone)]
#[command(version, about = "Batch loader for the cleaned 2024 flight dataset")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Load a cleaned flight CSV into the target table
    Load {
        /// Path to the cleaned source file
        #[arg(short, long)]
        source: PathBuf,

        /// Target table name
        #[arg(short, long, default_value = DEFAULT_TABLE_NAME)]
        table: String,

        /// Rows per batch; each batch is committed in its own transaction
        #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Keep existing rows instead of emptying the table first
        #[arg(long)]
        no_truncate: bool,

        /// Create the table from the built-in schema if it doesn't exist
        #[arg(long)]
        create_table: bool,

        /// Field delimiter (single character, or \t)
        #[arg(short, long, default_value = ",")]
        delimiter: String,

        #[command(flatten)]
        target: TargetArgs,

        /// Count rows and show the batch plan without connecting
        #[arg(long)]
        dry_run: bool,

        /// Quiet mode - minimal output, only show summary
        #[arg(short, long)]
        quiet: bool,
    },
}

#[derive(Clone, Args)]
struct TargetArgs {
    /// SQLite database file (created if missing)
    #[arg(long, conflicts_with_all = ["host", "database", "username", "password"])]
    sqlite: Option<PathBuf>,

    /// PostgreSQL server host
    #[arg(long, requires = "database")]
    host: Option<String>,

    /// PostgreSQL server port
    #[arg(long, default_value_t = DEFAULT_POSTGRES_PORT)]
    port: u16,

    /// PostgreSQL database name
    #[arg(long, requires = "host")]
    database: Option<String>,

    /// Username; omit along with --password for trusted authentication
    #[arg(short, long, requires = "password")]
    username: Option<String>,

    /// Password for --username
    #[arg(short, long, requires = "username")]
    password: Option<String>,
}

impl TargetArgs {
    fn into_target(self) -> anyhow::Result<ConnectionTarget> {
        if let Some(path) = self.sqlite {
            return Ok(ConnectionTarget::Sqlite { path });
        }

        let (Some(host), Some(database)) = (self.host, self.database) else {
            anyhow::bail!("Specify a target: --sqlite <path>, or --host <host> --database <name>");
        };
        let auth = match (self.username, self.password) {
            (Some(username), Some(password)) => AuthMode::Credentials { username, password },
            _ => AuthMode::Trusted,
        };

        Ok(ConnectionTarget::Postgres {
            host,
            port: self.port,
            database,
            auth,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Load {
            source,
            table,
            batch_size,
            no_truncate,
            create_table,
            delimiter,
            target,
            dry_run,
            quiet,
        } => {
            init_tracing(quiet);

            let load_args = LoadArgs {
                source_path: source,
                delimiter,
                target: target.into_target()?,
                table_name: table,
                batch_size,
                truncate_before_load: !no_truncate,
                create_table_if_missing: create_table,
                quiet,
            };

            if dry_run {
                return print_plan(&load_args).await;
            }
            run_loader(load_args).await?;
        }
    }
    Ok(())
}

fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if quiet {
        EnvFilter::new("flight_loader=warn,sqlx=off")
    } else {
        EnvFilter::new("flight_loader=info,sqlx=off")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn print_plan(args: &LoadArgs) -> anyhow::Result<()> {
    let plan = plan_load(args).await?;

    println!("DRY RUN MODE - No data will be loaded");
    println!();
    println!("Configuration:");
    println!("  Source: {}", args.source_path.display());
    println!("  Target: {}", plan.target);
    println!("  Table: {}", plan.table_name);
    println!("  Truncate before load: {}", args.truncate_before_load);
    println!("  Rows: {}", plan.total_rows);
    println!("  Batch size: {}", plan.batch_size);
    println!("  Batches: {}", plan.total_batches);
    if let Some(ddl) = plan.create_table_sql {
        println!();
        println!("Table DDL:");
        println!("{}", ddl);
    }
    println!();
    println!("To execute, run without --dry-run");
    Ok(())
}

async fn run_loader(args: LoadArgs) -> anyhow::Result<()> {
    if !args.quiet {
        println!("Flight Data Loader");
        println!("==================");
        println!("Source: {}", args.source_path.display());
        println!("Target: {}", args.target);
        println!("Table: {}", args.table_name);
        println!("Batch size: {}", args.batch_size);
        println!();
    }

    // First Ctrl-C stops the run between batches; committed batches are kept
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received, stopping after the current batch...");
            on_signal.cancel();
        }
    });

    let result = match run_load(args, cancel).await {
        Ok(result) => result,
        Err(e) => {
            if let Some(aborted) = e.downcast_ref::<AbortedRun>() {
                eprintln!();
                eprintln!("Load Aborted");
                eprintln!("============");
                eprintln!("Run ID: {}", aborted.run_id);
                eprintln!("Batches committed: {}", aborted.batches_committed);
                eprintln!("Rows committed: {}", aborted.rows_committed);
                eprintln!("Duration: {:.2}s", aborted.duration.as_secs_f64());
                eprintln!();
            }
            return Err(e).context("Flight data load failed");
        }
    };

    println!();
    println!("Load Summary");
    println!("============");
    println!("Run ID: {}", result.run_id);
    println!("Batches committed: {}", result.batches_committed);
    println!("Rows committed: {}", result.rows_committed);
    println!("Rows estimated: {}", result.total_rows_estimate);
    println!("Duration: {:.2}s", result.duration.as_secs_f64());
    println!(
        "Throughput: {:.2} rows/sec",
        result.rows_committed as f64 / result.duration.as_secs_f64().max(f64::EPSILON)
    );
    if let (Some(p50), Some(p90), Some(p99)) = result.batch_time_percentiles_ms {
        println!("Batch time: p50 {}ms, p90 {}ms, p99 {}ms", p50, p90, p99);
    }

    Ok(())
}
