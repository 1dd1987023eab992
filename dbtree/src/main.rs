//! Terminal browser for live database schemas.
//!
//! Discovers every catalog, table and column on the server through driver
//! metadata, prints the result as a tree, and fetches the values of any
//! column on demand.
//!
//! # Security Guarantees
//! - Read-only sessions
//! - Passwords are never logged; URLs are redacted before they are shown
//! - Table names are quoted in every statement

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dbtree::browse::run_browse;
use dbtree::render::{
    TreeFormat, describe_error, describe_failure, leaf_columns, render_hierarchy,
};
use dbtree_core::error::redact_database_url;
use dbtree_core::{
    ColumnRef, ConnectionConfig, Credentials, DriverKind, FetchOptions, SchemaBrowser,
    init_logging,
};
use std::io::Write;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dbtree")]
#[command(about = "Browse catalogs, tables and columns of a live database")]
#[command(version)]
#[command(long_about = "
dbtree - schema browser

Discovers catalogs, tables and columns through driver metadata only, with no
schema knowledge built in, and fetches the values of any column as text.

SUPPORTED DRIVERS:
- MySQL / MariaDB (mysql://)
- SQLite directory, one file per catalog (sqlite:///dir/catalog.db)

EXAMPLES:
  dbtree --url mysql://root@localhost/pets tree
  dbtree --host db.local --catalog pets --prompt-password column pets dogs name
  dbtree --url sqlite:///var/lib/pets/pets.db browse
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the initial catalog and disconnect
    Test,
    /// Discover and print the full hierarchy
    Tree {
        /// Output format
        #[arg(long, value_enum, default_value_t = TreeFormat::Outline)]
        format: TreeFormat,
    },
    /// Fetch every value of one column
    Column {
        catalog: String,
        table: String,
        column: String,
    },
    /// Discover the hierarchy, then fetch columns selected on stdin
    Browse,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DriverArg {
    Mysql,
    Sqlite,
}

impl From<DriverArg> for DriverKind {
    fn from(value: DriverArg) -> Self {
        match value {
            DriverArg::Mysql => Self::MySql,
            DriverArg::Sqlite => Self::Sqlite,
        }
    }
}

#[derive(Args)]
struct ConnectionArgs {
    /// Connection URL; overrides the individual connection flags
    #[arg(
        long,
        env = "DBTREE_URL",
        global = true,
        help = "Connection string (credentials will be sanitized in logs)"
    )]
    url: Option<String>,

    /// Driver used when no URL is given
    #[arg(long, value_enum, default_value = "mysql", global = true)]
    driver: DriverArg,

    /// Server host, or the catalog directory for SQLite
    #[arg(long, default_value = "localhost", global = true)]
    host: String,

    #[arg(long, global = true)]
    port: Option<u16>,

    /// Catalog probed at startup
    #[arg(long, default_value = "pets", global = true)]
    catalog: String,

    #[arg(long, default_value = "root", global = true)]
    user: String,

    /// Password; prefer the environment variable or the prompt
    #[arg(long, env = "DBTREE_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Ask for the password on the terminal
    #[arg(long, global = true)]
    prompt_password: bool,

    /// Text shown for NULL values
    #[arg(long, default_value = "NULL", global = true)]
    null_text: String,
}

impl ConnectionArgs {
    fn prompt_for_password(&self) -> anyhow::Result<Option<String>> {
        if !self.prompt_password {
            return Ok(None);
        }
        eprint!("Password: ");
        std::io::stderr()
            .flush()
            .context("Failed to flush stderr before reading password")?;
        let password = rpassword::read_password().context("Failed to read password")?;
        Ok(Some(password))
    }

    /// Resolves configuration and credentials from the flags.
    ///
    /// Password precedence: prompt, then URL, then `--password` /
    /// `DBTREE_PASSWORD`.
    fn resolve(&self) -> anyhow::Result<(ConnectionConfig, Credentials)> {
        let prompted = self.prompt_for_password()?;

        let Some(url) = &self.url else {
            let mut config = ConnectionConfig::new(self.host.clone())
                .with_driver(self.driver.into())
                .with_initial_catalog(self.catalog.clone())
                .with_username(self.user.clone());
            config.port = self.port;
            config.validate()?;

            let password = prompted.or_else(|| self.password.clone());
            let credentials = Credentials::new(self.user.clone(), password);
            return Ok((config, credentials));
        };

        let config = ConnectionConfig::from_url(url)
            .with_context(|| format!("Invalid connection URL {}", redact_database_url(url)))?;
        let mut credentials = Credentials::from_url(url)?;
        if credentials.username().is_empty() {
            credentials = credentials.with_username(config.username.clone());
        }
        let fallback = if credentials.has_password() {
            None
        } else {
            self.password.clone()
        };
        if let Some(password) = prompted.or(fallback) {
            credentials = Credentials::new(credentials.username().to_string(), Some(password));
        }
        Ok((config, credentials))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    let (config, credentials) = cli.connection.resolve()?;
    info!("Target: {}", config);

    let browser = SchemaBrowser::from_config(config, credentials)?
        .with_fetch_options(FetchOptions::default().with_null_text(cli.connection.null_text.clone()));

    let succeeded = match cli.command.unwrap_or(Command::Tree {
        format: TreeFormat::Outline,
    }) {
        Command::Test => test_connection(&browser).await,
        Command::Tree { format } => print_tree(&browser, format).await?,
        Command::Column {
            catalog,
            table,
            column,
        } => print_column(&browser, ColumnRef::new(catalog, table, column)).await,
        Command::Browse => browse(&browser).await?,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

/// Probes the initial catalog.
async fn test_connection(browser: &SchemaBrowser) -> bool {
    info!("Testing database connection...");
    match browser.probe().await {
        Ok(()) => {
            println!("Connection successful");
            true
        }
        Err(e) => {
            error!("Connection test failed: {}", e);
            eprintln!("{}", describe_error(&e));
            false
        }
    }
}

/// Prints the hierarchy; discovery failures go to stderr.
async fn print_tree(browser: &SchemaBrowser, format: TreeFormat) -> anyhow::Result<bool> {
    let hierarchy = browser.build_hierarchy().await;

    print!("{}", render_hierarchy(&hierarchy, format)?);
    if format == TreeFormat::Json {
        println!();
    }
    for failure in &hierarchy.failures {
        eprintln!("{}", describe_failure(failure));
    }

    Ok(hierarchy.is_complete())
}

/// Prints one column's values, newline-joined.
async fn print_column(browser: &SchemaBrowser, column: ColumnRef) -> bool {
    match browser
        .fetch_column_text(&column.catalog, &column.table, &column.column)
        .await
    {
        Ok(text) => {
            if !text.is_empty() {
                println!("{}", text.to_text());
            }
            true
        }
        Err(e) => {
            eprintln!("{}", describe_error(&e));
            false
        }
    }
}

async fn browse(browser: &SchemaBrowser) -> anyhow::Result<bool> {
    let hierarchy = browser.build_hierarchy().await;
    for failure in &hierarchy.failures {
        eprintln!("{}", describe_failure(failure));
    }

    let columns = leaf_columns(&hierarchy);
    if columns.is_empty() {
        eprintln!("No columns discovered");
        return Ok(false);
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_browse(browser, &columns, stdin, tokio::io::stdout()).await?;
    Ok(true)
}
