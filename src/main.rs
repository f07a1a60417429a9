use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlaction::{Config, JsonLinesObserver, SqliteConnection};
use sqlaction_core::{
    Capitalization, Connection, TemplateAction, TemplateParameters, TemplateQuery, TemplateValue,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sqlaction")]
#[command(about = "Run SQL templates against a SQLite database", long_about = None)]
struct Args {
    /// Directory holding sqlaction.toml and .env
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Database file, overrides the configuration
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a SQL template and print its rows as JSON lines
    Query {
        /// Template text, e.g. "SELECT * FROM ARTIST WHERE ID IN (#bind($ids))"
        sql: String,

        /// Template parameter as name=value; values are parsed as JSON, else taken as text
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, TemplateValue)>,

        /// Rows to skip
        #[arg(long)]
        offset: Option<usize>,

        /// Maximum number of rows, 0 for no limit
        #[arg(long)]
        limit: Option<usize>,

        /// Stream rows through a live iterator instead of reading them all first
        #[arg(long)]
        stream: bool,

        /// Upper-case column names
        #[arg(long, conflicts_with = "lower")]
        upper: bool,

        /// Lower-case column names
        #[arg(long)]
        lower: bool,

        /// Log keys generated by inserts
        #[arg(long)]
        generated_keys: bool,
    },

    /// Run a file of semicolon separated statements
    Script {
        file: PathBuf,
    },
}

fn parse_param(raw: &str) -> Result<(String, TemplateValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    if name.is_empty() {
        return Err(format!("missing parameter name in '{}'", raw));
    }
    let json = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), TemplateValue::from_json(&json)))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqlaction=info,sqlaction_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load(&args.config_dir)?;
    if let Some(database) = args.database {
        config.database.path = database;
    }

    let conn = SqliteConnection::open(&config.database.path)
        .with_context(|| format!("opening {}", config.database.path.display()))?;
    tracing::info!("Using database {}", config.database.path.display());

    let result: anyhow::Result<()> = match args.command {
        Command::Query {
            sql,
            params,
            offset,
            limit,
            stream,
            upper,
            lower,
            generated_keys,
        } => {
            let mut metadata = config.metadata();
            if let Some(offset) = offset {
                metadata = metadata.with_offset(offset);
            }
            if let Some(limit) = limit {
                metadata = metadata.with_limit(limit);
            }
            if upper {
                metadata = metadata.with_capitalization(Capitalization::Upper);
            } else if lower {
                metadata = metadata.with_capitalization(Capitalization::Lower);
            }

            let parameters: TemplateParameters = params.into_iter().collect();
            let mut query = TemplateQuery::new(sql)
                .with_parameters(parameters)
                .with_metadata(metadata);
            if generated_keys {
                query = query.returning_generated_keys();
            }

            let stdout = std::io::stdout();
            let mut observer = JsonLinesObserver::new(stdout.lock(), stream);
            let action = TemplateAction::new(query, config.context());
            action.execute(&conn.handle(), &mut observer)?;
            let rows = observer.rows_written();
            observer.finish()?;
            tracing::info!("{} row(s) printed", rows);
            Ok(())
        }
        Command::Script { file } => {
            let script = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            conn.execute_script(&script)?;
            tracing::info!("Script {} executed", file.display());
            Ok(())
        }
    };

    // a streamed result may already have closed the connection
    if !conn.is_closed() {
        conn.close()?;
    }
    result
}
