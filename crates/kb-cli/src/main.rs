use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "kb")]
#[command(about = "Task board CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> local -> ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Board lifecycle
    Board {
        #[command(subcommand)]
        cmd: BoardCmd,
    },

    /// Columns within a board
    Column {
        #[command(subcommand)]
        cmd: ColumnCmd,
    },

    /// Tasks within a column
    Task {
        #[command(subcommand)]
        cmd: TaskCmd,
    },

    /// Check that a board and every one of its columns have dense positions
    Verify {
        #[arg(long)]
        board: String,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum BoardCmd {
    /// Create a board and print its id.
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        title: String,
    },
    /// List an owner's boards, newest first.
    List {
        #[arg(long)]
        owner: String,
    },
    /// Print a board with its columns and tasks as JSON.
    Show {
        #[arg(long)]
        id: String,
    },
    Rename {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
    },
    /// Delete a board with all its columns and tasks.
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum ColumnCmd {
    /// Append a column to a board.
    Add {
        #[arg(long)]
        board: String,
        #[arg(long)]
        title: String,
    },
    /// Move a column to `index` within `board`.
    Move {
        #[arg(long)]
        id: String,
        #[arg(long)]
        board: String,
        #[arg(long, allow_negative_numbers = true)]
        index: i64,
    },
    /// Remove a column and its tasks.
    Remove {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum TaskCmd {
    /// Append a task to a column.
    Add {
        #[arg(long)]
        column: String,
        #[arg(long)]
        content: String,
    },
    /// Move a task to `index` within `column`.
    Move {
        #[arg(long)]
        id: String,
        #[arg(long)]
        column: String,
        #[arg(long, allow_negative_numbers = true)]
        index: i64,
    },
    Remove {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let ctx = commands::Ctx::connect().await?;
            match cmd {
                DbCmd::Status => {
                    let s = kb_db::status(&ctx.pool).await?;
                    println!("db_ok={} has_board_tables={}", s.ok, s.has_board_tables);
                }
                DbCmd::Migrate => {
                    kb_db::migrate(&ctx.pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = kb_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Board { cmd } => match cmd {
            BoardCmd::Create { owner, title } => {
                commands::board::create(&commands::Ctx::connect().await?, &owner, &title).await?
            }
            BoardCmd::List { owner } => {
                commands::board::list(&commands::Ctx::connect().await?, &owner).await?
            }
            BoardCmd::Show { id } => {
                let id = commands::parse_uuid("board id", &id)?;
                commands::board::show(&commands::Ctx::connect().await?, id).await?
            }
            BoardCmd::Rename { id, title } => {
                let id = commands::parse_uuid("board id", &id)?;
                commands::board::rename(&commands::Ctx::connect().await?, id, &title).await?
            }
            BoardCmd::Delete { id } => {
                let id = commands::parse_uuid("board id", &id)?;
                commands::board::delete(&commands::Ctx::connect().await?, id).await?
            }
        },

        Commands::Column { cmd } => match cmd {
            ColumnCmd::Add { board, title } => {
                let board = commands::parse_uuid("board id", &board)?;
                let ctx = commands::Ctx::connect().await?;
                commands::items::add(&ctx, kb_reorder::Collection::Columns, board, &title).await?
            }
            ColumnCmd::Move { id, board, index } => {
                let id = commands::parse_uuid("column id", &id)?;
                let target = commands::move_target("board id", &board, index)?;
                let ctx = commands::Ctx::connect().await?;
                commands::items::move_to(&ctx, kb_reorder::Collection::Columns, id, target).await?
            }
            ColumnCmd::Remove { id } => {
                let id = commands::parse_uuid("column id", &id)?;
                let ctx = commands::Ctx::connect().await?;
                commands::items::remove(&ctx, kb_reorder::Collection::Columns, id).await?
            }
        },

        Commands::Task { cmd } => match cmd {
            TaskCmd::Add { column, content } => {
                let column = commands::parse_uuid("column id", &column)?;
                let ctx = commands::Ctx::connect().await?;
                commands::items::add(&ctx, kb_reorder::Collection::Tasks, column, &content).await?
            }
            TaskCmd::Move { id, column, index } => {
                let id = commands::parse_uuid("task id", &id)?;
                let target = commands::move_target("column id", &column, index)?;
                let ctx = commands::Ctx::connect().await?;
                commands::items::move_to(&ctx, kb_reorder::Collection::Tasks, id, target).await?
            }
            TaskCmd::Remove { id } => {
                let id = commands::parse_uuid("task id", &id)?;
                let ctx = commands::Ctx::connect().await?;
                commands::items::remove(&ctx, kb_reorder::Collection::Tasks, id).await?
            }
        },

        Commands::Verify { board } => {
            let board = commands::parse_uuid("board id", &board)?;
            commands::board::verify(&commands::Ctx::connect().await?, board).await?
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays parseable `key=value` lines.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}
