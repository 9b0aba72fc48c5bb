//! `blockpad` command-line front end.
//!
//! # Responsibility
//! - Expose page creation, markdown import/export, snapshots and consistency
//!   checks over one database file.
//! - Keep all tree rules in `blockpad_core`; this binary only parses
//!   arguments and prints results.

use anyhow::{bail, Context, Result};
use blockpad_core::{
    blocks_to_markdown, default_log_level, init_logging, markdown_to_blocks, open_db,
    repair_page, replace_with_markdown, verify_page, BlockStore, ConsistencyReport, PageId,
    PageSnapshot, SqliteBlockStore,
};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(version, about = "Blockpad - hierarchical block documents in SQLite", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// SQLite database file (created and migrated when missing)
    #[arg(long, env = "BLOCKPAD_DB", default_value = "blockpad.db", global = true)]
    db: PathBuf,

    /// trace|debug|info|warn|error
    #[arg(long, env = "BLOCKPAD_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Directory for rolling log files; logging is off when unset
    #[arg(long, env = "BLOCKPAD_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a page with one empty block and print its id
    NewPage {
        #[arg(long, default_value = "")]
        title: String,

        /// Parent page id
        #[arg(long)]
        parent: Option<PageId>,
    },
    /// List pages as `id<TAB>title`
    Pages,
    /// Import a markdown file as blocks
    ImportMd {
        file: PathBuf,

        /// Target page; a new page named after the file is created when unset
        #[arg(long)]
        page: Option<PageId>,

        /// Replace the target page's blocks instead of appending
        #[arg(long)]
        replace: bool,
    },
    /// Export a page as markdown
    ExportMd {
        page: PageId,

        /// Output file; stdout when unset
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Write a page snapshot as JSON
    Snapshot {
        page: PageId,

        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Import a JSON snapshot as a new page and print its id
    Restore { file: PathBuf },
    /// Verify tree invariants of one page, or of every page
    Check {
        page: Option<PageId>,

        /// Rewrite broken references and positions
        #[arg(long)]
        repair: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    start_logging(cli.log_level.as_deref(), cli.log_dir.as_deref())?;

    let conn = open_db(&cli.db)
        .with_context(|| format!("failed to open database `{}`", cli.db.display()))?;
    let store = SqliteBlockStore::try_new(&conn)?;

    match cli.command {
        Commands::NewPage { title, parent } => {
            let page_id = store.create_page(&title, parent)?;
            println!("{page_id}");
        }
        Commands::Pages => {
            for page in store.list_pages()? {
                println!("{}\t{}", page.id, page.title);
            }
        }
        Commands::ImportMd {
            file,
            page,
            replace,
        } => {
            let markdown = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read `{}`", file.display()))?;
            let page_id = import_markdown(&store, &file, &markdown, page, replace)?;
            println!("{page_id}");
        }
        Commands::ExportMd { page, out } => {
            let markdown = blocks_to_markdown(&store, page)?;
            write_output(out.as_deref(), &markdown)?;
        }
        Commands::Snapshot { page, out } => {
            let json = store.export_page(page)?.to_json()?;
            write_output(out.as_deref(), &json)?;
        }
        Commands::Restore { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read `{}`", file.display()))?;
            let snapshot = PageSnapshot::from_json(&json)
                .with_context(|| format!("`{}` is not a page snapshot", file.display()))?;
            let page_id = store.import_page(&snapshot)?;
            println!("{page_id}");
        }
        Commands::Check { page, repair } => {
            let pages = match page {
                Some(page_id) => vec![page_id],
                None => store.list_pages()?.into_iter().map(|page| page.id).collect(),
            };
            let mut broken = 0;
            for page_id in pages {
                let report = if repair {
                    repair_page(&store, page_id)?
                } else {
                    verify_page(&store, page_id)?
                };
                print_report(&report, repair);
                if !report.is_consistent() {
                    broken += 1;
                }
            }
            if broken > 0 && !repair {
                bail!("{broken} page(s) violate tree invariants; rerun with --repair");
            }
        }
    }

    Ok(())
}

fn start_logging(level: Option<&str>, log_dir: Option<&Path>) -> Result<()> {
    let Some(log_dir) = log_dir else {
        return Ok(());
    };
    let log_dir = if log_dir.is_absolute() {
        log_dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(log_dir)
    };
    init_logging(level.unwrap_or(default_log_level()), &log_dir)?;
    info!("event=cli_start module=cli status=ok");
    Ok(())
}

fn import_markdown<S: BlockStore>(
    store: &S,
    file: &Path,
    markdown: &str,
    page: Option<PageId>,
    replace: bool,
) -> Result<PageId> {
    let Some(page_id) = page else {
        let title = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let page_id = store.atomically(|store| {
            let page_id = store.create_page(&title, None)?;
            replace_with_markdown(store, page_id, markdown)?;
            Ok(page_id)
        })?;
        return Ok(page_id);
    };

    if replace {
        replace_with_markdown(store, page_id, markdown)?;
    } else {
        markdown_to_blocks(store, page_id, markdown)?;
    }
    Ok(page_id)
}

fn write_output(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write `{}`", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn print_report(report: &ConsistencyReport, repaired: bool) {
    if report.is_consistent() {
        println!("{}\tok\t{} blocks", report.page_id, report.block_count);
        return;
    }
    let status = if repaired { "repaired" } else { "broken" };
    println!(
        "{}\t{}\t{} violations",
        report.page_id,
        status,
        report.violations.len()
    );
    for violation in &report.violations {
        println!("  {violation}");
    }
}
