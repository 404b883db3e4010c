use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use jparque::btree::DEFAULT_PAGE_SIZE;
use jparque::dump::{self, DumpOptions, FileType};

#[derive(Parser)]
#[command(name = "jparque")]
#[command(author, version, about = "JParque storage file inspection tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display information about a B+Tree file's structure
    Info {
        /// Path to a JParque B+Tree file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Page size the file was created with
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,

        /// Show detailed per-role page statistics
        #[arg(short, long)]
        verbose: bool,
    },

    /// Dump a B+Tree file's pages to a human-readable text file
    Dump {
        /// Path to a JParque B+Tree file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output file path (default: <file>.dump.txt, or stdout with --stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Page size the file was created with
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,

        /// Dump specific page(s) by id - can be specified multiple times
        #[arg(short = 'p', long)]
        page: Option<Vec<u64>>,

        /// Render the dump as JSON
        #[arg(long)]
        json: bool,

        /// Write the dump to stdout instead of a file
        #[arg(long)]
        stdout: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info {
            file,
            page_size,
            verbose,
        } => {
            let data = std::fs::read(&file)?;
            match dump::detect_file_type(&data) {
                FileType::BTreeFile => dump::print_file_info(&file, page_size, verbose)?,
                FileType::ColumnarFile => dump::print_columnar_info(&file, verbose)?,
                FileType::Unknown => {
                    anyhow::bail!(
                        "Unrecognized file format. Expected a JParque B+Tree or columnar file."
                    );
                }
            }
        }

        Commands::Dump {
            file,
            output,
            page_size,
            page,
            json,
            stdout,
        } => {
            let options = DumpOptions { pages: page, json };

            if stdout {
                print!("{}", dump::dump_to_string(&file, page_size, &options)?);
            } else {
                let output_path = output.unwrap_or_else(|| {
                    let mut path = file.clone();
                    let extension = if json { "dump.json" } else { "dump.txt" };
                    let new_name = format!(
                        "{}.{}",
                        path.file_stem().and_then(|s| s.to_str()).unwrap_or("file"),
                        extension
                    );
                    path.set_file_name(new_name);
                    path
                });
                dump::dump_to_file(&file, page_size, &output_path, &options)?;
                println!("Dump written to: {}", output_path.display());
            }
        }
    }

    Ok(())
}
