use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};

use minibasic as basic;

use basic::block;
use basic::evaluator::Evaluator;
use basic::exec::Runtime;
use basic::scanner::Scanner;
use basic::token::Token;

#[derive(ClapParser, Debug)]
#[command(version, about = "BASIC-dialect script interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file as a single expression, printing each token
    Tokenize { filename: Option<PathBuf> },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate {
        filename: Option<PathBuf>,

        /// Print the result as JSON instead of the display form
        #[arg(long)]
        json: bool,
    },

    /// Runs input from a file as a program
    Run { filename: Option<PathBuf> },
}

/// Reads the contents of a file into a String
fn read_file(filename: PathBuf) -> Result<String> {
    info!("Reading file: {:?}", filename);
    let file = File::open(&filename).context(format!("Failed to open file {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut buf = String::new();

    let bytes = reader
        .read_to_string(&mut buf)
        .context(format!("Failed to read file {:?}", filename))?;

    info!("Read {} bytes from {:?}", bytes, filename);

    Ok(buf)
}

fn init_logger() -> Result<()> {
    // Create or open the log file
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    // Configure env_logger to write to file with module and source line
    Builder::new()
        .format(|buf, record| {
            // Strip 'minibasic::' from module path
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("minibasic::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match args.commands {
        Commands::Tokenize { filename } => match filename {
            Some(filename) => {
                info!("Running Tokenize subcommand");
                let source = read_file(filename)?;
                let rt = Runtime::new();
                let mut scanner = Scanner::new(source.trim(), 1);
                let mut unary_legal = true;

                loop {
                    match scanner.next_token(&rt.ops, unary_legal) {
                        Ok(Some(token)) => {
                            debug!("Scanned token: {}", token);
                            unary_legal = matches!(token, Token::Unary(_) | Token::Binary(_));
                            println!("{}", token);
                        }

                        Ok(None) => break,

                        Err(e) => {
                            debug!("Tokenization debug: {}", e);
                            eprintln!("{}", e);
                            std::process::exit(65);
                        }
                    }
                }

                info!("Tokenization completed successfully");
            }
            None => {
                info!("No filepath provided for Tokenize");

                println!("No input filepath was provided. Exiting...");

                std::process::exit(0);
            }
        },

        Commands::Evaluate { filename, json } => match filename {
            Some(filename) => {
                info!("Running Evaluate subcommand");

                let source = read_file(filename)?;
                let mut rt = Runtime::new();
                let root = rt.root();
                let mut evaluator = Evaluator::new(source.trim(), 1);

                match evaluator.evaluate(&mut rt, root) {
                    Ok(value) => {
                        debug!("Evaluated to: {}", value);
                        if json {
                            println!("{}", serde_json::to_string(&value)?);
                        } else {
                            println!("{}", value);
                        }
                    }

                    Err(e) => {
                        debug!("Evaluation debug: {}", e);
                        eprintln!("{}", e);
                        std::process::exit(if e.is_runtime() { 70 } else { 65 });
                    }
                }

                info!("Evaluate subcommand completed");
            }

            None => {
                info!("No filepath provided for Evaluate");
                println!("No input filepath was provided. Exiting...");
                std::process::exit(0);
            }
        },

        Commands::Run { filename } => match filename {
            Some(filename) => {
                info!("Running Run subcommand");
                let source = read_file(filename)?;

                info!("Provided input:\n {}", source);

                let statements = match block::parse_program(&source) {
                    Ok(statements) => statements,
                    Err(e) => {
                        debug!("Parse debug: {}", e);
                        eprintln!("{}", e);
                        std::process::exit(65);
                    }
                };

                info!("Parsed {} statements", statements.len());

                let mut rt = Runtime::new();
                let root = rt.root();

                match rt.execute(root, &statements) {
                    Ok(()) => {
                        info!("Program executed successfully");
                    }

                    Err(e) => {
                        debug!("Runtime debug: {}", e);
                        eprintln!("{}", e);
                        std::process::exit(70);
                    }
                }
            }

            None => {
                info!("No filepath provided for Run");
                println!("No input filepath was provided. Exiting...");
                std::process::exit(0);
            }
        },
    }

    Ok(())
}
