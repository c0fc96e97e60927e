//! SCM Compiler CLI
//!
//! The `scmc` command drives the front-end: syntax checking, token dumps and
//! IR dumps. Code generation belongs to later stages and is not wired here.

use clap::{Parser, Subcommand};
use scmc::diag::{ConsoleReporter, DiagKind, Diagnostic};
use scmc::scanner::Category;
use scmc::{Arena, ParseFailure, Preprocessor, Scanner, SourceFile};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scmc")]
#[command(version = scmc::VERSION)]
#[command(about = "Mission script compiler front-end", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a script for syntax errors
    Check {
        /// Input file to check
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Tokenize a script and print its tokens
    Tokenize {
        /// Input file to tokenize
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Parse a script and print the lowered IR
    Parse {
        /// Input file to parse
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn load(input: &PathBuf) -> miette::Result<SourceFile> {
    SourceFile::load(input)
        .map_err(|e| miette::miette!("failed to read {}: {}", input.display(), e))
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { input } => {
            let file = load(&input)?;
            let reporter = ConsoleReporter::new(&file);
            let arena = Arena::new();
            let mut parser =
                scmc::Parser::new(Scanner::new(Preprocessor::new(&file)), &arena, &reporter);

            let mut statements = 0usize;
            while !parser.eof() {
                match parser.parse_statement() {
                    Ok(ir) => {
                        if !ir.is_empty() {
                            statements += 1;
                        }
                    }
                    Err(ParseFailure::Statement) => parser.skip_current_line(),
                    Err(ParseFailure::Fatal) => break,
                }
            }

            if reporter.error_count() > 0 {
                return Err(miette::miette!("found {} error(s)", reporter.error_count()));
            }
            println!("No errors found! ({} statements)", statements);
            Ok(())
        }

        Commands::Tokenize { input } => {
            let file = load(&input)?;
            let mut scanner = Scanner::new(Preprocessor::new(&file));

            loop {
                match scanner.eof() {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(err) => {
                        let diag =
                            Diagnostic::error(DiagKind::Lexical, err.span(), err.to_string());
                        eprintln!("{}", scmc::diag::render(&file, &diag));
                        break;
                    }
                }
                match scanner.next_token() {
                    Ok(token) => {
                        if token.category == Category::Eol {
                            scanner.advance_line();
                            continue;
                        }
                        println!(
                            "{:>4}..{:<4} {:16} {:?}",
                            token.span.begin,
                            token.span.end,
                            format!("{:?}", token.category),
                            token.text
                        );
                    }
                    Err(err) => {
                        let diag =
                            Diagnostic::error(DiagKind::Lexical, err.span(), err.to_string());
                        eprintln!("{}", scmc::diag::render(&file, &diag));
                        scanner.advance_line();
                    }
                }
            }
            Ok(())
        }

        Commands::Parse { input } => {
            let file = load(&input)?;
            let reporter = ConsoleReporter::new(&file);
            let arena = Arena::new();
            let mut parser =
                scmc::Parser::new(Scanner::new(Preprocessor::new(&file)), &arena, &reporter);

            while !parser.eof() {
                match parser.parse_statement() {
                    Ok(ir) => {
                        for node in ir.iter() {
                            println!("{}", node);
                        }
                    }
                    Err(ParseFailure::Statement) => parser.skip_current_line(),
                    Err(ParseFailure::Fatal) => break,
                }
            }

            if reporter.error_count() > 0 {
                return Err(miette::miette!("found {} error(s)", reporter.error_count()));
            }
            Ok(())
        }
    }
}
