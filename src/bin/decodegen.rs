use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use decodegen::config::GeneratorConfig;
use decodegen::emit::{DecodeTable, emit_rust, leaf_report};
use decodegen::isa::instruction::InstructionTable;
use decodegen::isa::tree::DEFAULT_DEPTH_CAP;
use decodegen::loader::load_path;
use decodegen::query::InstructionQuery;

/// decodegen - decoder generator for fixed-width instruction sets
#[derive(Parser, Debug)]
#[command(name = "decodegen", version, about = "Builds instruction decoders from encoding specs")]
struct Cli {
    /// Encoding spec file, directory of .enc files, or XML directory with an index.xml
    #[arg(short, long, global = true, default_value = "defs/a64")]
    spec: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query the instruction data loaded from the spec files
    Query(QueryArgs),
    /// Print the leaves of the decode forest
    Leaves(BuildArgs),
    /// Write a Rust decoder module
    Generate {
        #[command(flatten)]
        build: BuildArgs,
        /// Output file for the generated source
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Decode raw instruction words (hex, e.g. 0x91000420)
    Decode {
        #[command(flatten)]
        build: BuildArgs,
        #[arg(required = true)]
        words: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Recursion levels explored before a leaf is reported as exhausted
    #[arg(long, default_value_t = DEFAULT_DEPTH_CAP)]
    depth_cap: usize,

    /// Include alias encodings in the decode universe
    #[arg(short = 'a', long)]
    include_aliases: bool,

    /// Fail instead of warning when a leaf cannot be disambiguated
    #[arg(long)]
    reject_ambiguous: bool,
}

impl BuildArgs {
    fn config(&self) -> GeneratorConfig {
        GeneratorConfig {
            depth_cap: self.depth_cap,
            include_aliases: self.include_aliases,
            reject_ambiguous: self.reject_ambiguous,
        }
    }
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Output the number of results only
    #[arg(short = 'c', long)]
    count: bool,

    /// Include aliases in the results
    #[arg(short = 'a', long)]
    include_aliases: bool,

    /// Filter the instructions by their name
    #[arg(long = "q-name")]
    name: Option<String>,

    /// Filter the instructions by their file name
    #[arg(long = "q-filename")]
    file_name: Option<String>,

    /// Filter the instructions by mnemonic
    #[arg(long = "q-mnemonic")]
    mnemonic: Option<String>,

    /// Filter the instructions by their number of encodings
    #[arg(long = "q-encoding-count")]
    encoding_count: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    let table = load_path(&cli.spec)
        .with_context(|| format!("failed to load encoding specs from {}", cli.spec.display()))?;

    match cli.command {
        Command::Query(args) => run_query(&table, args),
        Command::Leaves(build) => {
            let forest = build.config().build_forest(&table)?;
            print!("{}", leaf_report(&forest));
            Ok(())
        }
        Command::Generate { build, out } => {
            let decoder = DecodeTable::build(&table, &build.config())?;
            fs::write(&out, emit_rust(&decoder))
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!("written to {} (fingerprint {})", out.display(), decoder.fingerprint_hex());
            Ok(())
        }
        Command::Decode { build, words } => {
            let decoder = DecodeTable::build(&table, &build.config())?;
            for text in &words {
                let word = parse_word(text)?;
                let listing = decoder.disassemble(&word.to_le_bytes());
                for line in listing {
                    println!("{line}");
                }
                if let Some(branch) = decoder.decode(word).and_then(|found| found.branch) {
                    println!("    branch: {branch}");
                }
            }
            Ok(())
        }
    }
}

fn run_query(table: &InstructionTable, args: QueryArgs) -> Result<()> {
    let query = InstructionQuery {
        name: args.name,
        file_name: args.file_name,
        mnemonic: args.mnemonic,
        encoding_count: args.encoding_count,
        include_aliases: args.include_aliases,
    };
    if query.mnemonic_looks_wrong() {
        warn!("Are you sure the query is correct? Mnemonics are listed in upper case.");
    }
    let found = query.run(table);
    if args.count {
        println!("{}", found.len());
        return Ok(());
    }
    for instruction in found {
        println!("{}", query.describe(table, instruction));
    }
    Ok(())
}

fn parse_word(text: &str) -> Result<u32> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(&digits.replace('_', ""), 16)
        .with_context(|| format!("'{text}' is not a 32-bit hex word"))
}
