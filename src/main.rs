use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::process;

use anyhow::Context;
use clap::{arg, command, value_parser, Arg, ArgMatches, Command};
use regex_syntax::ast::parse::ParserBuilder;
use regex_syntax::hir::translate::TranslatorBuilder;
use yansi::Paint;

use regex_thompson::{Hir, MatcherMemory, Postfix, Regex, RegexBuilder};

const EXIT_ERROR: i32 = 1;

fn pattern_args() -> [Arg; 3] {
    [
        arg!(<PATTERN> "Regular expression"),
        arg!(--postfix "PATTERN is already in postfix form, e.g. `ab.c.`")
            .conflicts_with("syntax"),
        arg!(--syntax "Parse PATTERN with regex-syntax instead of the built-in translator"),
    ]
}

fn cli() -> Command {
    command!()
        .arg_required_else_help(true)
        .subcommand_required(true)
        .arg(
            arg!(--"nest-limit" <DEPTH>)
                .help("Maximum group nesting depth")
                .value_parser(value_parser!(usize))
                .global(true),
        )
        .arg(
            arg!(--"size-limit" <STATES>)
                .help("Maximum number of NFA states")
                .value_parser(value_parser!(usize))
                .global(true),
        )
        .subcommands(vec![
            Command::new("postfix")
                .about("Print the postfix form of a pattern")
                .args(pattern_args()),
            Command::new("dot")
                .about("Output DOT (Graphviz) representation of the NFA")
                .args(pattern_args()),
            Command::new("match")
                .about("Match a pattern against one or more inputs")
                .args(pattern_args())
                .arg(
                    arg!(<INPUT>... "Inputs to match against the whole pattern")
                        .value_parser(value_parser!(OsString)),
                )
                .arg(
                    arg!(--"chunk-size" <N>)
                        .help("Feed input in chunks of N bytes")
                        .value_parser(value_parser!(u64).range(1..)),
                )
                .arg(arg!(--debug "Print matcher state after each chunk")),
        ])
}

/// Parse `pattern` with regex-syntax in byte mode.
fn parse_hir(pattern: &str) -> anyhow::Result<Hir> {
    let ast = ParserBuilder::new()
        .build()
        .parse(pattern)
        .context("failed to parse pattern")?;
    TranslatorBuilder::new()
        .unicode(false)
        .utf8(false)
        .build()
        .translate(pattern, &ast)
        .context("failed to translate pattern")
}

fn builder(args: &ArgMatches) -> RegexBuilder {
    let mut builder = RegexBuilder::new();
    if let Some(&limit) = args.get_one::<usize>("nest-limit") {
        builder.nest_limit(limit);
    }
    builder.size_limit(args.get_one::<usize>("size-limit").copied());
    builder
}

fn postfix(args: &ArgMatches, builder: &RegexBuilder) -> anyhow::Result<Postfix> {
    let pattern = args
        .get_one::<String>("PATTERN")
        .context("missing PATTERN")?;
    if args.get_flag("postfix") {
        return Ok(Postfix::from_bytes(pattern.as_bytes()));
    }
    if args.get_flag("syntax") {
        let hir = parse_hir(pattern)?;
        return Postfix::from_hir(&hir).with_context(|| format!("failed to lower `{}`", pattern));
    }
    builder
        .translate(pattern)
        .with_context(|| format!("failed to translate `{}`", pattern))
}

fn compile(args: &ArgMatches) -> anyhow::Result<Regex> {
    let mut builder = builder(args);
    let postfix = postfix(args, &builder)?;
    builder
        .build_postfix(&postfix)
        .with_context(|| format!("failed to compile postfix `{}`", postfix))
}

fn exec_postfix(args: &ArgMatches) -> anyhow::Result<bool> {
    let postfix = postfix(args, &builder(args))?;
    println!("{}", postfix);
    Ok(true)
}

fn exec_dot(args: &ArgMatches) -> anyhow::Result<bool> {
    let regex = compile(args)?;
    let mut out = io::stdout().lock();
    regex.to_dot(&mut out)?;
    out.flush()?;
    Ok(true)
}

/// Returns `false` if any input is rejected.
fn exec_match(args: &ArgMatches) -> anyhow::Result<bool> {
    let regex = compile(args)?;
    let chunk_size = args.get_one::<u64>("chunk-size").map(|&n| n as usize);
    let debug = args.get_flag("debug");
    let inputs = args
        .get_many::<OsString>("INPUT")
        .context("missing INPUT")?;

    eprintln!("states: {}", regex.state_count());
    eprintln!("memory_size: {} bytes", regex.memory_size());

    let mut memory = MatcherMemory::default();
    let mut all_matched = true;
    for input in inputs {
        let bytes = input.as_encoded_bytes();
        let mut matcher = memory.matcher(&regex);

        if debug {
            eprintln!("--- input: {:?} ---", input);
            eprintln!("[init] {:#?}", matcher);
        }

        let chunk_size = chunk_size.unwrap_or(bytes.len()).max(1);
        for (i, chunk) in bytes.chunks(chunk_size).enumerate() {
            matcher.chunk(chunk);
            if debug {
                eprintln!(
                    "[after chunk #{} {:?}] {:#?}",
                    i,
                    String::from_utf8_lossy(chunk),
                    matcher
                );
            }
        }

        if matcher.finish() {
            println!("  {}  {:?}", "MATCH".green(), input);
        } else {
            println!("  {}  {:?}", "NO MATCH".red(), input);
            all_matched = false;
        }
    }

    Ok(all_matched)
}

fn main() {
    env_logger::init();

    // Keep escape codes out of redirected output.
    if !io::stdout().is_terminal() {
        yansi::disable();
    }

    let args = cli().get_matches();

    let result = match args.subcommand() {
        Some(("postfix", args)) => exec_postfix(args),
        Some(("dot", args)) => exec_dot(args),
        Some(("match", args)) => exec_match(args),
        _ => unreachable!(),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_ERROR),
        Err(err) => {
            eprintln!("{} {:?}", "error:".red().bold(), err);
            process::exit(EXIT_ERROR);
        }
    }
}
