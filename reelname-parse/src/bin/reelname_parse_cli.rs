use clap::Parser;
use reelname_parse::{MediaDescriptor, parse, parse_with_context};
use serde::Serialize;
use std::io::{self, BufRead};

/// A CLI tool to parse media filenames into JSON descriptors.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Filenames to parse. If none are given, one filename per line is read from stdin.
    names: Vec<String>,

    /// Parent directory name used when a filename alone is not enough.
    #[arg(short, long)]
    dir: Option<String>,

    /// Pretty-print the JSON output.
    #[arg(short, long)]
    pretty: bool,
}

#[derive(Serialize)]
struct ParsedName<'a> {
    input: &'a str,
    descriptor: MediaDescriptor,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let names: Vec<String> = if args.names.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<Vec<_>>>()?
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .collect()
    } else {
        args.names
    };

    let parsed: Vec<ParsedName> = names
        .iter()
        .map(|name| ParsedName {
            input: name,
            descriptor: match &args.dir {
                Some(dir) => parse_with_context(name, Some(dir)),
                None => parse(name),
            },
        })
        .collect();

    let json = if args.pretty {
        serde_json::to_string_pretty(&parsed)
    } else {
        serde_json::to_string(&parsed)
    }
    .map_err(io::Error::other)?;

    println!("{json}");
    Ok(())
}
