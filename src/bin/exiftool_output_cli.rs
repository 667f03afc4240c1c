//! Prints the raw ExifTool tag table for one image.

use std::env;
use std::path::Path;
use std::process;

use exiftool_process::ExifToolParser;

const NAME_WIDTH: usize = 40;
const VALUE_WIDTH: usize = 30;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("exiftool_output_cli - print ExifTool output without tag translation");
        eprintln!("Usage: <image>");
        process::exit(-1);
    }

    let mut parser = ExifToolParser::new();
    parser.set_translations(false);

    if let Err(e) = parser.load(Path::new(&args[1])) {
        eprintln!("Failed to load {}: {e}", args[1]);
        process::exit(-1);
    }

    println!("Source File: {}", parser.current_parsed_path());

    let separator = "-".repeat(NAME_WIDTH + VALUE_WIDTH + 4);
    println!("{separator}");
    println!(
        "{:<name_width$} | {:<value_width$}",
        "ExifTool::group0.name",
        "String Value",
        name_width = NAME_WIDTH,
        value_width = VALUE_WIDTH
    );
    println!("{separator}");

    let mut rows: Vec<String> = parser
        .current_parsed_tags()
        .iter()
        .map(|(name, tag)| {
            let mut value = tag.value.clone();
            if value.chars().count() > VALUE_WIDTH {
                value = value.chars().take(VALUE_WIDTH - 3).collect::<String>() + "...";
            }
            format!(
                "{:<name_width$} | {:<value_width$}",
                simplify_name(name),
                value,
                name_width = NAME_WIDTH,
                value_width = VALUE_WIDTH
            )
        })
        .collect();
    rows.sort();

    for row in &rows {
        println!("{row}");
    }
    println!("{separator}");
}

/// Shortens a dotted tag name to its first and last segment.
fn simplify_name(name: &str) -> String {
    let first = name.split('.').next().unwrap_or(name);
    let last = name.rsplit('.').next().unwrap_or(name);
    format!("{first}.{last}")
}
