//! folio - page-sized sections from EPUB books

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use folio::{Config, CssMode, Reader, Section};

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Split EPUB books into page-sized sections", long_about = None)]
#[command(after_help = "EXAMPLES:
    folio book.epub -i                    Show book metadata
    folio book.epub -m 2000 -p 3          Print the fourth section, 2000 bytes of text per section
    folio book.epub -m 2000 --all --json  Dump every section as JSON
    folio book.epub --cover cover.jpg     Extract the cover image")]
struct Cli {
    /// Input EPUB file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Maximum bytes of text per section (0 keeps entries whole)
    #[arg(short, long, value_name = "N", default_value_t = 0)]
    max_content: usize,

    /// How stylesheets are treated
    #[arg(long, value_enum, default_value_t = CssMode::Keep)]
    css: CssMode,

    /// Include the markup-free text of each section
    #[arg(short, long)]
    text: bool,

    /// Section index to print
    #[arg(short, long, value_name = "N", conflicts_with = "all")]
    page: Option<usize>,

    /// Print every section
    #[arg(short, long)]
    all: bool,

    /// Emit sections as JSON
    #[arg(long)]
    json: bool,

    /// Show book metadata
    #[arg(short, long)]
    info: bool,

    /// Write the cover image to this file
    #[arg(long, value_name = "OUT")]
    cover: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = Config::new()
        .with_max_content(cli.max_content)
        .with_text_content(cli.text)
        .with_css_mode(cli.css);
    let mut reader = Reader::open(&cli.input, config).map_err(|e| e.to_string())?;

    if cli.info {
        return show_info(cli, &reader);
    }

    if let Some(out) = &cli.cover {
        let cover = reader
            .cover_image()
            .map_err(|e| e.to_string())?
            .ok_or("book has no cover image")?;
        std::fs::write(out, cover).map_err(|e| e.to_string())?;
        if cli.page.is_none() && !cli.all {
            return Ok(());
        }
    }

    if cli.all {
        let mut sections = Vec::new();
        while let Some(section) = reader.next_section().map_err(|e| e.to_string())? {
            if cli.json {
                sections.push(section);
            } else {
                print_section(&section);
            }
        }
        if cli.json {
            let json = serde_json::to_string_pretty(&sections).map_err(|e| e.to_string())?;
            println!("{json}");
        }
        return Ok(());
    }

    let section = reader
        .section(cli.page.unwrap_or(0))
        .map_err(|e| e.to_string())?;
    if cli.json {
        let json = serde_json::to_string_pretty(&section).map_err(|e| e.to_string())?;
        println!("{json}");
    } else {
        print_section(&section);
    }
    Ok(())
}

fn print_section(section: &Section) {
    println!("=== {} ===", section.label);
    match &section.text_content {
        Some(text) => println!("{text}"),
        None => println!("{}", section.content),
    }
}

fn show_info(cli: &Cli, reader: &Reader) -> Result<(), String> {
    let meta = reader.metadata();

    if cli.json {
        let info = serde_json::json!({
            "file": cli.input,
            "title": meta.title,
            "authors": meta.authors,
            "language": meta.language,
            "identifier": meta.identifier,
            "publisher": meta.publisher,
            "navigation_entries": reader.page_count_hint(),
            "config": {
                "max_content": reader.config().max_content_per_section,
                "text": reader.config().include_text_content,
                "css": reader.config().css_mode,
            },
        });
        let json = serde_json::to_string_pretty(&info).map_err(|e| e.to_string())?;
        println!("{json}");
        return Ok(());
    }

    println!("File: {}", cli.input.display());
    println!("Title: {}", meta.title);
    if !meta.authors.is_empty() {
        println!("Authors: {}", meta.authors.join(", "));
    }
    if !meta.language.is_empty() {
        println!("Language: {}", meta.language);
    }
    if let Some(ref publisher) = meta.publisher {
        println!("Publisher: {publisher}");
    }
    if let Some(ref desc) = meta.description {
        let desc = desc.trim();
        match desc.char_indices().nth(200) {
            Some((cut, _)) => println!("Description: {}...", &desc[..cut]),
            None => println!("Description: {desc}"),
        }
    }
    println!("Navigation entries: {}", reader.page_count_hint());
    println!("Cover: {}", if reader.package().cover_item().is_some() { "yes" } else { "no" });

    Ok(())
}
