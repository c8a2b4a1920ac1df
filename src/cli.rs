use std::error::Error;
use std::path::PathBuf;
use std::{fs, io};

use atty::Stream;
use clap::{Parser, Subcommand};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use thoughtwords_rs::{
    FormatOptions, Formatter, LinkOptions, RouteTemplate, Vocabulary, format_thoughtword,
    generate_thought,
};

#[derive(Parser, Debug)]
#[command(
    name = "thoughtwords-rs",
    about = "Format thoughts and generate new ones",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a thought: Markdown, thoughtword links, soft word breaks.
    Format {
        /// Raw thought text; reads stdin when omitted.
        text: Option<String>,
        /// Populated thoughtword to link against (repeatable).
        #[arg(short, long = "word")]
        words: Vec<String>,
        /// Route template for thoughtword links.
        #[arg(long, default_value = "/thoughts/word/{word}")]
        route: String,
        /// Maximum token length before soft breaks are inserted.
        #[arg(long, default_value_t = thoughtwords_rs::DEFAULT_MAX_WORD_LENGTH)]
        max_length: usize,
    },
    /// Generate a pseudo-thought from a sample corpus.
    Generate {
        /// Path to the sample corpus; reads stdin when omitted.
        #[arg(short, long)]
        corpus: Option<PathBuf>,
        /// Markov block size (n-gram order).
        #[arg(short, long, default_value_t = 2)]
        block_size: usize,
        /// Approximate output length in words.
        #[arg(short, long, default_value_t = 100)]
        length: usize,
    },
    /// Normalize words into valid thoughtwords.
    Word {
        /// One or more words to normalize.
        #[arg(required = true)]
        words: Vec<String>,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Format {
            text,
            words,
            route,
            max_length,
        } => handle_format(text, words, route, max_length, cli.json),
        Command::Generate {
            corpus,
            block_size,
            length,
        } => handle_generate(corpus, block_size, length, cli.json),
        Command::Word { words } => handle_word(words, cli.json),
    }
}

fn handle_format(
    text: Option<String>,
    words: Vec<String>,
    route: String,
    max_length: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let raw = match text {
        Some(text) => text,
        None => io::read_to_string(io::stdin())?,
    };
    let vocabulary = Vocabulary::from_words(words);
    let formatter = Formatter::with_options(FormatOptions {
        max_word_length: max_length,
        link: LinkOptions {
            route: RouteTemplate::new(route),
            ..LinkOptions::default()
        },
    });
    let formatted = formatter.format(&raw, &vocabulary);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&formatted)?);
    } else {
        println!("{}", formatted.html);
    }
    Ok(())
}

fn handle_generate(
    corpus: Option<PathBuf>,
    block_size: usize,
    length: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let sample = match corpus {
        Some(path) => fs::read_to_string(path)?,
        None => io::read_to_string(io::stdin())?,
    };
    let generated = generate_thought(&sample, block_size, length)?;

    if as_json {
        let payload = json!({
            "block_size": block_size,
            "requested_length": length,
            "text": generated,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if generated.is_empty() {
        println!("The corpus was too small to generate anything.");
    } else {
        render_markdown_block("Generated thought", &generated);
    }
    Ok(())
}

fn handle_word(words: Vec<String>, as_json: bool) -> Result<(), Box<dyn Error>> {
    let results: Vec<(String, String)> = words
        .into_iter()
        .map(|word| {
            let normalized = format_thoughtword(&word, thoughtwords_rs::DEFAULT_MAX_WORD_LENGTH);
            (word, normalized)
        })
        .collect();

    if as_json {
        let payload: Vec<_> = results
            .iter()
            .map(|(word, normalized)| json!({ "word": word, "thoughtword": normalized }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_word_table(&results);
    }
    Ok(())
}

fn print_word_table(rows: &[(String, String)]) {
    if rows.is_empty() {
        println!("No words provided.");
        return;
    }
    let width = rows
        .iter()
        .map(|(word, _)| word.len())
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    println!("{:<width$}  {}", "WORD", "THOUGHTWORD", width = width);
    println!("{:-<width$}  {}", "", "-----------", width = width);
    for (word, normalized) in rows {
        let value = if normalized.is_empty() {
            "<empty>"
        } else {
            normalized.as_str()
        };
        println!("{:<width$}  {}", word, value, width = width);
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("{title}:");
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
