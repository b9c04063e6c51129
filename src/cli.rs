use std::cmp;
use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use atty::Stream;
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use toxguard_rs::{Label, Moderator, SessionAccountant, TOXIC_THRESHOLD, Ticket, Verdict};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "toxguard_rs=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "toxguard-rs", about = "Detect, rewrite and clean toxic messages", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Linear model artifact (JSON). Without it the lexicon decides toxicity.
    #[arg(long, global = true, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Replacement lexicon (TSV or JSON). Defaults to the built-in table.
    #[arg(long, global = true, value_name = "PATH")]
    lexicon: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a message.
    Check { text: String },
    /// Classify a message and rewrite toxic words politely.
    Rewrite { text: String },
    /// Classify a message and drop toxic words.
    Clean { text: String },
    /// Interactive analyzer session; every third toxic message issues a ticket.
    Chat {
        /// Directory that receives warning tickets.
        #[arg(long, default_value = ".")]
        ticket_dir: PathBuf,
    },
    /// Render a warning ticket for the given messages.
    Ticket {
        #[arg(required = true)]
        messages: Vec<String>,
        /// Destination PDF file.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Classify every line of a file.
    Batch { file: PathBuf },
    /// List lexicon entries.
    Lexicon {
        /// Only show terms starting with this prefix.
        #[arg(long, default_value = "")]
        prefix: String,
        /// Maximum number of entries to return.
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Run the HTTP front end.
    #[cfg(feature = "web")]
    Serve {
        /// Socket address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
        /// Number of browser sessions kept before the least recent is dropped.
        #[arg(long, default_value_t = toxguard_rs::DEFAULT_MAX_SESSIONS)]
        max_sessions: usize,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    let (model, lexicon) = (cli.model, cli.lexicon);
    let load = || toxguard_rs::load_moderator(model.as_deref(), lexicon.as_deref());
    match cli.command {
        Command::Check { text } => handle_check(&load()?, &text, cli.json),
        Command::Rewrite { text } => {
            let verdict = load()?.classify_and_rewrite(&text)?;
            print_verdict("Polite Rewrite", verdict, cli.json)
        }
        Command::Clean { text } => {
            let verdict = load()?.classify_and_clean(&text)?;
            print_verdict("Cleaned Sentence", verdict, cli.json)
        }
        Command::Chat { ticket_dir } => {
            let moderator = load()?;
            let interactive = atty::is(Stream::Stdin) && !cli.json;
            let stdin = io::stdin();
            run_chat(
                &moderator,
                stdin.lock(),
                &mut io::stdout(),
                &ticket_dir,
                ChatMode {
                    as_json: cli.json,
                    interactive,
                    styled: stdout_is_tty(),
                },
            )?;
            Ok(())
        }
        Command::Ticket { messages, output } => handle_ticket(&messages, &output, cli.json),
        Command::Batch { file } => handle_batch(&load()?, &file, cli.json),
        Command::Lexicon { prefix, limit } => handle_lexicon(&load()?, &prefix, limit, cli.json),
        #[cfg(feature = "web")]
        Command::Serve { addr, max_sessions } => {
            let moderator = load()?;
            let config = toxguard_rs::web::WebConfig { addr, max_sessions };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(toxguard_rs::web::serve(config, moderator))?;
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn handle_check(moderator: &Moderator, text: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let label = moderator.classify(text)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({ "label": label }))?);
    } else {
        match label {
            Some(label) => println!("{}", headline(label)),
            None => println!("Nothing to check."),
        }
    }
    Ok(())
}

fn print_verdict(
    output_label: &str,
    verdict: Option<Verdict>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(());
    }
    let Some(verdict) = verdict else {
        println!("Nothing to check.");
        return Ok(());
    };
    println!("{}", headline(verdict.label));
    match verdict.output {
        Some(output) => println!("{output_label}: {output}"),
        None => println!("No changes needed."),
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct ChatMode {
    as_json: bool,
    interactive: bool,
    styled: bool,
}

/// Runs an analyzer session over `input` and returns the ticket files written.
fn run_chat<R: BufRead, W: Write>(
    moderator: &Moderator,
    input: R,
    out: &mut W,
    ticket_dir: &Path,
    mode: ChatMode,
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    fs::create_dir_all(ticket_dir)?;
    if mode.interactive {
        writeln!(out, "Type a message and press enter. Ctrl-D or /quit ends the session.")?;
    }
    let mut session = SessionAccountant::new();
    let mut saved = Vec::new();
    let mut lines = input.lines();
    loop {
        if mode.interactive {
            write!(out, "> ")?;
            out.flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        if line.trim() == "/quit" {
            break;
        }
        let Some(outcome) = moderator.classify_and_track(&mut session, &line)? else {
            continue;
        };
        let ticket_path = match &outcome.ticket {
            Some(ready) => {
                let path = save_ticket(ticket_dir, &ready.ticket.file_name(), &ready.pdf)?;
                saved.push(path.clone());
                Some(path)
            }
            None => None,
        };

        if mode.as_json {
            let payload = json!({
                "message": line,
                "label": outcome.label,
                "toxic_count": outcome.toxic_count,
                "ticket": ticket_path.as_ref().map(|path| path.display().to_string()),
            });
            writeln!(out, "{}", serde_json::to_string(&payload)?)?;
            continue;
        }
        writeln!(out, "{}", headline(outcome.label))?;
        if outcome.label.is_toxic() && ticket_path.is_none() {
            writeln!(out, "Toxic messages this round: {}/{TOXIC_THRESHOLD}", outcome.toxic_count)?;
        }
        if let Some(path) = ticket_path {
            let notice = format!(
                "**{TOXIC_THRESHOLD} Toxic Messages Detected — Issuing Warning Ticket...**\n\nSaved to `{}`",
                path.display()
            );
            writeln!(out, "{}", markdown_text(&notice, mode.styled))?;
        }
    }
    Ok(saved)
}

/// Writes `pdf` as `file_name` inside `dir` without ever replacing an existing
/// file; clashes get a `_2`, `_3`, ... suffix before the extension.
fn save_ticket(dir: &Path, file_name: &str, pdf: &[u8]) -> io::Result<PathBuf> {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);
    let extension = path.extension().and_then(|ext| ext.to_str());
    for attempt in 1u32..=10_000 {
        let candidate = match (attempt, extension) {
            (1, _) => dir.join(file_name),
            (n, Some(ext)) => dir.join(format!("{stem}_{n}.{ext}")),
            (n, None) => dir.join(format!("{stem}_{n}")),
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut file) => {
                file.write_all(pdf)?;
                return Ok(candidate);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {file_name}"),
    ))
}

fn handle_ticket(messages: &[String], output: &Path, as_json: bool) -> Result<(), Box<dyn Error>> {
    let ticket = Ticket::new(messages.to_vec());
    let pdf = ticket.render();
    fs::write(output, &pdf)?;
    if as_json {
        let payload = json!({
            "path": output.display().to_string(),
            "issued": ticket.issued_line(),
            "messages": ticket.messages(),
            "bytes": pdf.len(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "Wrote {} ({} messages, {} bytes)",
            output.display(),
            ticket.messages().len(),
            pdf.len()
        );
    }
    Ok(())
}

fn handle_batch(moderator: &Moderator, file: &Path, as_json: bool) -> Result<(), Box<dyn Error>> {
    let text = fs::read_to_string(file)?;
    let lines: Vec<&str> = text.lines().collect();
    let labels = lines
        .par_iter()
        .map(|line| moderator.classify(line))
        .collect::<toxguard_rs::Result<Vec<_>>>()?;
    let rows: Vec<(usize, &str, Option<Label>)> = lines
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(idx, (line, label))| (idx + 1, *line, label))
        .collect();

    if as_json {
        let payload: Vec<_> = rows
            .iter()
            .map(|(line_no, text, label)| json!({ "line": line_no, "text": text, "label": label }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_batch_table(&rows);
    }
    Ok(())
}

fn handle_lexicon(
    moderator: &Moderator,
    prefix: &str,
    limit: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let limit = cmp::max(1, limit);
    let rows = moderator.lexicon().prefix(prefix, limit);
    if as_json {
        let payload = json!({
            "prefix": prefix,
            "limit": limit,
            "results": rows.iter().map(|(term, replacement)| {
                json!({"term": term, "replacement": replacement})
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_lexicon_table(prefix, &rows);
    }
    Ok(())
}

fn headline(label: Label) -> &'static str {
    match label {
        Label::Toxic => "Toxic",
        Label::Safe => "Safe Message",
    }
}

fn print_batch_table(rows: &[(usize, &str, Option<Label>)]) {
    if rows.is_empty() {
        println!("No messages found.");
        return;
    }
    let toxic = rows
        .iter()
        .filter(|(_, _, label)| label.is_some_and(Label::is_toxic))
        .count();
    println!("{:>5}  {:<5}  {}", "LINE", "LABEL", "MESSAGE");
    println!("{:->5}  {:-<5}  {}", "", "", "-------");
    for (line_no, text, label) in rows {
        let label = label
            .map(|label| label.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:>5}  {:<5}  {}", line_no, label, text);
    }
    println!("\n{toxic} of {} lines flagged toxic.", rows.len());
}

fn print_lexicon_table(prefix: &str, rows: &[(String, &str)]) {
    if rows.is_empty() {
        println!("No terms matched prefix \"{prefix}\".");
        return;
    }
    let width = rows
        .iter()
        .map(|(term, _)| term.len())
        .max()
        .unwrap_or(4)
        .max("TERM".len());
    println!("{:<width$}  {}", "TERM", "REPLACEMENT", width = width);
    println!("{:-<width$}  {}", "", "-----------", width = width);
    for (term, replacement) in rows {
        println!("{:<width$}  {}", term, replacement, width = width);
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_text(body: &str, styled: bool) -> String {
    let trimmed = body.trim();
    if styled {
        let skin = MadSkin::default();
        FmtText::from(&skin, trimmed, Some(markdown_width())).to_string()
    } else {
        trimmed.to_string()
    }
}
