use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    ImportResult, InitResult, JournalEntry, ProgressEvent, ProgressSink, Severity, ShowResult,
};
use crate::document::DocumentSummary;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_import(result: &ImportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_show(result: &ShowResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_init(result: &InitResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}

    fn journal(&self, entry: JournalEntry) {
        if let Some(line) = journal_line(&entry) {
            eprintln!("{line}");
        }
    }
}

pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_import(result: &ImportResult) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";

        println!("{cyan}record {} ({}){reset}", result.identifier, result.record_url);
        if !result.imported {
            println!("{yellow}no physical structure, nothing imported{reset}");
        }
        print_summary(&result.document);
        println!(
            "{green}metadata: {} applied, {} skipped{reset}",
            result.logical.metadata.applied, result.logical.metadata.skipped
        );
        if result.logical.abandoned > 0 {
            println!(
                "{yellow}structure entries abandoned: {}{reset}",
                result.logical.abandoned
            );
        }
        if let Some(images) = &result.images {
            println!(
                "{green}images: {} downloaded, {} retried{reset}",
                images.downloaded, images.retried
            );
        }
    }

    pub fn print_show(result: &ShowResult) {
        println!("{} ({})", result.title, result.process_dir);
        print_summary(&result.document);
    }

    pub fn print_init(result: &InitResult) {
        println!("created {}", result.process_dir);
        println!("media: {}", result.media_dir);
        print_summary(&result.document);
    }
}

fn print_summary(summary: &DocumentSummary) {
    println!("type: {}", summary.logical_type);
    println!(
        "structure: {} nodes, {} fields and {} children on the root",
        summary.logical_nodes, summary.root_fields, summary.root_children
    );
    println!("pages: {}, links: {}", summary.pages, summary.edges);
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("[{:>6.2}s] {}", elapsed.as_secs_f64(), event.message),
            None => eprintln!("{}", event.message),
        }
    }

    fn journal(&self, entry: JournalEntry) {
        if let Some(line) = journal_line(&entry) {
            eprintln!("{line}");
        }
    }
}

fn journal_line(entry: &JournalEntry) -> Option<String> {
    (entry.severity != Severity::Debug)
        .then(|| format!("[{}] {:?}: {}", entry.source, entry.severity, entry.message))
}
