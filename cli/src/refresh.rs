//! `refresh-document`: rebuild a requirement document's content from the
//! requirements linked to it.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use reqimport_core::content::build_document_content;
use reqimport_core::refresh::{fetch_linked_ids, parse_id_list, unique_ids};
use reqimport_core::{ArasAction, OdataClient, Session, Transport};
use serde_json::json;

use crate::config::Config;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "refresh-document",
    about = "Rebuild a requirement document's content from its linked requirements"
)]
pub struct RefreshArgs {
    /// Requirement document id (defaults to `import.document_id`).
    #[arg(long)]
    pub doc_id: Option<String>,

    /// Document item type (defaults to `import.document_item_type`).
    #[arg(long)]
    pub doc_endpoint: Option<String>,

    /// Relationship item type (defaults to `import.relationship_item_type`).
    #[arg(long)]
    pub rel_endpoint: Option<String>,

    /// JSON array of requirement ids to use instead of querying the links.
    #[arg(long)]
    pub ids_file: Option<PathBuf>,

    #[arg(long, default_value = "Imported Requirement Document")]
    pub title: String,

    #[arg(
        long,
        default_value = "This document contains all requirements from a parsed PDF"
    )]
    pub subtitle: String,

    /// Write the content for review but do not update the document.
    #[arg(long)]
    pub dry_run: bool,

    /// Review copy of the generated content.
    #[arg(long, default_value = "updated_document_content.xml")]
    pub output: PathBuf,

    /// Configuration file (defaults to ./reqimport.toml if present).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshExit {
    Updated,
    DryRun,
    NoIds,
    MissingIdsFile,
    UpdateFailed,
}

impl RefreshExit {
    pub fn code(self) -> u8 {
        match self {
            RefreshExit::Updated | RefreshExit::DryRun => 0,
            RefreshExit::NoIds => 1,
            RefreshExit::MissingIdsFile => 2,
            RefreshExit::UpdateFailed => 3,
        }
    }
}

impl From<RefreshExit> for ExitCode {
    fn from(exit: RefreshExit) -> Self {
        ExitCode::from(exit.code())
    }
}

fn connect<'t, T: Transport>(config: &Config, transport: &'t T) -> anyhow::Result<Session<&'t T>> {
    let credentials = config.credentials()?;
    Ok(Session::new(OdataClient::new(&config.server.url), transport, credentials))
}

/// Credentials are resolved only on the paths that talk to the server.
pub fn run<T: Transport>(
    args: &RefreshArgs,
    config: &Config,
    transport: T,
) -> anyhow::Result<RefreshExit> {
    let doc_id = args.doc_id.as_deref().unwrap_or(&config.import.document_id);
    let doc_endpoint = args
        .doc_endpoint
        .as_deref()
        .unwrap_or(&config.import.document_item_type);
    let rel_endpoint = args
        .rel_endpoint
        .as_deref()
        .unwrap_or(&config.import.relationship_item_type);

    let mut linked_session = None;
    let ids = match &args.ids_file {
        Some(path) => {
            if !path.exists() {
                println!("{} ids file {} not found", "ERROR:".red().bold(), path.display());
                return Ok(RefreshExit::MissingIdsFile);
            }
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let ids = parse_id_list(&raw).with_context(|| format!("parsing {}", path.display()))?;
            println!("Loaded {} ids from {}", ids.len(), path.display());
            ids
        }
        None => {
            let mut session = connect(config, &transport)?;
            let ids = fetch_linked_ids(&mut session, rel_endpoint, doc_id)
                .with_context(|| format!("querying {rel_endpoint} links of {doc_id}"))?;
            println!("Found {} {rel_endpoint} links on {doc_id}", ids.len());
            linked_session = Some(session);
            ids
        }
    };

    let unique = unique_ids(ids);
    if unique.is_empty() {
        println!("{} no requirement ids to reference; nothing to do", "ERROR:".red().bold());
        return Ok(RefreshExit::NoIds);
    }

    let content = build_document_content(&unique, &args.title, &args.subtitle);
    fs::write(&args.output, &content)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("Unique requirements: {}", unique.len());
    println!("Content length: {} characters", content.len());
    println!("Review copy written to {}", args.output.display());

    if args.dry_run {
        println!("\nDry run: {doc_endpoint}('{doc_id}') left unchanged.");
        return Ok(RefreshExit::DryRun);
    }

    let mut session = match linked_session {
        Some(session) => session,
        None => connect(config, &transport)?,
    };
    let data = json!({ "content": content });
    match session.update_item(doc_endpoint, doc_id, &data, ArasAction::Edit, true) {
        Ok(_) => {
            println!("{} Updated {doc_endpoint}('{doc_id}')", "✓".green());
            Ok(RefreshExit::Updated)
        }
        Err(err) => {
            println!("{} update of {doc_endpoint}('{doc_id}') failed: {err}", "✗".red());
            Ok(RefreshExit::UpdateFailed)
        }
    }
}
