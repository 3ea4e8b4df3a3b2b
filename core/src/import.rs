//! Sequential batch import of requirements into a requirement document.
//!
//! Each entry goes through create, content update and link in that order.
//! The first failing step abandons the entry: nothing is rolled back, the
//! error is recorded, and the loop moves on. A requirement can therefore
//! exist on the server without content or without a link; such entries are
//! listed under `failed` and left for the operator.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::client::ArasAction;
use crate::content::{generate_requirement_xml, RequirementContent};
use crate::decode::created_id;
use crate::error::ApiError;
use crate::http::Transport;
use crate::session::Session;
use crate::types::{
    CreatedRecord, FailedRecord, ImportEntry, ImportResults, ImportSummary, NewLink, NewRequirement,
    TITLE_MAX_CHARS,
};

/// Environment-specific identifiers the import writes into every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSettings {
    /// Requirement document the new requirements are linked to.
    pub document_id: String,
    /// Identity that manages the created requirements.
    pub managed_by_id: String,
    /// XML schema (requirement document type) of the content.
    pub document_type_id: String,
    pub requirement_item_type: String,
    pub relationship_item_type: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl ImportSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let fields = [
            ("document_id", &self.document_id),
            ("managed_by_id", &self.managed_by_id),
            ("document_type_id", &self.document_type_id),
            ("requirement_item_type", &self.requirement_item_type),
            ("relationship_item_type", &self.relationship_item_type),
        ];
        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(SettingsError::Empty(name)),
            None => Ok(()),
        }
    }
}

/// Fixed-rate pause: after every `every`-th item of a run, if that item
/// succeeded, wait `pause`. `every == 0` disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    pub every: usize,
    pub pause: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            every: 10,
            pause: Duration::from_secs(2),
        }
    }
}

impl Throttle {
    /// `position` is 1-based within the run.
    pub fn fires_after(&self, position: usize) -> bool {
        self.every != 0 && position % self.every == 0
    }
}

pub trait Pause {
    fn pause(&mut self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub attempted: usize,
    pub created: Vec<CreatedRecord>,
    pub failed: Vec<FailedRecord>,
    pub elapsed: Duration,
}

impl ImportOutcome {
    pub fn into_results(self) -> ImportResults {
        ImportResults {
            summary: ImportSummary {
                total_attempted: self.attempted,
                successful: self.created.len(),
                failed: self.failed.len(),
                time_seconds: self.elapsed.as_secs_f64(),
            },
            created: self.created,
            failed: self.failed,
        }
    }
}

/// Entry count per category, sorted by name. Missing categories count as
/// `Unknown`.
pub fn category_breakdown(entries: &[ImportEntry]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        let category = entry.category.clone().unwrap_or_else(|| "Unknown".to_string());
        *counts.entry(category).or_insert(0) += 1;
    }
    counts
}

pub struct Importer<'a, T, P> {
    session: &'a mut Session<T>,
    settings: &'a ImportSettings,
    throttle: Throttle,
    pauser: P,
}

impl<'a, T: Transport> Importer<'a, T, ThreadSleep> {
    pub fn new(session: &'a mut Session<T>, settings: &'a ImportSettings) -> Self {
        Self {
            session,
            settings,
            throttle: Throttle::default(),
            pauser: ThreadSleep,
        }
    }
}

impl<'a, T: Transport, P: Pause> Importer<'a, T, P> {
    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_pauser<Q: Pause>(self, pauser: Q) -> Importer<'a, T, Q> {
        Importer {
            session: self.session,
            settings: self.settings,
            throttle: self.throttle,
            pauser,
        }
    }

    pub fn pauser(&self) -> &P {
        &self.pauser
    }

    /// Import `sequence[start_index..]` in order.
    pub fn run(&mut self, sequence: &[ImportEntry], start_index: usize) -> ImportOutcome {
        let started = Instant::now();
        let attempted = sequence.len().saturating_sub(start_index);
        info!("Starting import of {attempted} requirements");

        let mut created = Vec::new();
        let mut failed = Vec::new();

        for (idx, entry) in sequence.iter().enumerate().skip(start_index) {
            let label = entry.label(idx);
            info!("[{}/{}] Processing: {label}", idx + 1, sequence.len());

            match self.import_one(entry) {
                Ok(req_id) => {
                    info!("SUCCESS: {label}");
                    created.push(CreatedRecord {
                        req_number: entry.req_number.clone(),
                        req_id,
                        title: entry.title.clone(),
                        section: entry.section.clone(),
                    });
                    let position = idx - start_index + 1;
                    if self.throttle.fires_after(position) {
                        info!("Pausing for {:?}", self.throttle.pause);
                        self.pauser.pause(self.throttle.pause);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "FAILED: {label}");
                    failed.push(FailedRecord {
                        req_number: entry.req_number.clone(),
                        error: e.to_string(),
                        section: entry.section.clone(),
                    });
                }
            }
        }

        ImportOutcome {
            attempted,
            created,
            failed,
            elapsed: started.elapsed(),
        }
    }

    /// Create, fill and link one requirement; returns its server id.
    fn import_one(&mut self, entry: &ImportEntry) -> Result<String, ApiError> {
        let settings = self.settings;
        let new_requirement = NewRequirement {
            req_title: entry.title_str().chars().take(TITLE_MAX_CHARS).collect(),
            req_category: entry.category.clone(),
            managed_by_id: settings.managed_by_id.clone(),
            classification: "Requirement".to_string(),
            req_document_type: settings.document_type_id.clone(),
        };

        info!("  Creating requirement...");
        let response = self
            .session
            .create_item(&settings.requirement_item_type, &new_requirement)?;
        let req_id = created_id(&response)?;
        info!("  Created with ID: {req_id}");

        let xml = generate_requirement_xml(&RequirementContent {
            text: entry.text.as_deref().unwrap_or_default(),
            id: &req_id,
            chapter: entry.chapter.as_deref().unwrap_or_default(),
            number: entry.req_number.as_deref().unwrap_or_default(),
            title: entry.title_str(),
        });
        info!("  Updating content...");
        self.session.update_item(
            &settings.requirement_item_type,
            &req_id,
            &serde_json::json!({ "content": xml }),
            ArasAction::Edit,
            true,
        )?;

        info!("  Creating relationship...");
        self.session.create_item(
            &settings.relationship_item_type,
            &NewLink::hard_fixed(&settings.document_id, &req_id),
        )?;
        Ok(req_id)
    }
}
