//! Application state for the sitecache dashboard
//!
//! This module holds the dashboard state, handles keyboard input and runs
//! the lookups typed into the slug input line.

use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;

use crate::cache::EntryInfo;
use crate::governor::{CostEstimate, GovernorStats};
use crate::service::{ResolvedWebsite, StorefrontService};

/// Longest slug accepted in the input line
const MAX_INPUT_LEN: usize = 64;

/// Outcome of the last lookup made from the dashboard
#[derive(Debug, Clone)]
pub struct LookupOutcome {
    pub slug: String,
    /// `None` when the site is missing or unavailable
    pub resolved: Option<ResolvedWebsite>,
    pub at: DateTime<Local>,
}

/// Main dashboard state
pub struct App {
    service: Arc<StorefrontService>,
    /// Slug being typed
    pub input: String,
    /// Slug submitted with Enter, resolved on the next loop turn
    pub pending_lookup: Option<String>,
    pub last_lookup: Option<LookupOutcome>,
    /// Scroll offset in the cache entry list
    pub entry_offset: usize,
    /// Flag to show help overlay
    pub show_help: bool,
    /// Flag indicating the application should quit
    pub should_quit: bool,
    /// One-line message for the status bar
    pub status: Option<String>,
}

impl App {
    pub fn new(service: Arc<StorefrontService>) -> Self {
        Self {
            service,
            input: String::new(),
            pending_lookup: None,
            last_lookup: None,
            entry_offset: 0,
            show_help: false,
            should_quit: false,
            status: None,
        }
    }

    pub fn stats(&self) -> GovernorStats {
        self.service.governor_stats()
    }

    pub fn entries(&self) -> Vec<EntryInfo> {
        self.service.cache_entries()
    }

    pub fn costs(&self) -> CostEstimate {
        CostEstimate::at_ceiling(self.service.config())
    }

    /// Resolves the slug submitted with Enter, if any
    pub async fn run_pending_lookup(&mut self) {
        let Some(slug) = self.pending_lookup.take() else {
            return;
        };
        let resolved = self.service.resolve_website_by_slug(&slug).await;
        self.status = Some(match &resolved {
            Some(site) if site.needs_redirect() => {
                format!("{} moved to {}", slug, site.canonical_slug)
            }
            Some(site) => format!("{} served from {}", slug, site.served.as_str()),
            None => format!("{} is unavailable", slug),
        });
        self.last_lookup = Some(LookupOutcome {
            slug,
            resolved,
            at: Local::now(),
        });
    }

    /// Handles keyboard input
    ///
    /// - `Esc`: Quit (or close help)
    /// - `?`: Toggle help overlay
    /// - `Enter`: Resolve the typed slug
    /// - `Ctrl-x`: Clear the site cache
    /// - `Up`/`Down`: Scroll the cache entry list
    /// - Letters, digits and `-`: Edit the slug
    pub fn handle_key(&mut self, key_event: KeyEvent) {
        // Help overlay intercepts all keys when shown
        if self.show_help {
            if matches!(key_event.code, KeyCode::Esc | KeyCode::Char('?')) {
                self.show_help = false;
            }
            return;
        }

        if key_event.modifiers.contains(KeyModifiers::CONTROL) {
            match key_event.code {
                KeyCode::Char('x') => {
                    self.service.clear_cache();
                    self.entry_offset = 0;
                    self.status = Some("Cache cleared".to_string());
                }
                KeyCode::Char('c') => {
                    self.should_quit = true;
                }
                _ => {}
            }
            return;
        }

        match key_event.code {
            KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char('?') => {
                self.show_help = true;
            }
            KeyCode::Enter => {
                let slug = self.input.trim().to_lowercase();
                if !slug.is_empty() {
                    self.pending_lookup = Some(slug);
                    self.input.clear();
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Up => {
                self.entry_offset = self.entry_offset.saturating_sub(1);
            }
            KeyCode::Down => {
                let len = self.service.cache_entries().len();
                if self.entry_offset + 1 < len {
                    self.entry_offset += 1;
                }
            }
            KeyCode::Char(c) if c.is_alphanumeric() || c == '-' => {
                if self.input.chars().count() < MAX_INPUT_LEN {
                    self.input.push(c);
                }
            }
            _ => {}
        }
    }
}
