//! Command-line interface parsing for sitecache
//!
//! Handles the backend selection flags and the subcommands using clap, and
//! builds the JSON reports the one-shot commands print.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::SafetyConfig;
use crate::governor::{CostEstimate, GovernorStats};
use crate::service::ResolvedWebsite;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// Neither a dump file nor a Firestore project was given
    #[error("No backend selected. Pass --dump FILE or --firestore-project ID")]
    NoBackend,
}

/// sitecache - Cached, cost-capped lookup of storefront sites
#[derive(Parser, Debug)]
#[command(name = "sitecache")]
#[command(about = "Cached, cost-capped lookup of slug-addressed storefront sites")]
#[command(version)]
pub struct Cli {
    /// Serve documents from a local JSON dump instead of Firestore
    #[arg(long, value_name = "FILE", global = true, conflicts_with = "firestore_project")]
    pub dump: Option<PathBuf>,

    /// Firestore project id to read from
    #[arg(long, value_name = "ID", global = true)]
    pub firestore_project: Option<String>,

    /// Web API key for the Firestore REST endpoint
    #[arg(long, value_name = "KEY", global = true, requires = "firestore_project")]
    pub api_key: Option<String>,

    /// OAuth access token sent as a bearer token (e.g. from `gcloud auth print-access-token`)
    #[arg(long, value_name = "TOKEN", global = true, requires = "firestore_project")]
    pub access_token: Option<String>,

    /// Safety limits file (defaults to safety.json in the config directory)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Resolve one or more slugs and print the sites as JSON
    ///
    /// Examples:
    ///   sitecache --dump data.json resolve acme
    ///   sitecache --dump data.json resolve acme acme-old bolt
    Resolve {
        #[arg(required = true, value_name = "SLUG")]
        slugs: Vec<String>,
    },
    /// Print the safety limits, read usage and cost estimates
    Stats,
    /// Export every business as static JSON files
    Export {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Open the terminal dashboard
    Dashboard,
}

/// Where documents are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Dump(PathBuf),
    Firestore {
        project: String,
        api_key: Option<String>,
        access_token: Option<String>,
    },
}

impl Cli {
    /// Picks the backend from the flags
    pub fn backend(&self) -> Result<Backend, CliError> {
        match (&self.dump, &self.firestore_project) {
            (Some(path), _) => Ok(Backend::Dump(path.clone())),
            (None, Some(project)) => Ok(Backend::Firestore {
                project: project.clone(),
                api_key: self.api_key.clone(),
                access_token: self.access_token.clone(),
            }),
            (None, None) => Err(CliError::NoBackend),
        }
    }
}

/// JSON printed for one `resolve` argument
pub fn resolve_report(slug: &str, resolved: Option<&ResolvedWebsite>) -> Value {
    match resolved {
        Some(resolved) => json!({
            "slug": slug,
            "status": "found",
            "canonicalSlug": resolved.canonical_slug,
            "redirect": resolved.needs_redirect(),
            "served": resolved.served,
            "site": resolved.site,
        }),
        None => json!({ "slug": slug, "status": "unavailable" }),
    }
}

/// JSON printed by `stats`
pub fn stats_report(config: &SafetyConfig, stats: &GovernorStats) -> Value {
    json!({
        "limits": config,
        "usage": stats,
        "usageRatio": stats.usage_ratio(),
        "costAtCeiling": CostEstimate::at_ceiling(config),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BusinessRecord, WebsitePayload};
    use crate::governor::UsageLevel;
    use crate::service::Served;

    fn resolved(requested: &str) -> ResolvedWebsite {
        let business = BusinessRecord {
            id: "u1".to_string(),
            name: "Acme".to_string(),
            town: "Boden".to_string(),
            description: None,
            swish_number: None,
            instagram: None,
            facebook: None,
            tiktok: None,
            owners: Vec::new(),
            slug: "acme-2".to_string(),
            old_slugs: vec!["acme".to_string()],
        };
        ResolvedWebsite {
            requested: requested.to_string(),
            canonical_slug: "acme-2".to_string(),
            served: Served::Cache,
            site: WebsitePayload {
                business,
                items: Vec::new(),
            },
        }
    }

    #[test]
    fn test_cli_parse_resolve_with_dump() {
        let cli = Cli::parse_from(["sitecache", "--dump", "data.json", "resolve", "a", "b"]);
        assert_eq!(
            cli.command,
            Command::Resolve {
                slugs: vec!["a".to_string(), "b".to_string()]
            }
        );
        assert_eq!(cli.backend().unwrap(), Backend::Dump(PathBuf::from("data.json")));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["sitecache", "stats", "--firestore-project", "shop"]);
        assert_eq!(cli.command, Command::Stats);
        assert_eq!(
            cli.backend().unwrap(),
            Backend::Firestore {
                project: "shop".to_string(),
                api_key: None,
                access_token: None,
            }
        );
    }

    #[test]
    fn test_api_key_requires_project() {
        let result = Cli::try_parse_from(["sitecache", "--api-key", "k", "stats"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_requires_a_slug() {
        assert!(Cli::try_parse_from(["sitecache", "resolve"]).is_err());
    }

    #[test]
    fn test_dump_conflicts_with_firestore() {
        let result = Cli::try_parse_from([
            "sitecache",
            "--dump",
            "d.json",
            "--firestore-project",
            "shop",
            "stats",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_backend_is_an_error() {
        let cli = Cli::parse_from(["sitecache", "dashboard"]);
        let err = cli.backend().unwrap_err();
        assert!(err.to_string().contains("--dump"));
    }

    #[test]
    fn test_export_parses_dir() {
        let cli = Cli::parse_from(["sitecache", "export", "out"]);
        assert_eq!(
            cli.command,
            Command::Export {
                dir: PathBuf::from("out")
            }
        );
    }

    #[test]
    fn test_resolve_report_found_via_alias() {
        let report = resolve_report("acme", Some(&resolved("acme")));
        assert_eq!(report["status"], "found");
        assert_eq!(report["canonicalSlug"], "acme-2");
        assert_eq!(report["redirect"], true);
        assert_eq!(report["served"], "cache");
        assert_eq!(report["site"]["business"]["name"], "Acme");
    }

    #[test]
    fn test_resolve_report_unavailable() {
        let report = resolve_report("ghost", None);
        assert_eq!(report, json!({ "slug": "ghost", "status": "unavailable" }));
    }

    #[test]
    fn test_stats_report() {
        let config = SafetyConfig::default();
        let stats = GovernorStats {
            daily_reads: 250,
            max_daily_reads: 1000,
            cache_size: 2,
            max_cache_size: 100,
            level: UsageLevel::Normal,
        };

        let report = stats_report(&config, &stats);

        assert_eq!(report["usage"]["dailyReads"], 250);
        assert_eq!(report["usage"]["level"], "normal");
        assert_eq!(report["usageRatio"], 0.25);
        assert_eq!(report["limits"]["maxDailyReads"], 1000);
    }
}
