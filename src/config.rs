//! CLI surface (`structopt`) and `config.json` loading/merging, mirroring
//! the split between user-facing flags and a checked-in defaults file.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use structopt::StructOpt;

use crate::error::{CraftError, Result};

/// On-disk configuration. Unknown keys are ignored by `serde`'s default
/// deny-unknown-fields-off behavior; a missing file falls back to defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub local_only: bool,
    pub trust_cache_nothing: bool,
    pub trust_first_run_nothing: bool,
    pub request_cooldown: f64,
    pub nothing_verification: u32,
    pub nothing_cooldown: f64,
    pub batch_limit: usize,
    pub error_retry: bool,
    pub print_new_recipes: bool,
    pub request_addr: Option<String>,
    pub batch_reverifies_nothing: bool,
    /// Custom headers sent with every oracle HTTP request, loaded from the
    /// `"api"` key of `config.json`.
    #[serde(rename = "api")]
    pub api_headers: HashMap<String, String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        FileConfig {
            local_only: false,
            trust_cache_nothing: true,
            // Off by default, matching the original recipe handler: a
            // first-ever "Nothing" is recorded as uncertain rather than
            // confirmed, so it can still be re-verified later.
            trust_first_run_nothing: false,
            request_cooldown: 0.5,
            nothing_verification: 3,
            nothing_cooldown: 5.0,
            batch_limit: 50,
            error_retry: true,
            print_new_recipes: true,
            request_addr: None,
            batch_reverifies_nothing: false,
            api_headers: HashMap::new(),
        }
    }
}

impl FileConfig {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(FileConfig::default());
        }
        let text = std::fs::read_to_string(path)?;
        let de = &mut serde_json::Deserializer::from_str(&text);
        serde_path_to_error::deserialize(de)
            .map_err(|e| CraftError::Config(format!("{} at {}", e, path.display())))
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "craftgraph", about = "Explore and optimize crafting graphs against a combination oracle")]
pub struct Opt {
    #[structopt(subcommand)]
    pub command: Command,

    /// Directory holding recipes.db, optimals.db, persistent.json, and config.json.
    #[structopt(long, parse(from_os_str))]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Runs the iterative-deepening search to a given depth.
    Discover {
        #[structopt(long, default_value = "1")]
        depth: u32,
        #[structopt(long)]
        extra_depth: Option<u32>,
        #[structopt(long)]
        allow_starting_elements: bool,
        #[structopt(long)]
        resume_last_run: bool,
        #[structopt(long)]
        local: bool,
    },
    /// Finds minimum-craft sequences for one or more targets.
    Optimize {
        #[structopt(long)]
        target: Vec<String>,
        #[structopt(long)]
        extra_generations: Option<u32>,
        #[structopt(long)]
        local_generations: Option<u32>,
        #[structopt(long)]
        deviation: Option<u32>,
    },
    /// Structurally validates a speedrun script without touching the store.
    StaticCheck { file: PathBuf },
    /// Validates a speedrun script's claimed results against the local store.
    DynamicCheck { file: PathBuf },
    /// Diffs two speedrun scripts.
    Compare { original: PathBuf, updated: PathBuf },
    /// Renders a speedrun script as a Discord-friendly code block.
    ToDiscord { file: PathBuf },
}

pub fn resolve_data_dir(opt: &Opt) -> PathBuf {
    opt.data_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("craftgraph")
    })
}
