use std::path::{Path, PathBuf};

use colored::Colorize;
use structopt::StructOpt;
use tracing::info;

use craftgraph::astar::{self, AstarConfig};
use craftgraph::config::{resolve_data_dir, Command, FileConfig, Opt};
use craftgraph::error::Result;
use craftgraph::graph::RecipeGraph;
use craftgraph::handler::{HandlerConfig, RecipeHandler};
use craftgraph::iddfs::Iddfs;
use craftgraph::optimals::OptimalsStore;
use craftgraph::oracle::OracleClient;
use craftgraph::persist::PersistentState;
use craftgraph::script;
use craftgraph::store::RecipeStore;

const SEEDS: [&str; 4] = ["Water", "Fire", "Wind", "Earth"];

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();
    let data_dir = resolve_data_dir(&opt);
    std::fs::create_dir_all(&data_dir)?;

    let file_config = FileConfig::load(&data_dir.join("config.json"))?;

    match opt.command {
        Command::Discover {
            depth,
            extra_depth,
            allow_starting_elements,
            resume_last_run,
            local,
        } => run_discover(&data_dir, &file_config, depth, extra_depth, allow_starting_elements, resume_last_run, local).await,
        Command::Optimize {
            target,
            extra_generations,
            local_generations,
            deviation,
        } => run_optimize(&data_dir, &file_config, &target, extra_generations, local_generations, deviation).await,
        Command::StaticCheck { file } => run_static_check(&file),
        Command::DynamicCheck { file } => run_dynamic_check(&data_dir, &file).await,
        Command::Compare { original, updated } => run_compare(&original, &updated),
        Command::ToDiscord { file } => run_to_discord(&file),
    }
}

/// Builds the oracle client for a live run: custom headers from
/// `config.json`'s `"api"` key, and the 500-error sidecar placed alongside
/// the rest of this run's data files.
fn build_oracle(data_dir: &Path, file_config: &FileConfig) -> OracleClient {
    OracleClient::new(file_config.request_addr.clone())
        .with_headers(&file_config.api_headers)
        .with_error_log(data_dir.join("500s.txt"))
}

async fn run_discover(
    data_dir: &PathBuf,
    file_config: &FileConfig,
    depth: u32,
    extra_depth: Option<u32>,
    allow_starting_elements: bool,
    resume_last_run: bool,
    local: bool,
) -> Result<()> {
    let store = RecipeStore::open(data_dir.join("recipes.db"))?;
    let oracle = build_oracle(data_dir, file_config);
    let handler_config = HandlerConfig {
        local_only: local || file_config.local_only,
        trust_first_run_nothing: file_config.trust_first_run_nothing,
        batch_reverifies_nothing: file_config.batch_reverifies_nothing,
    };
    let mut handler = RecipeHandler::new(store, oracle, handler_config);

    let persistent_path = data_dir.join("persistent.json");
    // The saved state is a resume cursor (a state-key path), never the seed
    // item-id list: the seeds are always the fixed starting elements below.
    let persistent = PersistentState::load(&persistent_path)?;

    let max_depth = depth + extra_depth.unwrap_or(0);
    let seed_names: Vec<String> = SEEDS.iter().map(|s| s.to_string()).collect();
    let seed_ids: Vec<i64> = (0..seed_names.len() as i64).collect();

    tokio::select! {
        result = async {
            let search = Iddfs::new(&mut handler, seed_names, allow_starting_elements)
                .with_persistence(persistent_path.clone(), persistent.clone());
            let mut search = if resume_last_run && !persistent.game_state.is_empty() {
                search.with_resume_cursor(persistent.game_state.clone())
            } else {
                search
            };
            search.run(seed_ids, max_depth).await
        } => {
            let stats = result?;
            info!(new_elements = stats.new_elements, "discovery complete");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, flushing store");
        }
    }

    handler.store.flush()?;
    Ok(())
}

async fn run_optimize(
    data_dir: &PathBuf,
    file_config: &FileConfig,
    targets: &[String],
    extra_generations: Option<u32>,
    local_generations: Option<u32>,
    deviation: Option<u32>,
) -> Result<()> {
    let store = RecipeStore::open(data_dir.join("recipes.db"))?;

    if extra_generations.unwrap_or(0) == 0 && local_generations.unwrap_or(0) == 0 {
        return run_optimize_with_store(data_dir, store, targets, deviation);
    }

    let seed_names: Vec<String> = SEEDS.iter().map(|s| s.to_string()).collect();
    let seed_ids: Vec<i64> = (0..seed_names.len() as i64).collect();

    // local-only generations widen the graph from crafts already cached,
    // without spending any oracle requests; extra generations then spend
    // oracle requests to push beyond what the cache already knows.
    let local_config = HandlerConfig {
        local_only: true,
        ..Default::default()
    };
    let mut handler = RecipeHandler::new(store, OracleClient::new(None), local_config);
    if let Some(local) = local_generations {
        let mut search = Iddfs::new(&mut handler, seed_names.clone(), false);
        search.run(seed_ids.clone(), local).await?;
    }

    let mut handler = RecipeHandler::new(
        handler.store,
        build_oracle(data_dir, file_config),
        HandlerConfig {
            local_only: false,
            trust_first_run_nothing: file_config.trust_first_run_nothing,
            batch_reverifies_nothing: file_config.batch_reverifies_nothing,
        },
    );
    if let Some(extra) = extra_generations {
        let mut search = Iddfs::new(&mut handler, seed_names, false);
        search.run(seed_ids, extra).await?;
    }

    handler.store.flush()?;
    run_optimize_with_store(data_dir, handler.store, targets, deviation)
}

fn run_optimize_with_store(data_dir: &Path, store: RecipeStore, targets: &[String], deviation: Option<u32>) -> Result<()> {
    let graph = RecipeGraph::build(&store, &SEEDS)?;
    let free: std::collections::BTreeSet<i64> = SEEDS
        .iter()
        .filter_map(|s| graph.ids.id_of(s))
        .collect();

    let target_refs: Vec<&str> = targets.iter().map(|s| s.as_str()).collect();
    let config = AstarConfig { deviation_bound: deviation };
    let solutions = astar::solve(&graph, &target_refs, &free, &config)?;

    if solutions.is_empty() {
        println!("{}", "no solution found within the configured bounds".red());
    } else {
        let optimals = OptimalsStore::open(data_dir.join("optimals.db"))?;
        let trace = render_trace(&graph, &solutions[0]);
        for target in targets {
            optimals.upsert(target, &trace)?;
        }
    }
    for (i, solution) in solutions.iter().enumerate() {
        println!("{}", format!("solution {}:", i + 1).green().bold());
        for &(u, v, r) in solution {
            println!(
                "  {}  +  {}  =  {}",
                graph.ids.name_of(u).unwrap_or("?"),
                graph.ids.name_of(v).unwrap_or("?"),
                graph.ids.name_of(r).unwrap_or("?").cyan(),
            );
        }
    }
    Ok(())
}

fn render_trace(graph: &RecipeGraph, solution: &[(i64, i64, i64)]) -> String {
    solution
        .iter()
        .map(|&(u, v, r)| {
            format!(
                "{} + {} = {}",
                graph.ids.name_of(u).unwrap_or("?"),
                graph.ids.name_of(v).unwrap_or("?"),
                graph.ids.name_of(r).unwrap_or("?"),
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn run_static_check(file: &std::path::Path) -> Result<()> {
    let text = std::fs::read_to_string(file)?;
    let (lines, warnings) = script::parse(&text);
    for w in &warnings {
        println!("{}", format!("line {}: {}", w.line_no, w.message).yellow());
    }
    let seeds: Vec<String> = SEEDS.iter().map(|s| s.to_string()).collect();
    let report = script::static_check(&lines, &seeds);
    if report.missing_ingredients.is_empty() {
        println!("{}", format!("ok: {} lines, no missing ingredients", lines.len()).green());
    } else {
        for (line_no, ingredient) in &report.missing_ingredients {
            println!("{}", format!("line {line_no}: ingredient not yet defined: {ingredient}").red());
        }
        if let Some(reordered) = &report.reorder_suggestion {
            println!("suggested reorder:\n{}", script::to_discord(reordered));
        }
    }
    Ok(())
}

async fn run_dynamic_check(data_dir: &PathBuf, file: &std::path::Path) -> Result<()> {
    let text = std::fs::read_to_string(file)?;
    let (lines, _) = script::parse(&text);
    let store = RecipeStore::open(data_dir.join("recipes.db"))?;
    let oracle = OracleClient::new(None);
    let handler = RecipeHandler::new(store, oracle, HandlerConfig::default());
    let report = script::dynamic_check(&lines, &handler).await;
    if report.mismatches.is_empty() {
        println!("{}", "ok: every line matches the local store".green());
    } else {
        for (line_no, claimed, actual) in &report.mismatches {
            println!("{}", format!("line {line_no}: script claims {claimed}, store has {actual}").red());
        }
    }
    Ok(())
}

fn run_compare(original: &std::path::Path, updated: &std::path::Path) -> Result<()> {
    let (orig_lines, _) = script::parse(&std::fs::read_to_string(original)?);
    let (new_lines, _) = script::parse(&std::fs::read_to_string(updated)?);
    let report = script::compare(&orig_lines, &new_lines);
    println!("elements added: {:?}", report.elements_added);
    println!("elements removed: {:?}", report.elements_removed);
    println!("recipes added: {:?}", report.recipes_added);
    println!("recipes removed: {:?}", report.recipes_removed);
    Ok(())
}

fn run_to_discord(file: &std::path::Path) -> Result<()> {
    let (lines, _) = script::parse(&std::fs::read_to_string(file)?);
    println!("{}", script::to_discord(&lines));
    Ok(())
}
