use std::collections::BTreeSet;

use craftgraph::astar::{self, AstarConfig};
use craftgraph::graph::RecipeGraph;
use craftgraph::handler::{HandlerConfig, RecipeHandler};
use craftgraph::iddfs::Iddfs;
use craftgraph::oracle::OracleClient;
use craftgraph::script;
use craftgraph::store::RecipeStore;

fn unreachable_oracle() -> OracleClient {
    OracleClient::new(Some("http://127.0.0.1:9".to_string()))
}

/// A local-only discovery pass followed by an optimize pass should find the
/// same minimum-length solution that was seeded into the store, without ever
/// touching the network.
#[tokio::test]
async fn discover_then_optimize_end_to_end() {
    let mut store = RecipeStore::open_in_memory().unwrap();
    store.upsert_recipe("Water", "Fire", "Steam", true).unwrap();
    store.upsert_recipe("Steam", "Earth", "Mud Cloud", true).unwrap();
    store.flush().unwrap();

    let seed_names = vec!["Water".to_string(), "Fire".to_string(), "Earth".to_string()];
    let mut handler = RecipeHandler::new(
        store,
        unreachable_oracle(),
        HandlerConfig { local_only: true, ..Default::default() },
    );

    let seeds: Vec<i64> = (0..seed_names.len() as i64).collect();
    let mut search = Iddfs::new(&mut handler, seed_names, false);
    let stats = search.run(seeds, 2).await.unwrap();
    assert!(stats.new_elements >= 1, "expected at least Steam to be discovered at depth 1");

    let graph = RecipeGraph::build(&handler.store, &["Water", "Fire", "Earth"]).unwrap();
    let free: BTreeSet<i64> = ["Water", "Fire", "Earth"]
        .iter()
        .map(|s| graph.ids.id_of(s).unwrap())
        .collect();

    let solutions = astar::solve(&graph, &["Mud Cloud"], &free, &AstarConfig::default()).unwrap();
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].len(), 2);
    assert_eq!(solutions[0][0].2, graph.ids.id_of("Steam").unwrap());
    assert_eq!(solutions[0][1].2, graph.ids.id_of("Mud Cloud").unwrap());
}

/// A script that's internally consistent with the store passes both checks;
/// corrupting the store's recorded result for one pair surfaces exactly that
/// one line as a mismatch.
#[tokio::test]
async fn static_and_dynamic_check_agree_with_a_consistent_store() {
    let text = "Water  +  Fire  =  Steam\nSteam  +  Earth  =  Mud Cloud  // a target :: final\n";
    let (lines, warnings) = script::parse(text);
    assert!(warnings.is_empty());

    let seeds = vec!["Water".to_string(), "Fire".to_string(), "Earth".to_string()];
    let static_report = script::static_check(&lines, &seeds);
    assert!(static_report.missing_ingredients.is_empty());

    let mut store = RecipeStore::open_in_memory().unwrap();
    store.upsert_recipe("Water", "Fire", "Steam", true).unwrap();
    store.upsert_recipe("Steam", "Earth", "Mud Cloud", true).unwrap();
    let handler = RecipeHandler::new(store, unreachable_oracle(), HandlerConfig::default());

    let dynamic_report = script::dynamic_check(&lines, &handler).await;
    assert!(dynamic_report.mismatches.is_empty());
    assert!(lines.iter().any(|l| l.is_target));
}

#[tokio::test]
async fn dynamic_check_flags_a_store_disagreement() {
    let text = "Water  +  Fire  =  Steam\n";
    let (lines, _) = script::parse(text);

    let mut store = RecipeStore::open_in_memory().unwrap();
    store.upsert_recipe("Water", "Fire", "Mist", true).unwrap();
    let handler = RecipeHandler::new(store, unreachable_oracle(), HandlerConfig::default());

    let report = script::dynamic_check(&lines, &handler).await;
    assert_eq!(report.mismatches, vec![(1, "Steam".to_string(), "Mist".to_string())]);
}

/// Diffing a script against a revised version that swaps one recipe for
/// another reports the change at both the element and recipe level.
#[test]
fn compare_reports_a_swapped_recipe() {
    let original_text = "Water  +  Fire  =  Steam\nSteam  +  Earth  =  Mud Cloud\n";
    let updated_text = "Water  +  Wind  =  Steam\nSteam  +  Earth  =  Mud Cloud\n";
    let (original, _) = script::parse(original_text);
    let (updated, _) = script::parse(updated_text);

    let report = script::compare(&original, &updated);
    assert!(report.elements_added.is_empty());
    assert!(report.elements_removed.is_empty());
    assert_eq!(report.recipes_added, vec![("Water".to_string(), "Wind".to_string(), "Steam".to_string())]);
    assert_eq!(report.recipes_removed, vec![("Water".to_string(), "Fire".to_string(), "Steam".to_string())]);
}

/// A deviation bound of zero against a baseline script's own seeds rejects
/// any solution that would need an ingredient outside that baseline, even
/// when the graph otherwise has a path to the target.
#[test]
fn optimize_respects_a_tight_deviation_bound_end_to_end() {
    let mut store = RecipeStore::open_in_memory().unwrap();
    store.upsert_recipe("Water", "Earth", "Mud", true).unwrap();
    store.upsert_recipe("Mud", "Fire", "Brick", true).unwrap();

    let graph = RecipeGraph::build(&store, &["Water", "Earth", "Fire"]).unwrap();
    let free: BTreeSet<i64> = ["Water", "Earth", "Fire"]
        .iter()
        .map(|s| graph.ids.id_of(s).unwrap())
        .collect();

    let wide_open = astar::solve(&graph, &["Brick"], &free, &AstarConfig::default()).unwrap();
    assert_eq!(wide_open.len(), 1);

    let tight = AstarConfig { deviation_bound: Some(0) };
    let bounded = astar::solve(&graph, &["Brick"], &free, &tight).unwrap();
    assert!(bounded.is_empty(), "Mud is an extra (non-free) ingredient the bound of 0 should reject");
}
