//! Parser and checker for the speedrun script format: one craft per line,
//! `A  +  B  =  C`, with `//` line comments, `/* */` block comments, and
//! `::` target markers.

use std::collections::HashSet;

use crate::handler::RecipeHandler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub line_no: usize,
    pub a: String,
    pub b: String,
    pub result: String,
    pub is_target: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub line_no: usize,
    pub message: String,
}

/// Strips `/* ... */` block comments (which may span lines) before the
/// text is split into lines for per-line parsing.
fn strip_block_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    break;
                }
                if c == '\n' {
                    // preserve line numbering across a multi-line comment.
                    out.push('\n');
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub fn parse(text: &str) -> (Vec<ScriptLine>, Vec<ParseWarning>) {
    let stripped = strip_block_comments(text);
    let mut lines = Vec::new();
    let mut warnings = Vec::new();

    for (i, raw) in stripped.lines().enumerate() {
        let line_no = i + 1;
        let (code, comment) = match raw.find("  //") {
            Some(idx) => (&raw[..idx], Some(&raw[idx..])),
            None => (raw, None),
        };
        let code = code.trim();
        if code.is_empty() {
            continue;
        }

        let Some((lhs, result)) = code.split_once("  =  ") else {
            warnings.push(ParseWarning {
                line_no,
                message: format!("missing '  =  ' delimiter: {raw:?}"),
            });
            continue;
        };
        let Some((a, b)) = lhs.split_once("  +  ") else {
            warnings.push(ParseWarning {
                line_no,
                message: format!("missing '  +  ' delimiter: {raw:?}"),
            });
            continue;
        };

        let is_target = comment.map_or(false, |c| c.contains("::"));
        lines.push(ScriptLine {
            line_no,
            a: a.trim().to_string(),
            b: b.trim().to_string(),
            result: result.trim().to_string(),
            is_target,
        });
    }

    (lines, warnings)
}

#[derive(Debug, Default)]
pub struct StaticCheckReport {
    pub missing_ingredients: Vec<(usize, String)>,
    pub reorder_suggestion: Option<Vec<ScriptLine>>,
}

/// Verifies that every ingredient used by a line was defined earlier (a
/// seed or an earlier line's result), without touching the store or
/// oracle. When every flagged ingredient is merely out of order rather
/// than genuinely absent, a best-effort topological reordering is offered.
pub fn static_check(lines: &[ScriptLine], seeds: &[String]) -> StaticCheckReport {
    let mut known: HashSet<String> = seeds.iter().cloned().collect();
    let all_results: HashSet<String> = lines.iter().map(|l| l.result.clone()).chain(seeds.iter().cloned()).collect();

    let mut missing = Vec::new();
    let mut only_misplaced = true;

    for line in lines {
        for ingredient in [&line.a, &line.b] {
            if !known.contains(ingredient) {
                missing.push((line.line_no, ingredient.clone()));
                if !all_results.contains(ingredient) {
                    only_misplaced = false;
                }
            }
        }
        known.insert(line.result.clone());
    }

    let reorder_suggestion = if !missing.is_empty() && only_misplaced {
        topo_reorder(lines, seeds)
    } else {
        None
    };

    StaticCheckReport {
        missing_ingredients: missing,
        reorder_suggestion,
    }
}

fn topo_reorder(lines: &[ScriptLine], seeds: &[String]) -> Option<Vec<ScriptLine>> {
    let mut known: HashSet<String> = seeds.iter().cloned().collect();
    let mut remaining: Vec<ScriptLine> = lines.to_vec();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let pos = remaining
            .iter()
            .position(|l| known.contains(&l.a) && known.contains(&l.b))?;
        let line = remaining.remove(pos);
        known.insert(line.result.clone());
        ordered.push(line);
    }

    Some(ordered)
}

#[derive(Debug, Default)]
pub struct DynamicCheckReport {
    pub mismatches: Vec<(usize, String, String)>,
}

/// Verifies each line's claimed result against the local store's recorded
/// result for the same ingredient pair. Continues past the first mismatch
/// so every problem surfaces in one pass.
pub async fn dynamic_check(lines: &[ScriptLine], handler: &RecipeHandler) -> DynamicCheckReport {
    let mut mismatches = Vec::new();
    for line in lines {
        if let Ok(Some(actual)) = handler.store.lookup(&line.a, &line.b) {
            if actual != line.result {
                mismatches.push((line.line_no, line.result.clone(), actual));
            }
        }
    }
    DynamicCheckReport { mismatches }
}

#[derive(Debug, Default)]
pub struct CompareReport {
    pub elements_added: Vec<String>,
    pub elements_removed: Vec<String>,
    pub recipes_added: Vec<(String, String, String)>,
    pub recipes_removed: Vec<(String, String, String)>,
}

/// Element-level and recipe-level diff between two scripts.
pub fn compare(original: &[ScriptLine], new: &[ScriptLine]) -> CompareReport {
    let orig_results: HashSet<&str> = original.iter().map(|l| l.result.as_str()).collect();
    let new_results: HashSet<&str> = new.iter().map(|l| l.result.as_str()).collect();

    let elements_added = new_results.difference(&orig_results).map(|s| s.to_string()).collect();
    let elements_removed = orig_results.difference(&new_results).map(|s| s.to_string()).collect();

    let orig_triples: HashSet<(&str, &str, &str)> = original
        .iter()
        .map(|l| (l.a.as_str(), l.b.as_str(), l.result.as_str()))
        .collect();
    let new_triples: HashSet<(&str, &str, &str)> = new
        .iter()
        .map(|l| (l.a.as_str(), l.b.as_str(), l.result.as_str()))
        .collect();

    let recipes_added = new_triples
        .difference(&orig_triples)
        .map(|&(a, b, r)| (a.to_string(), b.to_string(), r.to_string()))
        .collect();
    let recipes_removed = orig_triples
        .difference(&new_triples)
        .map(|&(a, b, r)| (a.to_string(), b.to_string(), r.to_string()))
        .collect();

    CompareReport {
        elements_added,
        elements_removed,
        recipes_added,
        recipes_removed,
    }
}

/// Renders the craft list as a fenced Discord-friendly code block.
pub fn to_discord(lines: &[ScriptLine]) -> String {
    let mut out = String::from("```\n");
    for line in lines {
        out.push_str(&format!("{} + {} = {}\n", line.a, line.b, line.result));
    }
    out.push_str("```");
    out
}
