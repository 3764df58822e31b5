//! LLM prompts for extraction, query paraphrasing and clustering.

use sha2::{Digest, Sha256};

use crate::types::item::CandidateItem;

/// System prompt for the vision extractor.
pub const EXTRACT_SYSTEM_PROMPT: &str = "You read civil engineering utility drawings. \
You report pipes, structures and fittings exactly as labeled, and never invent items that \
are not drawn.";

/// Instruction for extracting candidate items from one drawing page.
pub const EXTRACT_PROMPT: &str = r#"List every utility item drawn on this sheet.

Include:
- Mainline pipes (storm: RCP, HDPE, CMP; sanitary: PVC, DIP, VCP; water: DIP, PVC)
- Laterals and service connections, one entry per connection
- Structures (MH, SSMH, CB, DI, cleanouts, hydrants), one entry per structure
- Fittings and appurtenances (FES, valves, tees, bends)

For each item read, when shown:
- diameter in inches, run length in feet, depth in feet
- invert elevations (IE, INV, IE IN/OUT) and rim elevation (RIM, TOP)
- stations (e.g. 1+00 to 2+50) and the structures the run connects

Say which view the item was read from: "plan" or "profile". If the sheet has
no utilities, return an empty list.

Output JSON:
{
    "items": [
        {
            "item_type": "mainline" | "lateral" | "structure" | "fitting",
            "discipline": "storm" | "sanitary" | "water",
            "material": "RCP",
            "diameter_in": 15,
            "length_ft": 100 or null,
            "depth_ft": 5.2 or null,
            "invert_in_ft": 645.5 or null,
            "invert_out_ft": 644.0 or null,
            "rim_elevation_ft": 655.0 or null,
            "source_view": "plan" | "profile",
            "raw_label": "label text as printed",
            "structure_name": "MH-1" or null,
            "from_structure": "MH-1" or null,
            "to_structure": "MH-2" or null,
            "station_start": "1+00" or null,
            "station_end": "2+50" or null,
            "notes": "anything else worth keeping" or null
        }
    ]
}

{hints_section}"#;

/// Prompt for paraphrasing a retrieval query.
pub const EXPAND_QUERY_PROMPT: &str = r#"Rewrite this search query over construction standards in {n} different ways.

Query: {query}

Keep the meaning. Spell out abbreviations, use the terms a specification
would use, and keep each rewrite short.

Output JSON array of strings:
["rewrite 1", "rewrite 2", ...]"#;

/// Prompt for grouping duplicate detections.
pub const CLUSTER_PROMPT: &str = r#"These items were read from several drawing pages and views. The same
physical pipe or structure often appears more than once (plan and profile,
match lines between sheets).

Group the items that describe the SAME physical object. Only group items
with the same discipline, material and diameter. Matching stations,
structure names or inverts are strong evidence; matching size alone is not.
Leave an item out of every group if it has no duplicate.

Items:
{items}

Output JSON:
{
    "clusters": [
        {
            "members": [0, 3],
            "keep": 3,
            "rationale": "same run MH-1 to MH-2 seen in plan and profile"
        }
    ]
}"#;

/// Generate a hash of the extraction prompt, for tagging reports.
pub fn extract_prompt_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(EXTRACT_PROMPT.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Format the extraction instruction with optional run hints.
pub fn format_extract_prompt(hint: Option<&str>) -> String {
    let hints_section = match hint.map(str::trim) {
        Some(h) if !h.is_empty() => format!("Project notes: {h}"),
        _ => String::new(),
    };
    EXTRACT_PROMPT.replace("{hints_section}", &hints_section)
}

/// Format the expand query prompt.
pub fn format_expand_query_prompt(query: &str, n: usize) -> String {
    EXPAND_QUERY_PROMPT
        .replace("{query}", query)
        .replace("{n}", &n.to_string())
}

/// Format the clustering prompt with indexed items.
pub fn format_cluster_prompt(items: &[CandidateItem]) -> String {
    let items_text = items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("[{i}] {}", describe_item(item)))
        .collect::<Vec<_>>()
        .join("\n");

    CLUSTER_PROMPT.replace("{items}", &items_text)
}

/// One-line description of an item for prompts.
fn describe_item(item: &CandidateItem) -> String {
    let mut parts = vec![
        format!("page {} {:?}", item.source_page, item.source_view).to_lowercase(),
        item.discipline.to_string(),
        item.material.clone(),
    ];
    if let Some(d) = item.diameter_in {
        parts.push(format!("{d}in"));
    }
    if let Some(l) = item.length_ft {
        parts.push(format!("{l}ft"));
    }
    if let Some(name) = &item.structure_name {
        parts.push(format!("structure {name}"));
    }
    if let (Some(from), Some(to)) = (&item.from_structure, &item.to_structure) {
        parts.push(format!("{from} to {to}"));
    }
    if let (Some(start), Some(end)) = (&item.station_start, &item.station_end) {
        parts.push(format!("sta {start} to {end}"));
    }
    if let Some(ie) = item.invert_in_ft {
        parts.push(format!("IE in {ie}"));
    }
    if let Some(ie) = item.invert_out_ft {
        parts.push(format!("IE out {ie}"));
    }
    if !item.raw_label.is_empty() {
        parts.push(format!("label \"{}\"", item.raw_label));
    }
    parts.join(", ")
}
