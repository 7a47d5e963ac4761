//! Second-pass descriptor construction
//!
//! Builds the `WFO_RETEST` document from the original walk-forward
//! descriptor and the parsed optimization rows. The original's job elements
//! are reused as templates (one per row, in order) so per-run fields like
//! `run` and the IS/OS date tags survive untouched. Only `task_type`,
//! `filename`, and the parameters section are rewritten: every parameter
//! the optimizer was free to move becomes a fixed value.

use serde_json::Value;
use tracing::{debug, warn};

use crate::codec;
use crate::error::{AgentError, Result};
use crate::names;
use crate::retest::table::OptRow;

/// Extracts every `<Job>…</Job>` element, in document order.
pub fn extract_job_elements(text: &str) -> Vec<String> {
    let mut jobs = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("<Job>") {
        let Some(end) = rest[start..].find("</Job>") else {
            break;
        };
        let end = start + end + "</Job>".len();
        jobs.push(rest[start..end].to_string());
        rest = &rest[end..];
    }
    jobs
}

/// Builds the complete `root`-wrapped second-pass document.
pub fn build_second_pass(
    original: &str,
    rows: &[OptRow],
    job_id: &str,
    symbol: &str,
    timeframe: &str,
    os_percent: i64,
) -> Result<String> {
    let templates = extract_job_elements(original);
    if templates.is_empty() {
        return Err(AgentError::Validation(
            "original descriptor has no job elements".to_string(),
        ));
    }

    let total_runs = rows.len();
    let file_name = format!(
        "{}.job",
        names::retest_stem(job_id, symbol, timeframe, total_runs, os_percent)
    );

    let limit = rows.len().min(templates.len());
    if limit < rows.len() {
        warn!(
            rows = rows.len(),
            templates = templates.len(),
            "fewer job elements than optimization rows, truncating"
        );
    }

    let mut jobs = Vec::with_capacity(limit);
    for (row, template) in rows.iter().zip(templates.iter()).take(limit) {
        let mut job = codec::replace_tag(template, "task_type", "WFO_RETEST");
        job = codec::replace_tag(&job, "filename", &file_name);
        job = fix_parameters(&job, &row.parameters_json)?;
        jobs.push(job);
    }

    Ok(format!("<root>\n{}\n</root>", jobs.join("\n")))
}

/// Replaces the template's parameters section with fixed-value parameters
/// taken from the row's optimized-parameter JSON.
fn fix_parameters(template: &str, parameters_json: &str) -> Result<String> {
    let optimized = parse_parameters_json(parameters_json)?;

    let start = template
        .find("<parameters>")
        .ok_or_else(|| AgentError::Validation("no parameters section in descriptor".to_string()))?;
    let end = template
        .find("</parameters>")
        .ok_or_else(|| AgentError::Validation("unterminated parameters section".to_string()))?;
    let inner = &template[start + "<parameters>".len()..end];

    let blocks = parse_param_blocks(inner)?;
    let rendered = render_fixed_parameters(&blocks, &optimized);

    Ok(format!(
        "{}<parameters>\n{rendered}</parameters>{}",
        &template[..start],
        &template[end + "</parameters>".len()..]
    ))
}

/// The optimizer writes its JSON with doubled quotes and sometimes wraps the
/// whole object in an outer quote pair; undo both before parsing.
fn parse_parameters_json(raw: &str) -> Result<serde_json::Map<String, Value>> {
    let mut cleaned = raw.replace("\"\"", "\"");
    if cleaned.len() >= 2 && cleaned.starts_with('"') && cleaned.ends_with('"') {
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    }
    serde_json::from_str(&cleaned)
        .map_err(|e| AgentError::Validation(format!("parameters_json is not json: {e}")))
}

#[derive(Debug)]
struct ParamBlock {
    name: String,
    children: Vec<(String, String)>,
}

impl ParamBlock {
    fn child(&self, key: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Scans the inner content of a parameters section into top-level blocks,
/// each a `<name>` element whose children are simple `<key>value</key>`
/// pairs. Substring scanning keeps the engine's whitespace conventions out
/// of the picture entirely.
fn parse_param_blocks(content: &str) -> Result<Vec<ParamBlock>> {
    let mut blocks = Vec::new();
    let mut rest = content.trim();

    while !rest.is_empty() {
        if !rest.starts_with('<') {
            return Err(AgentError::Validation(format!(
                "unexpected text in parameters section: {:.40}",
                rest
            )));
        }
        let name_end = rest
            .find('>')
            .ok_or_else(|| AgentError::Validation("unterminated tag in parameters".to_string()))?;
        let name = rest[1..name_end].to_string();
        let close = format!("</{name}>");
        let close_at = rest
            .find(&close)
            .ok_or_else(|| AgentError::Validation(format!("parameter <{name}> never closes")))?;
        let inner = &rest[name_end + 1..close_at];

        let mut children = Vec::new();
        let mut child_rest = inner.trim();
        while let Some(open_at) = child_rest.find('<') {
            let Some(gt) = child_rest[open_at..].find('>') else {
                break;
            };
            let key = child_rest[open_at + 1..open_at + gt].to_string();
            let child_close = format!("</{key}>");
            let Some(child_close_at) = child_rest.find(&child_close) else {
                break;
            };
            let value = child_rest[open_at + gt + 1..child_close_at].trim().to_string();
            children.push((key, value));
            child_rest = &child_rest[child_close_at + child_close.len()..];
        }

        blocks.push(ParamBlock { name, children });
        rest = rest[close_at + close.len()..].trim_start();
    }
    Ok(blocks)
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders the new parameters content: formerly optimizable parameters come
/// out as `Fixed`/`FixedString`/`FixedBool` carrying the optimized value;
/// everything else is re-emitted in its core fields.
fn render_fixed_parameters(
    blocks: &[ParamBlock],
    optimized: &serde_json::Map<String, Value>,
) -> String {
    let mut out = String::new();
    for block in blocks {
        let param_type = block.child("param_type").unwrap_or_default();
        let data_type = block.child("data_type").unwrap_or_default();
        let optimizable = block
            .child("optimizable_ind")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        if param_type == "OptRange" && optimizable {
            let value = match optimized.get(&block.name) {
                Some(v) => value_as_text(v),
                None => {
                    debug!(parameter = %block.name, "no optimized value, keeping current");
                    block.child("value").unwrap_or_default().to_string()
                }
            };
            let fixed_type = if data_type.eq_ignore_ascii_case("string") {
                "FixedString"
            } else if data_type.eq_ignore_ascii_case("bool")
                || data_type.eq_ignore_ascii_case("boolean")
            {
                "FixedBool"
            } else {
                if data_type.is_empty() {
                    warn!(parameter = %block.name, "no data_type on optimizable parameter, assuming numeric");
                }
                "Fixed"
            };

            out.push_str(&format!("<{}>\n", block.name));
            out.push_str(&format!("  <value>{value}</value>\n"));
            out.push_str(&format!("  <param_type>{fixed_type}</param_type>\n"));
            if !data_type.is_empty() {
                out.push_str(&format!("  <data_type>{data_type}</data_type>\n"));
            }
            out.push_str("  <optimizable_ind>false</optimizable_ind>\n");
            out.push_str(&format!("</{}>\n", block.name));
        } else {
            out.push_str(&format!("<{}>\n", block.name));
            for key in ["value", "param_type", "data_type", "optimizable_ind"] {
                if let Some(v) = block.child(key) {
                    if !v.is_empty() {
                        out.push_str(&format!("  <{key}>{v}</{key}>\n"));
                    }
                }
            }
            out.push_str(&format!("</{}>\n", block.name));
        }
    }
    out
}
