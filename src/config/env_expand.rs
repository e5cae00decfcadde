//! Two-pass `${KEY}` environment variable expansion.
//!
//! Pass 1 resolves `env` bindings against each other in declaration order
//! (a binding may reference any key declared before it, across layers).
//! Pass 2 expands every other string field (`files[].dest`, `volumes[].dest`,
//! `scripts[].commands`, entry command lines, ...) against the fully
//! resolved env map. Only `${KEY}` braced syntax is recognized; a bare
//! `$KEY` is left untouched. A reference to an undeclared key is a fatal
//! `UnresolvedEnvRef`.

use crate::error::{HabitatError, HabitatResult, SourceLayer};

/// Find the next `${...}` reference in `s`, returning (key, byte_range).
fn next_ref(s: &str) -> Option<(&str, std::ops::Range<usize>)> {
    let start = s.find("${")?;
    let rest = &s[start + 2..];
    let end_rel = rest.find('}')?;
    let key = &rest[..end_rel];
    Some((key, start..start + 2 + end_rel + 1))
}

/// Expand all `${KEY}` references in `input` against `resolved`, in a single
/// left-to-right sweep. Does not recurse into substituted values.
fn expand_str(input: &str, resolved: &[(String, String)], layer: SourceLayer) -> HabitatResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some((key, range)) = next_ref(rest) {
        out.push_str(&rest[..range.start]);
        let value = resolved
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| HabitatError::UnresolvedEnvRef {
                key: key.to_string(),
                layer,
            })?;
        out.push_str(value);
        rest = &rest[range.end..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Resolve the ordered list of raw env bindings, in declaration order, each
/// entry visible to every later entry.
pub fn resolve_env(bindings: &[crate::config::schema::EnvBinding]) -> HabitatResult<Vec<(String, String)>> {
    let mut resolved: Vec<(String, String)> = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let value = expand_str(&binding.raw_value, &resolved, binding.source_layer)?;
        if let Some(slot) = resolved.iter_mut().find(|(k, _)| *k == binding.key) {
            slot.1 = value;
        } else {
            resolved.push((binding.key.clone(), value));
        }
    }
    Ok(resolved)
}

/// Expand a single string field against the fully resolved env map.
pub fn expand(input: &str, env: &[(String, String)], layer: SourceLayer) -> HabitatResult<String> {
    expand_str(input, env, layer)
}
