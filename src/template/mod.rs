//! Hand-rolled `{@ ... @}` action-tag grammar (§6), deliberately not
//! modeled on Jinja2: bare actions, fuzzy-namespace-prefixed actions,
//! literal extra-args, and a `{@ with ns @}...{@ endwith @}` scope
//! block.

use regex::Regex;

use crate::config::FuzzyTarget;
use crate::error::{EngineError, Result};
use crate::namespace::{FuzzySpec, FuzzySpecElement};
use crate::value::Value;

fn tag_regex() -> Regex {
    Regex::new(r"\{@\s*(.*?)\s*@\}").expect("static regex is valid")
}

/// One `{@ ... @}` occurrence found in a template, with its byte range
/// in the source text (for substitution) and the target it resolves to.
#[derive(Debug, Clone)]
pub struct TemplateTag {
    pub span: (usize, usize),
    pub target: FuzzyTarget,
}

/// Scan `template` for action tags, expanding any enclosing
/// `{@ with ns @}...{@ endwith @}` block prefix onto each tag inside
/// it. `{@ with @}` / `{@ endwith @}` tags themselves are consumed and
/// do not produce a [`TemplateTag`].
pub fn scan(template: &str) -> Result<Vec<TemplateTag>> {
    let mut tags = Vec::new();
    let mut with_stack: Vec<FuzzySpec> = Vec::new();
    let tag_re = tag_regex();

    for m in tag_re.find_iter(template) {
        let body = tag_re.captures(m.as_str()).and_then(|c| c.get(1)).map(|g| g.as_str().trim()).unwrap_or_default();

        if body == "endwith" {
            with_stack.pop().ok_or_else(|| EngineError::TemplateError("unbalanced {@ endwith @}".to_string()))?;
            continue;
        }
        if let Some(rest) = body.strip_prefix("with ") {
            with_stack.push(parse_prefix(rest.trim())?);
            continue;
        }

        let (local_prefix, name, extra_args) = parse_action(body)?;
        let mut prefix = with_stack.last().cloned().unwrap_or_default();
        for elem in local_prefix.elements() {
            prefix.push(elem.clone());
        }

        tags.push(TemplateTag { span: (m.start(), m.end()), target: FuzzyTarget { name, prefix, extra_args } });
    }

    if !with_stack.is_empty() {
        return Err(EngineError::TemplateError("unbalanced {@ with ... @} block: missing {@ endwith @}".to_string()));
    }
    Ok(tags)
}

fn parse_prefix(s: &str) -> Result<FuzzySpec> {
    if s.is_empty() {
        return Err(EngineError::TemplateError("empty namespace prefix".to_string()));
    }
    Ok(s.split("::").map(|part| FuzzySpecElement::Name(part.trim().to_string())).collect::<Vec<_>>().into())
}

fn parse_action(body: &str) -> Result<(FuzzySpec, String, Vec<(String, Value)>)> {
    let (head, args_str) = match body.find('(') {
        Some(open) => {
            let close = body.rfind(')').ok_or_else(|| EngineError::TemplateError(format!("unclosed '(' in tag '{body}'")))?;
            (&body[..open], Some(&body[open + 1..close]))
        }
        None => (body, None),
    };

    let mut words: Vec<&str> = head.split_whitespace().collect();
    let name = words.pop().ok_or_else(|| EngineError::TemplateError("empty action tag".to_string()))?.to_string();
    let prefix = if words.is_empty() { FuzzySpec::default() } else { parse_prefix(words.join(" ").as_str())? };

    let mut extra_args = Vec::new();
    if let Some(args_str) = args_str {
        for pair in args_str.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (k, v) = pair.split_once('=').ok_or_else(|| EngineError::TemplateError(format!("malformed argument '{pair}'")))?;
            extra_args.push((k.trim().to_string(), parse_literal(v.trim())));
        }
    }

    Ok((prefix, name, extra_args))
}

fn parse_literal(s: &str) -> Value {
    if let Some(inner) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Value::string(inner);
    }
    if let Some(inner) = s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Value::string(inner);
    }
    if s == "true" {
        return Value::Bool(true);
    }
    if s == "false" {
        return Value::Bool(false);
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::int(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::float(f);
    }
    Value::string(s)
}

/// Replace each tag's span in `template` with its resolved rendering,
/// looking the value up by the tag's provider name in `results`.
pub fn render(template: &str, tags: &[TemplateTag], results: &std::collections::HashMap<String, Value>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    for tag in tags {
        out.push_str(&template[cursor..tag.span.0]);
        let value = results
            .get(&tag.target.name)
            .ok_or_else(|| EngineError::TemplateError(format!("no rendered value for action '{}'", tag.target.name)))?;
        out.push_str(&value.to_string());
        cursor = tag.span.1;
    }
    out.push_str(&template[cursor..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_bare_action() {
        let tags = scan("Result: {@ spam @}.").unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].target.name, "spam");
        assert!(tags[0].target.prefix.elements().is_empty());
    }

    #[test]
    fn scans_prefixed_action_with_args() {
        let tags = scan("{@ pdfsets::theories fit(time=\"10AM\") @}").unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].target.name, "fit");
        assert_eq!(tags[0].target.prefix.elements().len(), 2);
        assert_eq!(tags[0].target.extra_args, vec![("time".to_string(), Value::string("10AM"))]);
    }

    #[test]
    fn with_block_applies_prefix_to_enclosed_tags() {
        let tags = scan("{@ with pdfsets @}{@ description @}{@ endwith @}").unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].target.prefix.elements().len(), 1);
    }

    #[test]
    fn unbalanced_with_block_is_a_template_error() {
        let err = scan("{@ with pdfsets @}{@ description @}").unwrap_err();
        assert!(matches!(err, EngineError::TemplateError(_)));
    }

    #[test]
    fn render_substitutes_resolved_values() {
        let tags = scan("Today: {@ weather @}").unwrap();
        let mut results = std::collections::HashMap::new();
        results.insert("weather".to_string(), Value::string("sunny"));
        let rendered = render("Today: {@ weather @}", &tags, &results).unwrap();
        assert_eq!(rendered, "Today: sunny");
    }
}
