//! Named-parameter binding for BigQuery queries.
//!
//! Queries reference scalar parameters as `@name`. [`bind_named_params`]
//! enforces the façade contract: every placeholder referenced by the query
//! text must be bound, unused bindings are ignored.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use funnelytics_core::analytics::ParamValue;
use funnelytics_core::FunnelError;

/// A scalar value bound to one `@name` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundParam {
    pub name: String,
    pub value: ParamValue,
}

impl BoundParam {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn bigquery_type(&self) -> &'static str {
        self.value.bigquery_type()
    }
}

/// Collect the placeholder names referenced by `query`.
///
/// Single-quoted string literals are skipped, so an `@` inside a literal is
/// not a reference. `@@system_variables` are not placeholders either.
pub fn referenced_placeholders(query: &str) -> BTreeSet<String> {
    let chars: Vec<char> = query.chars().collect();
    let mut names = BTreeSet::new();
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            if c == '\'' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' => {
                in_string = true;
                i += 1;
            }
            '@' => {
                if chars.get(i + 1) == Some(&'@') {
                    i += 2;
                    while i < chars.len() && is_ident_char(chars[i]) {
                        i += 1;
                    }
                    continue;
                }
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let leads_ident = chars
                    .get(start)
                    .is_some_and(|c| c.is_ascii_alphabetic() || *c == '_');
                if end > start && leads_ident {
                    names.insert(chars[start..end].iter().collect());
                }
                i = end.max(i + 1);
            }
            _ => i += 1,
        }
    }
    names
}

/// Resolve every placeholder referenced by `query` against `params`.
///
/// Fails with [`FunnelError::MissingParameter`] naming the first unbound
/// placeholder; entries in `params` that the query never references are
/// silently ignored.
pub fn bind_named_params(
    query: &str,
    params: &BTreeMap<String, ParamValue>,
) -> Result<Vec<BoundParam>, FunnelError> {
    let referenced = referenced_placeholders(query);
    let mut bound = Vec::with_capacity(referenced.len());
    for name in referenced {
        match params.get(&name) {
            Some(value) => bound.push(BoundParam::new(name, value.clone())),
            None => return Err(FunnelError::MissingParameter(name)),
        }
    }
    Ok(bound)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_param(raw: &str) -> ParamValue {
        ParamValue::String(raw.to_string())
    }

    #[test]
    fn finds_placeholders_outside_strings() {
        let names = referenced_placeholders(
            "SELECT * FROM t WHERE a = @alpha AND b = '@not_a_param' AND c = @beta_2",
        );
        let expected: Vec<&str> = vec!["alpha", "beta_2"];
        assert_eq!(names.iter().map(String::as_str).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn skips_system_variables() {
        let names = referenced_placeholders("SELECT @@project_id, @real");
        assert_eq!(names.len(), 1);
        assert!(names.contains("real"));
    }

    #[test]
    fn binds_all_referenced_params() {
        let mut params = BTreeMap::new();
        params.insert("country".to_string(), string_param("AE"));
        params.insert("min_events".to_string(), ParamValue::Integer(3));
        params.insert("unused".to_string(), string_param("ignored"));

        let bound = bind_named_params(
            "SELECT * FROM t WHERE country = @country AND events >= @min_events",
            &params,
        )
        .expect("bound");
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].name, "country");
        assert_eq!(bound[0].bigquery_type(), "STRING");
        assert_eq!(bound[1].name, "min_events");
        assert_eq!(bound[1].bigquery_type(), "INT64");
    }

    #[test]
    fn missing_binding_is_an_error() {
        let params = BTreeMap::new();
        let err = bind_named_params("SELECT @missing", &params).expect_err("must fail");
        assert!(matches!(err, FunnelError::MissingParameter(name) if name == "missing"));
    }
}
