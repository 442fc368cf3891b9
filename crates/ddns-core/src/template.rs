//! `{{.Field}}` placeholder rendering for webhook and notification templates.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{Error, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Values available to a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub domain: &'a str,
    pub current_ip: &'a str,
    pub ip_type: &'a str,
}

impl TemplateVars<'_> {
    fn get(&self, field: &str) -> Option<&str> {
        match field {
            "Domain" => Some(self.domain),
            "CurrentIP" => Some(self.current_ip),
            "IPType" => Some(self.ip_type),
            _ => None,
        }
    }
}

/// Substitute every `{{.Field}}` in `template`.
///
/// Unknown fields are an error so typos surface instead of being published.
pub fn render(template: &str, vars: &TemplateVars<'_>) -> Result<String> {
    let mut unknown = None;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let field = &caps[1];
        match vars.get(field) {
            Some(value) => value.to_string(),
            None => {
                unknown.get_or_insert_with(|| field.to_string());
                String::new()
            }
        }
    });

    match unknown {
        Some(field) => Err(Error::config(format!("unknown template field {{{{.{field}}}}}"))),
        None => Ok(rendered.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: TemplateVars<'static> = TemplateVars {
        domain: "www.example.com",
        current_ip: "203.0.113.7",
        ip_type: "IPV4",
    };

    #[test]
    fn substitutes_known_fields() {
        let out = render(
            "https://hook.example/?d={{.Domain}}&ip={{ .CurrentIP }}&t={{.IPType}}",
            &VARS,
        )
        .unwrap();
        assert_eq!(
            out,
            "https://hook.example/?d=www.example.com&ip=203.0.113.7&t=IPV4"
        );
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(render("no placeholders", &VARS).unwrap(), "no placeholders");
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = render("{{.Hostname}}", &VARS).unwrap_err();
        assert!(err.to_string().contains("Hostname"));
    }
}
