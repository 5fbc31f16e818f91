use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Matches `{{ env.VAR }}` and `{{ env.VAR | default("fallback") }}`
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
    })
}

/// Expand environment placeholders in raw TOML text
///
/// Comment lines are copied through untouched so a commented-out credential
/// never has to exist in the environment.
pub fn expand_env(input: &str) -> Result<String, String> {
    let expanded = input
        .split('\n')
        .map(|line| {
            if line.trim_start().starts_with('#') {
                Ok(line.to_owned())
            } else {
                expand_line(line)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(expanded.join("\n"))
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut failure = None;

    let replaced = placeholder().replace_all(line, |caps: &Captures<'_>| {
        let key = &caps[1];
        let default_value = caps.get(2).map(|m| m.as_str());

        match resolve(key, default_value) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(replaced.into_owned()),
    }
}

fn resolve(key: &str, default_value: Option<&str>) -> Result<String, String> {
    let Some(var_name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var_name), default_value) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{var_name}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "preferred_provider = \"openai\"";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn expands_api_key() {
        temp_env::with_var("QUILL_TEST_KEY", Some("sk-123"), || {
            let result = expand_env("api_key = \"{{ env.QUILL_TEST_KEY }}\"").unwrap();
            assert_eq!(result, "api_key = \"sk-123\"");
        });
    }

    #[test]
    fn expands_across_lines() {
        let vars = [("QUILL_A", Some("a")), ("QUILL_B", Some("b"))];
        temp_env::with_vars(vars, || {
            let result = expand_env("x = \"{{ env.QUILL_A }}\"\ny = \"{{env.QUILL_B}}\"\n").unwrap();
            assert_eq!(result, "x = \"a\"\ny = \"b\"\n");
        });
    }

    #[test]
    fn missing_variable_is_reported_by_name() {
        temp_env::with_var_unset("QUILL_MISSING", || {
            let err = expand_env("api_key = \"{{ env.QUILL_MISSING }}\"").unwrap_err();
            assert!(err.contains("QUILL_MISSING"));
        });
    }

    #[test]
    fn rejects_other_scopes() {
        let err = expand_env("api_key = \"{{ vault.KEY }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn comments_are_not_expanded() {
        temp_env::with_var_unset("QUILL_MISSING", || {
            let input = "  # api_key = \"{{ env.QUILL_MISSING }}\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("QUILL_MODEL", || {
            let result = expand_env("model = \"{{ env.QUILL_MODEL | default(\"gpt-4o\") }}\"").unwrap();
            assert_eq!(result, "model = \"gpt-4o\"");
        });

        temp_env::with_var("QUILL_MODEL", Some("o3-mini"), || {
            let result = expand_env("model = \"{{ env.QUILL_MODEL | default(\"gpt-4o\") }}\"").unwrap();
            assert_eq!(result, "model = \"o3-mini\"");
        });
    }

    #[test]
    fn empty_default_is_allowed() {
        temp_env::with_var_unset("QUILL_OPTIONAL", || {
            let result = expand_env("key = \"{{ env.QUILL_OPTIONAL | default(\"\") }}\"").unwrap();
            assert_eq!(result, "key = \"\"");
        });
    }
}
