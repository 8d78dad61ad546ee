use std::sync::OnceLock;

use regex::Regex;

/// Expand `{{ env.VAR }}` placeholders in a raw TOML string
///
/// Supports an optional fallback via `{{ env.VAR | default("value") }}`.
/// Expansion runs on the raw text before deserialization so config
/// structs use plain `String`/`SecretString` fields. Comment lines are
/// passed through unchanged.
pub(crate) fn expand_env(input: &str) -> Result<String, String> {
    fn re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r#"\{\{\s*env\.([A-Za-z0-9_]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
                .expect("must be valid regex")
        })
    }

    let mut output = String::with_capacity(input.len());

    for (i, line) in input.lines().enumerate() {
        if i > 0 {
            output.push('\n');
        }

        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }

        let mut last_end = 0;
        for captures in re().captures_iter(line) {
            let overall = captures.get(0).expect("regex match has a full capture");
            let var_name = captures.get(1).expect("regex match has a name capture").as_str();
            let default_value = captures.get(2).map(|m| m.as_str());

            output.push_str(&line[last_end..overall.start()]);

            match std::env::var(var_name) {
                Ok(value) => output.push_str(&value),
                Err(_) => match default_value {
                    Some(default) => output.push_str(default),
                    None => return Err(format!("environment variable not found: `{var_name}`")),
                },
            }

            last_end = overall.end();
        }
        output.push_str(&line[last_end..]);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(expand_env("api_key = \"abc\"").unwrap(), "api_key = \"abc\"");
    }

    #[test]
    fn expands_set_variable() {
        std::env::set_var("CONDUIT_TEST_KEY", "sk-123");
        let out = expand_env("api_key = \"{{ env.CONDUIT_TEST_KEY }}\"").unwrap();
        assert_eq!(out, "api_key = \"sk-123\"");
    }

    #[test]
    fn missing_variable_uses_default() {
        let out = expand_env(r#"ttl = "{{ env.CONDUIT_TEST_UNSET | default("300") }}""#).unwrap();
        assert_eq!(out, "ttl = \"300\"");
    }

    #[test]
    fn missing_variable_without_default_errors() {
        assert!(expand_env("key = \"{{ env.CONDUIT_TEST_UNSET2 }}\"").is_err());
    }

    #[test]
    fn comment_lines_skip_expansion() {
        let input = "# {{ env.CONDUIT_TEST_UNSET3 }}";
        assert_eq!(expand_env(input).unwrap(), input);
    }
}
