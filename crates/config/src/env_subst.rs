/// Expand `${NAME}` and `${NAME:-fallback}` placeholders from the process
/// environment.
///
/// A placeholder whose variable is unset and has no fallback is kept verbatim
/// so validation can point at it.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated, emit the tail untouched.
            out.push_str(&rest[start..]);
            return out;
        };
        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(body);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Names of `${...}` placeholders still present after substitution.
pub fn unresolved_placeholders(input: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        names.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "HUBLINK_TEST_VAR" => Some("hello".to_string()),
            "HUBLINK_DB" => Some("sqlite://prod.db".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_env_with("key=${HUBLINK_TEST_VAR}", env),
            "key=hello"
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_env_with("${HUBLINK_NONEXISTENT_XYZ}", env),
            "${HUBLINK_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn fallback_used_when_unset() {
        assert_eq!(
            substitute_env_with("url = \"${HUBLINK_MISSING:-sqlite::memory:}\"", env),
            "url = \"sqlite::memory:\""
        );
        assert_eq!(
            substitute_env_with("${HUBLINK_DB:-ignored}", env),
            "sqlite://prod.db"
        );
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_env_with("url=${DATABASE", env), "url=${DATABASE");
    }

    #[test]
    fn multiple_placeholders_on_one_line() {
        assert_eq!(
            substitute_env_with("${HUBLINK_TEST_VAR}-${HUBLINK_TEST_VAR}", env),
            "hello-hello"
        );
    }

    #[test]
    fn reports_unresolved_names() {
        let text = substitute_env_with("a=${HUBLINK_TEST_VAR} b=${NOPE}", env);
        assert_eq!(unresolved_placeholders(&text), vec!["NOPE".to_string()]);
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}
