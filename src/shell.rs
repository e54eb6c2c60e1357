//! Shell output.

/// Render `export`/`unset` statements, one per line, in the given order.
pub fn to_environment<I, K, V>(vars: I) -> String
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    vars.into_iter()
        .map(|(key, value)| match value {
            Some(value) => format!("export {}={};", key.as_ref(), quote(value.as_ref())),
            None => format!("unset {};", key.as_ref()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Quote `value` for a POSIX shell, leaving safe strings untouched.
pub fn quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }

    let safe = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        return value.to_string();
    }

    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}
