use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;

/// Cuts `s` to at most `max_chars` characters and appends `marker` if anything was cut.
/// Safe for UTF-8 multi-byte characters.
pub fn truncate_chars(s: &str, max_chars: usize, marker: &str) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((byte_index, _)) => format!("{}{}", &s[..byte_index], marker),
    }
}

/// Hex SHA-256 of the given bytes, used as a content fingerprint.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Expands `$VAR` and `${VAR}` using `vars`. Unknown variables are left verbatim.
pub fn expand_env_vars(input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                match vars.get(name) {
                    Some(value) if is_var_name(name) => out.push_str(value),
                    _ => out.push_str(&rest[pos..pos + 1 + end + 2]),
                }
                rest = &braced[end + 1..];
                continue;
            }
        }

        let name_len = after
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(after.len());
        let name = &after[..name_len];
        match vars.get(name) {
            Some(value) if is_var_name(name) => out.push_str(value),
            _ => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[name_len..];
    }

    out.push_str(rest);
    out
}

fn is_var_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Expands a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest.trim_start_matches('/')))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
