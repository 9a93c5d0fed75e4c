// src/naming.rs
//
// Pure helpers mapping short object names to canonical keys and user metadata
// to the provider's reserved-prefix convention (and back).

use std::collections::HashMap;
use std::path::Path;

use crate::constants::METADATA_PREFIX;

/// User-namespace metadata (reserved prefix stripped).
pub type Metadata = HashMap<String, String>;

/// Strip leading/trailing separators and collapse doubled ones.
pub fn clean_prefix(prefix: &str) -> String {
    prefix
        .split('/')
        .filter(|seg| !seg.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical key for `name` under `prefix`.
///
/// A name that already contains `/` is treated as fully qualified and returned unchanged.
pub fn normalize_key(name: &str, prefix: &str) -> String {
    if name.contains('/') {
        return name.to_string();
    }
    let prefix = clean_prefix(prefix);
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Object key for a local file uploaded without an explicit target name.
///
/// Keeps names that already start with `prefix/`; otherwise takes the file's base
/// name and places it under the prefix.
pub fn normalize_upload_name(local_filename: &str, prefix: &str) -> String {
    let prefix = clean_prefix(prefix);
    if !prefix.is_empty() && local_filename.starts_with(&format!("{}/", prefix)) {
        return local_filename.to_string();
    }
    let base = Path::new(local_filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(local_filename);
    normalize_key(base, &prefix)
}

/// Add the reserved prefix to every key that does not already carry it.
pub fn encode_metadata(user: &Metadata) -> Metadata {
    user.iter()
        .map(|(k, v)| {
            let key = if k.starts_with(METADATA_PREFIX) {
                k.clone()
            } else {
                format!("{}{}", METADATA_PREFIX, k)
            };
            (key, v.clone())
        })
        .collect()
}

/// Strip the reserved prefix; keys without it (system headers) are dropped.
pub fn decode_metadata(provider: &Metadata) -> Metadata {
    provider
        .iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(METADATA_PREFIX)
                .map(|user_key| (user_key.to_string(), v.clone()))
        })
        .collect()
}

/// True when every filter pair is present in `meta` with an equal value.
pub fn metadata_matches(filter: &Metadata, meta: &Metadata) -> bool {
    filter.iter().all(|(k, v)| meta.get(k) == Some(v))
}

/// Directory markers and hidden (dot-prefixed) segments never show up in listings.
pub fn is_listable(name: &str, content_type: &str) -> bool {
    content_type != crate::constants::DIRECTORY_CONTENT_TYPE
        && !name.starts_with('.')
        && !name.contains("/.")
}

/// Parse `key=value` pairs, as accepted on the command line.
pub fn parse_metadata_pairs<S: AsRef<str>>(pairs: &[S]) -> Option<Metadata> {
    pairs
        .iter()
        .map(|p| {
            p.as_ref()
                .split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn qualified_names_are_untouched() {
        assert_eq!(normalize_key("a/b", "p"), "a/b");
        assert_eq!(normalize_key("a/b", ""), "a/b");
        assert_eq!(normalize_key("a/b", "x/y/z"), "a/b");
    }

    #[test]
    fn short_names_get_the_prefix() {
        assert_eq!(normalize_key("b", "p"), "p/b");
        assert_eq!(normalize_key("b", ""), "b");
        assert_eq!(normalize_key("b", "/p/"), "p/b");
        assert_eq!(normalize_key("b", "p//q/"), "p/q/b");
    }

    #[test]
    fn upload_names() {
        assert_eq!(normalize_upload_name("/home/me/data/a.txt", "proj"), "proj/a.txt");
        assert_eq!(normalize_upload_name("a.txt", ""), "a.txt");
        assert_eq!(normalize_upload_name("proj/sub/a.txt", "proj"), "proj/sub/a.txt");
        assert_eq!(normalize_upload_name("project/a.txt", "proj"), "proj/a.txt");
    }

    #[test]
    fn metadata_round_trip() {
        let m = meta(&[("proj", "ABC"), ("tag", "new"), ("empty", "")]);
        let encoded = encode_metadata(&m);
        assert_eq!(encoded.get("x-object-meta-proj").map(String::as_str), Some("ABC"));
        assert_eq!(decode_metadata(&encoded), m);
        assert_eq!(decode_metadata(&encode_metadata(&Metadata::new())), Metadata::new());
    }

    #[test]
    fn encode_keeps_already_prefixed_keys() {
        let encoded = encode_metadata(&meta(&[("x-object-meta-tag", "v")]));
        assert_eq!(encoded, meta(&[("x-object-meta-tag", "v")]));
    }

    #[test]
    fn decode_drops_system_headers() {
        let provider = meta(&[
            ("content-length", "12"),
            ("etag", "abc"),
            ("x-object-meta-owner", "me"),
        ]);
        assert_eq!(decode_metadata(&provider), meta(&[("owner", "me")]));
    }

    #[test]
    fn filter_is_a_subset_test() {
        let m = meta(&[("proj", "ABC"), ("tag", "new")]);
        assert!(metadata_matches(&Metadata::new(), &m));
        assert!(metadata_matches(&Metadata::new(), &Metadata::new()));
        assert!(metadata_matches(&meta(&[("proj", "ABC")]), &m));
        assert!(metadata_matches(&m, &m));
        assert!(!metadata_matches(&meta(&[("proj", "abc")]), &m));
        assert!(!metadata_matches(&meta(&[("owner", "me")]), &m));
        assert!(!metadata_matches(&meta(&[("proj", "ABC")]), &Metadata::new()));
    }

    #[test]
    fn listing_visibility() {
        assert!(is_listable("p/a.txt", "text/plain"));
        assert!(!is_listable("p/sub", "application/directory"));
        assert!(!is_listable(".hidden", "text/plain"));
        assert!(!is_listable("p/.cache/x", "text/plain"));
        assert!(is_listable("p/a.b.c", "text/plain"));
    }

    #[test]
    fn metadata_pairs() {
        assert_eq!(
            parse_metadata_pairs(&["a=1", "b=x=y"]),
            Some(meta(&[("a", "1"), ("b", "x=y")]))
        );
        assert_eq!(parse_metadata_pairs(&["novalue"]), None);
    }
}
