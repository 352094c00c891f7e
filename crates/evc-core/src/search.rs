//! Discovery search
//!
//! Ranks organizations and servers against a free-text query using an
//! adjusted Levenshtein distance over display names and keywords.
//!
//! - Every word of the query must occur in a text for it to match at all
//! - Keyword matches cost twice as much as display name matches
//! - Lower score ranks higher; equal scores keep catalog order
//! - Case and diacritics are ignored ("geant" finds "GÉANT")

use evc_types::{Organization, OrganizationList, Server, ServerList};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Multiplier applied to keyword matches
const KEYWORD_PENALTY: usize = 2;

/// Lowercase with combining marks removed
fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect::<String>()
        .to_lowercase()
}

/// Edit distance between two strings, counted in chars
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = if ca == *cb { prev[j] } else { prev[j] + 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(substitution);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Distance, or `None` when some query word is missing from `text`
fn adjusted(query: &str, text: &str) -> Option<usize> {
    if query.split(' ').all(|word| text.contains(word)) {
        Some(levenshtein(query, text))
    } else {
        None
    }
}

/// Score an entry; `None` excludes it from the results
pub fn score<'a>(
    query: &str,
    display_names: impl IntoIterator<Item = &'a str>,
    keywords: impl IntoIterator<Item = &'a str>,
) -> Option<usize> {
    let query = normalize(query);

    let by_name = display_names
        .into_iter()
        .filter_map(|name| adjusted(&query, &normalize(name)))
        .min();

    let by_keyword = keywords
        .into_iter()
        .filter_map(|kw| adjusted(&query, &normalize(kw)))
        .map(|d| (d * KEYWORD_PENALTY).max(KEYWORD_PENALTY))
        .min();

    match (by_name, by_keyword) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn rank<'a, T>(
    entries: impl Iterator<Item = &'a T>,
    query: &str,
    score_of: impl Fn(&'a T) -> Option<usize>,
) -> Vec<&'a T> {
    let query = query.trim();
    if query.is_empty() {
        return entries.collect();
    }

    let mut scored: Vec<(usize, &T)> = entries
        .filter_map(|entry| score_of(entry).map(|s| (s, entry)))
        .collect();
    // Stable sort keeps catalog order for ties
    scored.sort_by_key(|(s, _)| *s);
    scored.into_iter().map(|(_, entry)| entry).collect()
}

/// Organizations matching `query`, best first
pub fn search_organizations<'a>(list: &'a OrganizationList, query: &str) -> Vec<&'a Organization> {
    rank(list.iter(), query, |org| {
        score(
            query.trim(),
            [org.display_name()],
            org.keyword_list().iter().map(String::as_str),
        )
    })
}

/// Servers matching `query`, best first
pub fn search_servers<'a>(list: &'a ServerList, query: &str) -> Vec<&'a Server> {
    rank(list.iter(), query, |server| {
        score(
            query.trim(),
            [server.display_name.as_str()],
            server.keyword_list().iter().map(String::as_str),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use evc_types::{SecureInternetInfo, ServerType};

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("hello", "hello"), 0);
        assert_eq!(levenshtein("hello", "helloxd"), 2);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
    }

    #[test]
    fn test_missing_word_excludes() {
        assert_eq!(adjusted("uni amsterdam", "university of amsterdam"), Some(10));
        assert_eq!(adjusted("uni utrecht", "university of amsterdam"), None);
    }

    #[test]
    fn test_keyword_penalty() {
        // Exact keyword match still costs the penalty
        assert_eq!(score("surf", [], ["surf"]), Some(2));
        assert_eq!(score("surf", ["surf"], ["surf"]), Some(0));
        assert_eq!(score("surf", ["Surfnet"], []), Some(3));
        assert_eq!(score("geant", ["SURF"], ["nren"]), None);
    }

    #[test]
    fn test_diacritics_ignored() {
        assert_eq!(normalize("GÉANT Zürich"), "geant zurich");
        assert_eq!(score("geant", ["GÉANT"], []), Some(0));
        assert_eq!(score("zürich", [], ["Zurich"]), Some(2));

        let list = OrganizationList::new(
            1,
            vec![
                Organization::new("g", "GÉANT", "", vec![]),
                Organization::new("s", "SURF", "", vec![]),
            ],
        );
        let hits: Vec<_> = search_organizations(&list, "geant")
            .iter()
            .map(|o| o.org_id())
            .collect();
        assert_eq!(hits, vec!["g"]);
    }

    #[test]
    fn test_search_organizations_ranked() {
        let list = OrganizationList::new(
            1,
            vec![
                Organization::new("a", "University of Amsterdam", "", vec!["uva".into()]),
                Organization::new("b", "Amsterdam UMC", "", vec![]),
                Organization::new("c", "Utrecht University", "", vec![]),
            ],
        );

        let hits: Vec<_> = search_organizations(&list, "amsterdam")
            .iter()
            .map(|o| o.org_id())
            .collect();
        assert_eq!(hits, vec!["b", "a"]);

        let hits: Vec<_> = search_organizations(&list, "UVA")
            .iter()
            .map(|o| o.org_id())
            .collect();
        assert_eq!(hits, vec!["a"]);

        assert_eq!(search_organizations(&list, "  ").len(), 3);
    }

    #[test]
    fn test_search_servers_uses_secure_internet_keywords() {
        let list = ServerList::new(1)
            .with_server(Server::new(ServerType::Custom, "https://c.example/", "My VPN"))
            .with_server(
                Server::new(ServerType::SecureInternet, "si", "SURF").with_secure_internet(
                    SecureInternetInfo {
                        base_url: "https://nl.surf.example/".into(),
                        keyword_list: vec!["netherlands".into()],
                        ..Default::default()
                    },
                ),
            );

        let hits = search_servers(&list, "netherlands");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identifier, "si");
    }
}
