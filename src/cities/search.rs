//! Fuzzy city search: edit-distance ranking with population tie-break.

use std::cmp::Ordering;

use strsim::levenshtein;

use super::{CITY_SEARCH_RESULT_LIMIT, City, CityDirectory, FullCity};

/// Score for a query that appears inside the display string but not at its
/// start: strong, but deliberately ranked behind true prefix matches
/// (which score 0 through the edit-distance path).
const INTERIOR_MATCH_SCORE: f64 = 0.5;

/// A directory entry scored against one query; discarded after ranking.
struct ScoredCity<'a> {
    city: &'a FullCity,
    score: f64,
}

impl CityDirectory {
    /// Rank the directory against an already-normalized query and return the
    /// top results.
    ///
    /// An empty query short-circuits to the population-ranked top cities. A
    /// sufficient precomputed entry in the query result cache is resolved
    /// and returned as-is; only a missing or insufficient entry falls back
    /// to full-corpus scoring.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<City> {
        if query.is_empty() {
            return self.top_cities();
        }

        if let Some(cached) = self.cached_results(query) {
            return cached;
        }

        top_results(self.score_all(query), CITY_SEARCH_RESULT_LIMIT)
    }

    fn cached_results(&self, query: &str) -> Option<Vec<City>> {
        let offsets = self.query_cache.get(query)?;
        if offsets.len() < CITY_SEARCH_RESULT_LIMIT {
            return None;
        }
        Some(
            offsets
                .iter()
                .take(CITY_SEARCH_RESULT_LIMIT)
                .filter_map(|&offset| self.records().get(offset))
                .map(|full| full.city.clone())
                .collect(),
        )
    }

    fn score_all(&self, query: &str) -> Vec<ScoredCity<'_>> {
        let query_chars = query.chars().count();
        let mut scored: Vec<ScoredCity<'_>> = self
            .records()
            .iter()
            .map(|city| ScoredCity {
                city,
                score: score_against(query, query_chars, city),
            })
            .collect();
        // Stable sort: equal scores keep directory order for the re-rank.
        scored.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
        scored
    }
}

fn score_against(query: &str, query_chars: usize, city: &FullCity) -> f64 {
    match city.display_name_lower.find(query) {
        Some(position) if position > 0 => INTERIOR_MATCH_SCORE,
        _ => {
            let truncated: String = city.display_name_lower.chars().take(query_chars).collect();
            levenshtein(query, &truncated) as f64
        }
    }
}

/// Re-rank each contiguous equal-score run by population descending and
/// append runs in score order until `limit`, truncating only the final run.
fn top_results(scored: Vec<ScoredCity<'_>>, limit: usize) -> Vec<City> {
    let mut top = Vec::with_capacity(limit);
    let mut start = 0;
    while start < scored.len() && top.len() < limit {
        let score = scored[start].score;
        let mut end = start;
        while end < scored.len() && scored[end].score == score {
            end += 1;
        }
        let mut run: Vec<&FullCity> = scored[start..end].iter().map(|entry| entry.city).collect();
        run.sort_by(|a, b| b.city.population.cmp(&a.city.population));
        for full in run.into_iter().take(limit - top.len()) {
            top.push(full.city.clone());
        }
        start = end;
    }
    top
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_query_returns_top_cities_by_population() {
        let directory = testing::directory(&[
            (1, "Smallville", "KS", 100, 0.0, 0.0),
            (2, "Metropolis", "NY", 9000, 0.0, 0.0),
            (3, "Midway", "OH", 500, 0.0, 0.0),
        ]);
        let results: Vec<u64> = directory.search("").iter().map(|c| c.geonameid).collect();
        assert_eq!(results, vec![2, 3, 1]);
    }

    #[test]
    fn test_search_is_deterministic() {
        let directory = testing::directory(&[
            (1, "Springfield", "IL", 114_394, 39.80172, -89.64371),
            (2, "Springfield", "MA", 155_929, 42.10148, -72.58981),
            (3, "Springfield", "MO", 169_176, 37.21533, -93.29824),
            (4, "Greenfield", "MA", 17_768, 42.58759, -72.59953),
        ]);
        let first = directory.search("springfield");
        let second = directory.search("springfield");
        assert_eq!(first, second);
    }

    #[test]
    fn test_equal_scores_break_ties_by_population() {
        // "qqq" shares no characters with any prefix, so every candidate
        // scores the same edit distance.
        let directory = testing::directory(&[
            (1, "Alpha", "AA", 100, 0.0, 0.0),
            (2, "Beta", "BB", 500, 0.0, 0.0),
            (3, "Gamma", "CC", 10, 0.0, 0.0),
        ]);
        let populations: Vec<u64> = directory
            .search("qqq")
            .iter()
            .map(|c| c.population)
            .collect();
        assert_eq!(populations, vec![500, 100, 10]);
    }

    #[test]
    fn test_prefix_match_outranks_interior_substring() {
        let directory = testing::directory(&[
            (1, "West Springfield", "MA", 28_835, 42.10704, -72.62037),
            (2, "Springfield", "VT", 9373, 43.29840, -72.48226),
        ]);
        let results: Vec<u64> = directory
            .search("springfield")
            .iter()
            .map(|c| c.geonameid)
            .collect();
        assert_eq!(results, vec![2, 1]);
    }

    fn twelve_rows() -> Vec<(u64, &'static str, &'static str, u64, f64, f64)> {
        vec![
            (100, "Boston", "MA", 667_137, 42.35843, -71.05977),
            (101, "Bossier City", "LA", 68_159, 32.51599, -93.73212),
            (102, "Boston", "GA", 1315, 30.79186, -83.78989),
            (103, "Bostonia", "CA", 16_033, 32.80838, -116.93725),
            (104, "Barton", "VT", 735, 44.74922, -72.17456),
            (105, "Houston", "TX", 2_304_580, 29.76328, -95.36327),
            (106, "Austin", "TX", 961_855, 30.26715, -97.74306),
            (107, "Weston", "FL", 65_333, 26.10037, -80.39977),
            (108, "Boise", "ID", 235_684, 43.61350, -116.20345),
            (109, "Bozeman", "MT", 53_293, 45.67965, -111.03856),
            (110, "Easton", "PA", 26_800, 40.68843, -75.22073),
            (111, "Gaston", "SC", 1645, 33.81682, -81.10067),
        ]
    }

    #[test]
    fn test_sufficient_query_cache_entry_skips_scoring() {
        // Deliberately unsorted offsets: a cache hit must be returned as-is.
        let offsets = vec![2, 0, 5, 7, 1, 3, 4, 6, 8, 9, 10];
        let directory = testing::directory_with_query_cache(
            &twelve_rows(),
            HashMap::from([("bos".to_owned(), offsets.clone())]),
        );
        let results: Vec<u64> = directory.search("bos").iter().map(|c| c.geonameid).collect();
        let expected: Vec<u64> = offsets
            .iter()
            .take(CITY_SEARCH_RESULT_LIMIT)
            .map(|&offset| 100 + offset as u64)
            .collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_insufficient_query_cache_entry_falls_back_to_scoring() {
        let directory = testing::directory_with_query_cache(
            &twelve_rows(),
            HashMap::from([("boston".to_owned(), vec![4, 11])]),
        );
        let results = directory.search("boston");
        // Scoring ranks the prefix matches first, highest population
        // leading; the two cached offsets point elsewhere entirely.
        assert_eq!(results[0].geonameid, 100);
        assert_eq!(results[1].geonameid, 103);
        assert_eq!(results[2].geonameid, 102);
    }

    #[test]
    fn test_query_longer_than_every_candidate() {
        let directory = testing::directory(&[
            (1, "Ada", "OK", 16_481, 34.77453, -96.67834),
            (2, "Jay", "ME", 4772, 44.50396, -70.21617),
        ]);
        let results = directory.search("a very long query string indeed");
        assert_eq!(results.len(), 2);
    }
}
