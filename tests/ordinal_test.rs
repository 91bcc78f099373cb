//! Episode ordinal extraction and list ordering tests

use dhua::models::{Episode, EpisodeError, UNRESOLVED_ORDINAL};

fn ordinal(title: &str, reference: &str) -> u32 {
    Episode::extract_ordinal(title, reference)
}

// =============================================================================
// Extraction
// =============================================================================

#[test]
fn test_episode_keyword() {
    assert_eq!(ordinal("Episode 12", "https://donghua.test/x/"), 12);
    assert_eq!(ordinal("Perfect World episode-07", "https://donghua.test/x/"), 7);
}

#[test]
fn test_ep_abbreviation() {
    assert_eq!(ordinal("Swallowed Star Ep 102", "https://donghua.test/x/"), 102);
    assert_eq!(ordinal("EP-3", "https://donghua.test/x/"), 3);
}

#[test]
fn test_cjk_markers() {
    assert_eq!(ordinal("第5集", "https://donghua.test/x/"), 5);
    assert_eq!(ordinal("斗罗大陆 第 23 话", "https://donghua.test/x/"), 23);
}

#[test]
fn test_keyword_beats_trailing_number() {
    // the resolution tag must not win over the episode marker
    assert_eq!(ordinal("Episode 5 1080", "https://donghua.test/x/"), 5);
}

#[test]
fn test_trailing_number() {
    assert_eq!(ordinal("Renegade Immortal 64", "https://donghua.test/x/"), 64);
}

#[test]
fn test_falls_back_to_reference() {
    assert_eq!(ordinal("Soul Land", "https://donghua.test/watch/42"), 42);
    assert_eq!(
        ordinal("Soul Land", "https://donghua.test/soul-land-episode-9/"),
        9
    );
}

#[test]
fn test_title_checked_before_reference() {
    assert_eq!(ordinal("Episode 3", "https://donghua.test/episode-9/"), 3);
}

#[test]
fn test_no_match_yields_sentinel() {
    assert_eq!(ordinal("Special OVA", "https://donghua.test/special-ova/"), UNRESOLVED_ORDINAL);
    assert_eq!(ordinal("", "https://donghua.test/trailer/"), UNRESOLVED_ORDINAL);
}

#[test]
fn test_single_digit_needs_marker() {
    // bare single digits are too noisy to trust
    assert_eq!(ordinal("Season 2 Trailer", "https://donghua.test/t/"), UNRESOLVED_ORDINAL);
}

// =============================================================================
// Episode construction
// =============================================================================

#[test]
fn test_episode_carries_ordinal() {
    let ep = Episode::new("Episode 12", "https://donghua.test/ep-12/").unwrap();
    assert_eq!(ep.ordinal(), 12);
    assert!(ep.has_ordinal());
    assert_eq!(ep.to_string(), "012. Episode 12");
}

#[test]
fn test_empty_reference_rejected() {
    assert_eq!(
        Episode::new("Episode 1", "  ").unwrap_err(),
        EpisodeError::EmptyReference
    );
}

#[test]
fn test_unnumbered_episode_display() {
    let ep = Episode::new("Special OVA", "https://donghua.test/special-ova/").unwrap();
    assert!(!ep.has_ordinal());
    assert_eq!(ep.to_string(), "  ?. Special OVA");
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_sort_puts_unnumbered_last() {
    let episodes = vec![
        Episode::new("Special OVA", "https://donghua.test/special-ova/").unwrap(),
        Episode::new("Episode 2", "https://donghua.test/ep-2/").unwrap(),
        Episode::new("Episode 1", "https://donghua.test/ep-1/").unwrap(),
    ];
    let sorted = Episode::sort_and_dedupe(episodes);
    let ordinals: Vec<u32> = sorted.iter().map(Episode::ordinal).collect();
    assert_eq!(ordinals, vec![1, 2, UNRESOLVED_ORDINAL]);
}

#[test]
fn test_dedupe_keeps_first_seen() {
    let episodes = vec![
        Episode::new("Episode 3", "https://donghua.test/ep-3/").unwrap(),
        Episode::new("Episode 1", "https://donghua.test/ep-1/").unwrap(),
        Episode::new("Episode 3 (mirror)", "https://mirror.test/ep-3/").unwrap(),
    ];
    let sorted = Episode::sort_and_dedupe(episodes);
    assert_eq!(sorted.len(), 2);
    assert_eq!(sorted[1].reference(), "https://donghua.test/ep-3/");
}

#[test]
fn test_sort_empty_list() {
    assert!(Episode::sort_and_dedupe(Vec::new()).is_empty());
}
