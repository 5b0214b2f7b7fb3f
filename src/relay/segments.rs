use super::types::ChannelId;

/// Probe order for the nearby-sequence fallback. `+1` is tried before `-1`
/// because live lists roll forward, so the next segment is the likeliest hit.
const PROBE_OFFSETS: [i64; 5] = [0, 1, -1, 2, -2];

/**
    Extract the channel id from a segment filename.

    Upstream segment names encode the channel as a numeric prefix before an
    underscore (`237_481.ts` belongs to channel 237).
*/
pub fn channel_from_filename(filename: &str) -> Option<ChannelId> {
    let (prefix, _) = filename.split_once('_')?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(ChannelId::new(prefix))
}

/// Split a `<channel>_<sequence>.ts` filename into its parts.
fn parse_segment_name(filename: &str) -> Option<(&str, u64)> {
    let stem = filename.strip_suffix(".ts")?;
    let (channel, sequence) = stem.rsplit_once('_')?;
    let sequence = sequence.parse().ok()?;
    Some((channel, sequence))
}

/// Exact match: the first segment URL whose path contains the filename.
pub fn find_exact<'a>(segments: &'a [String], filename: &str) -> Option<&'a str> {
    segments
        .iter()
        .find(|url| url.contains(filename))
        .map(String::as_str)
}

/**
    Match a requested segment against the current list.

    Tries an exact filename match first, then probes nearby sequence numbers
    (offsets 0, +1, -1, +2, -2, first hit wins) to tolerate small timing
    drift between what the player requested and what is currently live.
*/
pub fn find_segment<'a>(segments: &'a [String], filename: &str) -> Option<&'a str> {
    if let Some(url) = find_exact(segments, filename) {
        return Some(url);
    }

    let (channel, sequence) = parse_segment_name(filename)?;
    for offset in PROBE_OFFSETS {
        let Some(probe_seq) = sequence.checked_add_signed(offset) else {
            continue;
        };
        let probe = format!("{}_{}.ts", channel, probe_seq);
        if let Some(url) = find_exact(segments, &probe) {
            return Some(url);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(names: &[&str]) -> Vec<String> {
        names
            .iter()
            .map(|n| format!("https://upstream.example/hls/{}", n))
            .collect()
    }

    #[test]
    fn test_channel_from_filename() {
        assert_eq!(
            channel_from_filename("237_481.ts"),
            Some(ChannelId::new("237"))
        );
        assert_eq!(channel_from_filename("no-underscore.ts"), None);
        assert_eq!(channel_from_filename("abc_12.ts"), None);
        assert_eq!(channel_from_filename("_12.ts"), None);
    }

    #[test]
    fn test_exact_match_wins() {
        let segments = list(&["42_10.ts", "42_11.ts", "42_12.ts"]);
        let url = find_segment(&segments, "42_11.ts").unwrap();
        assert!(url.ends_with("42_11.ts"));
    }

    #[test]
    fn test_probe_order_prefers_forward() {
        // X_12 is missing; +1 (X_13) must win over -1 (X_11), and X_10 must
        // never be picked.
        let segments = list(&["X_10.ts", "X_11.ts", "X_13.ts"]);
        let url = find_segment(&segments, "X_12.ts").unwrap();
        assert!(url.ends_with("X_13.ts"));
    }

    #[test]
    fn test_probe_falls_back_two_behind() {
        let segments = list(&["X_10.ts"]);
        let url = find_segment(&segments, "X_12.ts").unwrap();
        assert!(url.ends_with("X_10.ts"));
    }

    #[test]
    fn test_no_match_outside_probe_range() {
        let segments = list(&["X_20.ts"]);
        assert!(find_segment(&segments, "X_12.ts").is_none());
    }

    #[test]
    fn test_empty_list() {
        assert!(find_segment(&[], "42_1.ts").is_none());
    }

    #[test]
    fn test_unparseable_name_only_matches_exact() {
        let segments = list(&["intro.ts"]);
        assert!(find_segment(&segments, "intro.ts").is_some());
        assert!(find_segment(&segments, "outro.ts").is_none());
    }
}
