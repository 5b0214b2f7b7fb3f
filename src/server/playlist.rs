/// How many trailing segments a synthesized playlist keeps. Older entries
/// have usually expired upstream already.
const SYNTHESIZED_SEGMENTS: usize = 4;

/**
    Rewrite an upstream playlist so segment URIs point back through the
    relay's `/hls/` route. Tags and comments pass through verbatim; the
    upstream already encodes correct ordering and timing.
*/
pub fn rewrite_playlist(body: &str) -> String {
    let mut out = String::with_capacity(body.len());

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            out.push_str(line);
        } else if let Some(name) = segment_filename(trimmed) {
            out.push_str("/hls/");
            out.push_str(name);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }

    out
}

/**
    Build a minimal playlist from a raw segment URL list, used when the
    capture did not include the upstream playlist body. Only the most recent
    segments are emitted.
*/
pub fn synthesize_playlist(segments: &[String]) -> String {
    let mut playlist = String::from(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:0\n",
    );

    let start = segments.len().saturating_sub(SYNTHESIZED_SEGMENTS);
    for url in &segments[start..] {
        if let Some(name) = segment_filename(url) {
            playlist.push_str("#EXTINF:10.0,\n");
            playlist.push_str("/hls/");
            playlist.push_str(name);
            playlist.push('\n');
        }
    }

    playlist
}

/// Last path component of a URI, query string stripped.
fn segment_filename(uri: &str) -> Option<&str> {
    let no_query = uri.split('?').next().unwrap_or(uri);
    let name = no_query.rsplit('/').next().unwrap_or(no_query);
    if name.is_empty() { None } else { Some(name) }
}
