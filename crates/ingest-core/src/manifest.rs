//! Line-oriented parsing of the playlist and chunklist manifests.
//!
//! The camera server emits minimal HLS: comment/tag lines start with `#`,
//! everything else names a document relative to the stream. No tag is
//! interpreted.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Playlist does not name a chunklist")]
    NoChunklistFound,
    #[error("Segment id {segment} has no numeric suffix before .ts")]
    MalformedSegmentId { segment: String },
}

/// Lines naming documents: non-blank and not starting with `#`.
fn uri_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
}

/// Name of the chunklist the playlist currently points to.
pub fn parse_playlist(text: &str) -> Result<String, ParseError> {
    uri_lines(text)
        .next()
        .map(str::to_string)
        .ok_or(ParseError::NoChunklistFound)
}

/// Segment identifiers in document order. An empty chunklist is valid.
pub fn parse_chunklist(text: &str) -> Vec<String> {
    uri_lines(text).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYLIST: &str = "\
#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:BANDWIDTH=524288,CODECS=\"avc1.77.31\",RESOLUTION=1280x720
chunklist_w1743270143.m3u8
";

    const CHUNKLIST: &str = "\
#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:7
#EXT-X-MEDIA-SEQUENCE:25371
#EXTINF:6.006,
media_w1743270143_25371.ts
#EXTINF:6.006,
media_w1743270143_25372.ts

#EXTINF:6.006,
media_w1743270143_25373.ts
";

    #[test]
    fn playlist_yields_first_uri_line() {
        assert_eq!(parse_playlist(PLAYLIST).unwrap(), "chunklist_w1743270143.m3u8");
    }

    #[test]
    fn playlist_ignores_later_entries() {
        let text = "#EXTM3U\n\nchunk17.m3u8\nchunk18.m3u8\n";
        assert_eq!(parse_playlist(text).unwrap(), "chunk17.m3u8");
    }

    #[test]
    fn playlist_without_uri_fails() {
        assert_eq!(
            parse_playlist("#EXTM3U\n#EXT-X-VERSION:3\n\n   \n"),
            Err(ParseError::NoChunklistFound)
        );
        assert_eq!(parse_playlist(""), Err(ParseError::NoChunklistFound));
    }

    #[test]
    fn chunklist_preserves_document_order() {
        assert_eq!(
            parse_chunklist(CHUNKLIST),
            vec![
                "media_w1743270143_25371.ts",
                "media_w1743270143_25372.ts",
                "media_w1743270143_25373.ts",
            ]
        );
    }

    #[test]
    fn chunklist_without_tags() {
        assert_eq!(
            parse_chunklist("media_w1_1001.ts\nmedia_w2_1002.ts"),
            vec!["media_w1_1001.ts", "media_w2_1002.ts"]
        );
    }

    #[test]
    fn empty_chunklist_is_not_an_error() {
        assert!(parse_chunklist("#EXTM3U\n#EXT-X-TARGETDURATION:7\n").is_empty());
        assert!(parse_chunklist("").is_empty());
    }

    #[test]
    fn crlf_line_endings() {
        assert_eq!(
            parse_chunklist("#EXTM3U\r\nmedia_w1_5.ts\r\n\r\nmedia_w1_6.ts\r\n"),
            vec!["media_w1_5.ts", "media_w1_6.ts"]
        );
    }
}
