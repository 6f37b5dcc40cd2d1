//! WebVTT transcript parsing.
//!
//! Handles the subset both Zoom transcript files and Graph transcript
//! content use: an optional `WEBVTT` header, cue blocks with an optional cue
//! identifier line, a `start --> end` timing line, and payload text with
//! either `<v Speaker>` voice spans or `Speaker: text` prefixes.

use crate::types::TranscriptSegment;

#[derive(Debug, Clone)]
pub struct ParsedVtt {
    pub segments: Vec<TranscriptSegment>,
    pub full_text: String,
    pub word_count: i64,
}

pub fn parse(input: &str) -> ParsedVtt {
    let mut segments = Vec::new();

    for block in input.split("\n\n") {
        let lines: Vec<&str> = block
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.is_empty() {
            continue;
        }

        let first = lines[0].trim();
        if first.eq_ignore_ascii_case("WEBVTT")
            || first.starts_with("NOTE")
            || first.starts_with("STYLE")
        {
            continue;
        }

        // Timing line is either the first line of the block or follows a cue
        // identifier line.
        let timing_index = lines.iter().position(|line| line.contains("-->"));
        let Some(timing_index) = timing_index else {
            continue;
        };
        let Some((start, end)) = parse_timing_line(lines[timing_index]) else {
            continue;
        };

        let payload = lines[timing_index + 1..].join(" ");
        if payload.trim().is_empty() {
            continue;
        }

        let (speaker, text) = split_speaker(payload.trim());
        if text.is_empty() {
            continue;
        }

        segments.push(TranscriptSegment {
            speaker,
            text,
            start_offset: start,
            end_offset: end,
        });
    }

    let full_text = segments
        .iter()
        .map(|segment| match &segment.speaker {
            Some(speaker) => format!("{speaker}: {}", segment.text),
            None => segment.text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n");
    let word_count = segments
        .iter()
        .map(|segment| segment.text.split_whitespace().count() as i64)
        .sum();

    ParsedVtt {
        segments,
        full_text,
        word_count,
    }
}

/// Canonical VTT output; `parse(serialize(segments))` reproduces the same
/// ordered segments and word count.
pub fn serialize(segments: &[TranscriptSegment]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for segment in segments {
        out.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(segment.start_offset),
            format_timestamp(segment.end_offset)
        ));
        match &segment.speaker {
            Some(speaker) => out.push_str(&format!("<v {speaker}>{}</v>\n", segment.text)),
            None => {
                out.push_str(&segment.text);
                out.push('\n');
            }
        }
        out.push('\n');
    }
    out
}

fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let (start_raw, rest) = line.split_once("-->")?;
    // Cue settings (align, position) may follow the end timestamp.
    let end_raw = rest.trim().split_whitespace().next()?;
    Some((
        parse_timestamp(start_raw.trim())?,
        parse_timestamp(end_raw)?,
    ))
}

/// `HH:MM:SS.mmm` or `MM:SS.mmm`, returned as whole-millisecond seconds so
/// serialization round-trips exactly.
fn parse_timestamp(raw: &str) -> Option<f64> {
    let parts: Vec<&str> = raw.split(':').collect();
    let (hours, minutes, seconds_raw) = match parts.as_slice() {
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, *s),
        [m, s] => (0, m.parse::<u64>().ok()?, *s),
        _ => return None,
    };

    let (secs_raw, millis_raw) = match seconds_raw.split_once('.') {
        Some((secs, millis)) => (secs, millis),
        None => (seconds_raw, "0"),
    };
    let secs = secs_raw.parse::<u64>().ok()?;
    let millis = format!("{millis_raw:0<3}");
    let millis = millis.get(..3)?.parse::<u64>().ok()?;

    let total_ms = ((hours * 60 + minutes) * 60 + secs) * 1000 + millis;
    Some(total_ms as f64 / 1000.0)
}

fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let minutes = (total_secs / 60) % 60;
    let hours = total_secs / 3600;
    format!("{hours:02}:{minutes:02}:{secs:02}.{ms:03}")
}

fn split_speaker(payload: &str) -> (Option<String>, String) {
    // <v Speaker>text</v>
    if let Some(rest) = payload.strip_prefix("<v ") {
        if let Some((speaker, text)) = rest.split_once('>') {
            let text = text.trim_end_matches("</v>").trim();
            let speaker = speaker.trim_end_matches('>').trim();
            if !speaker.is_empty() {
                return (Some(speaker.to_string()), text.to_string());
            }
            return (None, text.to_string());
        }
    }

    // Zoom-style "Speaker Name: text" prefix. A colon deep into the line is
    // treated as ordinary punctuation.
    if let Some((maybe_speaker, text)) = payload.split_once(": ") {
        if !maybe_speaker.is_empty() && maybe_speaker.len() <= 64 && !maybe_speaker.contains('<') {
            return (Some(maybe_speaker.to_string()), text.trim().to_string());
        }
    }

    (None, payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEAMS_SAMPLE: &str = "WEBVTT\n\n00:00:01.000 --> 00:00:04.500\n<v Dana Scully>Let's review the action items.</v>\n\n00:00:05.000 --> 00:00:09.250\n<v Fox Mulder>I sent the summary yesterday.</v>\n";

    #[test]
    fn parses_voice_spans() {
        let parsed = parse(TEAMS_SAMPLE);
        assert_eq!(parsed.segments.len(), 2);
        assert_eq!(parsed.segments[0].speaker.as_deref(), Some("Dana Scully"));
        assert_eq!(parsed.segments[0].text, "Let's review the action items.");
        assert_eq!(parsed.segments[0].start_offset, 1.0);
        assert_eq!(parsed.segments[1].end_offset, 9.25);
        assert_eq!(parsed.word_count, 10);
    }

    #[test]
    fn parses_speaker_prefix_and_cue_ids() {
        let input = "WEBVTT\n\n1\n00:00:00.000 --> 00:00:02.000\nAlex: morning everyone\n\n2\n00:00:02.000 --> 00:00:03.000\nuntagged line\n";
        let parsed = parse(input);
        assert_eq!(parsed.segments.len(), 2);
        assert_eq!(parsed.segments[0].speaker.as_deref(), Some("Alex"));
        assert_eq!(parsed.segments[1].speaker, None);
        assert_eq!(parsed.segments[1].text, "untagged line");
    }

    #[test]
    fn ignores_notes_and_empty_blocks() {
        let input = "WEBVTT\n\nNOTE confidential\n\n00:00:01.000 --> 00:00:02.000\nhello\n\n\n";
        let parsed = parse(input);
        assert_eq!(parsed.segments.len(), 1);
        assert_eq!(parsed.word_count, 1);
    }

    #[test]
    fn timing_line_with_settings() {
        let input = "00:00:01.000 --> 00:00:02.000 align:start position:0%\nhi there\n";
        let parsed = parse(input);
        assert_eq!(parsed.segments.len(), 1);
        assert_eq!(parsed.segments[0].end_offset, 2.0);
    }

    #[test]
    fn round_trip_preserves_segments_and_word_count() {
        let parsed = parse(TEAMS_SAMPLE);
        let reparsed = parse(&serialize(&parsed.segments));
        assert_eq!(reparsed.segments, parsed.segments);
        assert_eq!(reparsed.word_count, parsed.word_count);
    }

    #[test]
    fn round_trip_without_speakers() {
        let segments = vec![TranscriptSegment {
            speaker: None,
            text: "plain cue text".to_string(),
            start_offset: 0.5,
            end_offset: 3.125,
        }];
        let reparsed = parse(&serialize(&segments));
        assert_eq!(reparsed.segments, segments);
    }
}
