use super::model::{Script, Speaker, Utterance};

/// Parser position within the tagged text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    /// No utterance open yet; waiting for the first speaker marker.
    ExpectSpeaker,
    /// Collecting lines into the current utterance of the given speaker.
    InUtterance(Speaker),
}

/// Parse speaker-tagged text into an ordered utterance sequence.
///
/// Lines starting with a recognized marker (`HOST:` / `EXPERT:`, case
/// insensitive, optional emphasis wrapping) open a new utterance; unmarked
/// lines are appended to the current one, so a missing trailing marker is
/// tolerated. Consecutive turns by the same speaker merge into one
/// utterance.
///
/// If the input contains no markers at all, the whole text becomes a single
/// utterance for the narrator role. That is a logged fallback, not an error:
/// non-empty input always yields a non-empty script.
pub fn parse_script(text: &str) -> Script {
    let marker =
        regex::Regex::new(r"(?i)^\s*\*{0,2}(HOST|EXPERT)\*{0,2}\s*:\s*\*{0,2}\s*(.*)$").unwrap();

    let mut state = ParserState::ExpectSpeaker;
    let mut utterances: Vec<Utterance> = Vec::new();
    let mut current_text = String::new();
    let mut leading_unmarked = String::new();

    fn flush(speaker: Speaker, text: &mut String, utterances: &mut Vec<Utterance>) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            match utterances.last_mut() {
                Some(last) if last.speaker == speaker => {
                    last.text.push(' ');
                    last.text.push_str(trimmed);
                }
                _ => utterances.push(Utterance::new(speaker, trimmed)),
            }
        }
        text.clear();
    }

    for line in text.lines() {
        if let Some(caps) = marker.captures(line) {
            if let ParserState::InUtterance(speaker) = state {
                flush(speaker, &mut current_text, &mut utterances);
            }
            // Speaker name guaranteed by the regex alternation.
            let speaker = Speaker::from_marker(&caps[1]).unwrap();
            current_text = caps[2].trim().to_string();
            state = ParserState::InUtterance(speaker);
        } else {
            match state {
                ParserState::ExpectSpeaker => {
                    if !line.trim().is_empty() {
                        if !leading_unmarked.is_empty() {
                            leading_unmarked.push(' ');
                        }
                        leading_unmarked.push_str(line.trim());
                    }
                }
                ParserState::InUtterance(_) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        if !current_text.is_empty() {
                            current_text.push(' ');
                        }
                        current_text.push_str(trimmed);
                    }
                }
            }
        }
    }

    if let ParserState::InUtterance(speaker) = state {
        flush(speaker, &mut current_text, &mut utterances);
    }

    if utterances.is_empty() {
        let narration = leading_unmarked.trim();
        if narration.is_empty() {
            return Script::new(Vec::new());
        }
        tracing::warn!(
            text_length = narration.len(),
            "No speaker markers found; attributing entire text to the narrator"
        );
        return Script::new(vec![Utterance::new(Speaker::narrator(), narration)]);
    }

    // Prose before the first marker would otherwise be dropped silently;
    // prepend it to the first utterance instead.
    if !leading_unmarked.trim().is_empty() {
        let first = &mut utterances[0];
        first.text = format!("{} {}", leading_unmarked.trim(), first.text);
    }

    Script::new(utterances)
}
