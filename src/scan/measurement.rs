use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use super::criteria::CriteriaSpec;
use crate::config::Layout;
use crate::data::model::Measurement;
use crate::error::{Result, SelectError, SkipReason};

// ---------------------------------------------------------------------------
// State file parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Subject,
    Session,
}

impl Tag {
    fn key(self) -> &'static str {
        match self {
            Tag::Subject => "subject",
            Tag::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagState {
    Seeking,
    AwaitingValue(Tag),
}

/// Result of reading a measurement's identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identification {
    Accepted(Measurement),
    Rejected(SkipReason),
}

/// Strip surrounding whitespace and angle brackets from a tag value.
fn clean_value(line: &str) -> &str {
    line.trim().trim_start_matches('<').trim_end_matches('>').trim()
}

/// Value written on the marker line itself (`##$SUBJECT_id=<4011>`), if any.
fn inline_value(line: &str, marker: &str) -> Option<String> {
    let rest = line.split_once(marker)?.1.trim();
    (rest.starts_with('<') && rest.ends_with('>'))
        .then(|| clean_value(rest).to_string())
        .filter(|v| !v.is_empty())
}

/// Read subject and session from a measurement's state file.
///
/// Reading stops as soon as a value fails its criteria, so a rejected
/// measurement never reaches scan enumeration. Errors are
/// [`SelectError::MissingStateFile`] and [`SelectError::MalformedTag`];
/// callers treat both as a skip.
pub fn identify(
    measurement: &Path,
    layout: &Layout,
    criteria: &CriteriaSpec,
) -> Result<Identification> {
    let state_path = measurement.join(&layout.state_file);
    let file = File::open(&state_path)
        .map_err(|_| SelectError::MissingStateFile(state_path.clone()))?;
    let mut reader = BufReader::new(file);

    let mut subject: Option<String> = None;
    let mut session: Option<String> = None;
    let mut state = TagState::Seeking;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|_| SelectError::MissingStateFile(state_path.clone()))?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);

        let found = match state {
            TagState::AwaitingValue(tag) => {
                let value = clean_value(&line);
                if value.is_empty() {
                    return Err(SelectError::MalformedTag {
                        path: state_path,
                        tag: tag.key().to_string(),
                    });
                }
                Some((tag, value.to_string()))
            }
            TagState::Seeking => {
                let marker = if subject.is_none() && line.contains(&layout.subject_marker) {
                    Some((Tag::Subject, &layout.subject_marker))
                } else if session.is_none() && line.contains(&layout.session_marker) {
                    Some((Tag::Session, &layout.session_marker))
                } else {
                    None
                };
                match marker {
                    Some((tag, marker)) => match inline_value(&line, marker) {
                        Some(value) => Some((tag, value)),
                        None => {
                            state = TagState::AwaitingValue(tag);
                            None
                        }
                    },
                    None => None,
                }
            }
        };

        let Some((tag, value)) = found else {
            continue;
        };
        state = TagState::Seeking;
        if !criteria.accepts_identifier(tag.key(), &value) {
            debug!("{}: {} '{value}' rejected", measurement.display(), tag.key());
            let reason = match tag {
                Tag::Subject => SkipReason::SubjectRejected(value),
                Tag::Session => SkipReason::SessionRejected(value),
            };
            return Ok(Identification::Rejected(reason));
        }
        match tag {
            Tag::Subject => subject = Some(value),
            Tag::Session => session = Some(value),
        }
        if subject.is_some() && session.is_some() {
            break;
        }
    }

    if let TagState::AwaitingValue(tag) = state {
        return Err(SelectError::MalformedTag {
            path: state_path,
            tag: tag.key().to_string(),
        });
    }

    match (subject, session) {
        (Some(subject), Some(session)) => Ok(Identification::Accepted(Measurement {
            path: measurement.to_path_buf(),
            subject,
            session,
        })),
        _ => Ok(Identification::Rejected(SkipReason::NoTags)),
    }
}
